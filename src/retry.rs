use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{ParagoError, Result};

const MAX_BACKOFF: Duration = Duration::from_secs(150);

/// How often a failing command is re-run before its task counts as failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    /// Total attempts, the first run included. `0` and `1` both mean a
    /// single attempt.
    pub max_attempts: u32,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_attempts: 1,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }
}

pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: Option<RetryPolicy>) -> Self {
        let mut policy = policy.unwrap_or_default();

        // 修正非法值
        if policy.interval.is_zero() {
            policy.interval = Duration::from_secs(1);
        }
        if policy.max_interval.is_zero() {
            policy.max_interval = Duration::from_secs(30);
        }
        if policy.multiplier <= 0.0 {
            policy.multiplier = 2.0;
        }
        if policy.max_interval > MAX_BACKOFF {
            policy.max_interval = MAX_BACKOFF;
        }

        Self { policy }
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// The closure receives the 1-based attempt number. A single-attempt
    /// policy hands back the operation's own error; otherwise the last error
    /// is wrapped in [`ParagoError::RetryFailed`].
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        ctx: CancellationToken,
        task_name: &str,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.policy.max_attempts <= 1 {
            if ctx.is_cancelled() {
                return Err(ParagoError::ContextCancelled(format!(
                    "cancelled before task {task_name} started"
                )));
            }
            return operation(1).await;
        }

        let mut last_error = None;

        for attempt in 1..=self.policy.max_attempts {
            if ctx.is_cancelled() {
                return Err(ParagoError::ContextCancelled(format!(
                    "cancelled before attempt {attempt} of task {task_name}"
                )));
            }

            match operation(attempt).await {
                Ok(result) => return Ok(result),
                Err(ParagoError::ContextCancelled(msg)) => {
                    return Err(ParagoError::ContextCancelled(msg));
                }
                Err(e) => {
                    warn!(task = %task_name, attempt, error = %e, "attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt == self.policy.max_attempts {
                break;
            }

            tokio::select! {
                _ = ctx.cancelled() => {
                    return Err(ParagoError::ContextCancelled(format!(
                        "cancelled while waiting to retry task {task_name}"
                    )));
                }
                _ = sleep(self.backoff(attempt)) => {}
            }
        }

        Err(ParagoError::RetryFailed(format!(
            "task {} failed after {} attempts, last error: {}",
            task_name,
            self.policy.max_attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Delay after the given failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.policy.interval.as_secs_f64() * self.policy.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.policy.max_interval.as_secs_f64() {
            self.policy.max_interval
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
