use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ParagoError, ReadyTask, Result, RetryExecutor, RetryPolicy, Scheduler};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one task's command. Returning `Ok` with a non-zero exit code is a
/// task failure, `Err` means the command could not be run at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, ctx: CancellationToken, task: &ReadyTask) -> Result<CommandOutput>;
}

pub type BoxRunner = Arc<dyn CommandRunner>;

/// Runs commands through `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, ctx: CancellationToken, task: &ReadyTask) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&task.command)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // 取消时丢弃 future，子进程随之被杀掉
        let output = tokio::select! {
            output = cmd.output() => output?,
            _ = ctx.cancelled() => {
                return Err(ParagoError::ContextCancelled(format!("task {} interrupted", task.id)));
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorOptions {
    /// Maximum number of commands running at once.
    pub jobs: usize,
    pub shell: String,
    pub retry: Option<RetryPolicy>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            shell: "sh".to_string(),
            retry: None,
        }
    }
}

// 单个任务结束时回传给主循环
struct Finished {
    id: String,
    outcome: Result<CommandOutput>,
    // 最后一次尝试的输出，失败时也保留
    last_output: Option<CommandOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<TaskFailure>,
    /// Tasks never run because something they depend on failed.
    pub skipped: Vec<String>,
    pub execution_order: Vec<String>,
    /// Output of every task that ran; for a failed task, its last attempt.
    pub outputs: BTreeMap<String, CommandOutput>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Drives a [`Scheduler`] until nothing is left to run.
pub struct Executor {
    scheduler: Arc<Scheduler>,
    runner: BoxRunner,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(scheduler: Arc<Scheduler>, runner: BoxRunner, options: ExecutorOptions) -> Self {
        Self {
            scheduler,
            runner,
            options,
        }
    }

    pub fn with_shell(scheduler: Arc<Scheduler>, options: ExecutorOptions) -> Self {
        let runner: BoxRunner = Arc::new(ShellRunner::new(options.shell.clone()));
        Self::new(scheduler, runner, options)
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn execute(&self, ctx: CancellationToken) -> Result<RunReport> {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Finished>();
        let semaphore = Arc::new(Semaphore::new(self.options.jobs.max(1)));
        let mut handles = Vec::new();
        let mut in_flight = 0usize;
        let mut report = RunReport::default();

        loop {
            // 派发所有就绪任务
            for task in self.scheduler.take_ready() {
                in_flight += 1;
                handles.push(self.spawn_task(
                    ctx.clone(),
                    task,
                    done_tx.clone(),
                    Arc::clone(&semaphore),
                ));
            }

            if in_flight == 0 {
                break;
            }

            tokio::select! {
                Some(Finished { id, outcome, last_output }) = done_rx.recv() => {
                    in_flight -= 1;
                    report.execution_order.push(id.clone());
                    match outcome {
                        Ok(output) => {
                            self.scheduler.mark_completed(&id)?;
                            report.succeeded.push(id.clone());
                            report.outputs.insert(id, output);
                        }
                        Err(ParagoError::ContextCancelled(msg)) => {
                            return Err(ParagoError::ContextCancelled(msg));
                        }
                        Err(err) => {
                            if let Some(output) = last_output {
                                report.outputs.insert(id.clone(), output);
                            }
                            let skipped = self.scheduler.mark_failed(&id)?;
                            report.failed.push(TaskFailure { id, error: err.to_string() });
                            report.skipped.extend(skipped);
                        }
                    }
                }

                _ = ctx.cancelled() => {
                    return Err(ParagoError::ContextCancelled("Execution cancelled".to_string()));
                }
            }
        }

        try_join_all(handles)
            .await
            .map_err(|e| ParagoError::TaskExecution(format!("Join error: {}", e)))?;

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "run finished"
        );

        Ok(report)
    }

    fn spawn_task(
        &self,
        ctx: CancellationToken,
        task: ReadyTask,
        done_tx: mpsc::UnboundedSender<Finished>,
        semaphore: Arc<Semaphore>,
    ) -> tokio::task::JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        let retry = self.options.retry.clone();

        tokio::spawn(async move {
            let last_output = Mutex::new(None);
            let cancelled = || -> Result<CommandOutput> {
                Err(ParagoError::ContextCancelled(format!(
                    "task {} cancelled before start",
                    task.id
                )))
            };

            // 排队等待许可时若已取消，不再启动命令
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancelled() => cancelled(),
                permit = semaphore.acquire_owned() => match permit {
                    Ok(_permit) => {
                        if ctx.is_cancelled() {
                            cancelled()
                        } else {
                            AssertUnwindSafe(Self::execute_task(
                                ctx.clone(),
                                &runner,
                                &task,
                                retry,
                                &last_output,
                            ))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                Err(ParagoError::TaskExecution(format!(
                                    "task {} panicked",
                                    task.id
                                )))
                            })
                        }
                    }
                    Err(_) => Err(ParagoError::TaskExecution(
                        "Failed to acquire semaphore".to_string(),
                    )),
                },
            };

            // 接收端已退出（取消）时忽略
            let _ = done_tx.send(Finished {
                id: task.id,
                outcome,
                last_output: last_output.into_inner(),
            });
        })
    }

    async fn execute_task(
        ctx: CancellationToken,
        runner: &BoxRunner,
        task: &ReadyTask,
        retry: Option<RetryPolicy>,
        last_output: &Mutex<Option<CommandOutput>>,
    ) -> Result<CommandOutput> {
        info!(task = %task.id, command = %task.command, "running task");

        RetryExecutor::new(retry)
            .execute_with_retry(ctx.clone(), &task.id, |attempt| {
                let ctx = ctx.clone();
                async move {
                    debug!(task = %task.id, attempt, "starting attempt");
                    let output = runner.run(ctx, task).await?;
                    if output.success() {
                        Ok(output)
                    } else {
                        warn!(
                            task = %task.id,
                            exit_code = ?output.code,
                            stderr = %output.stderr.trim_end(),
                            "command failed"
                        );
                        let code = output.code;
                        *last_output.lock() = Some(output);
                        Err(ParagoError::CommandFailed {
                            task: task.id.clone(),
                            code,
                        })
                    }
                }
            })
            .await
    }
}
