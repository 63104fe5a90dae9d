use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{ParagoError, Result, TaskGraph, TaskIndex, ValidatedGraph};

/// Per-task scheduling state.
///
/// `Pending -> Ready -> Dispatched -> Completed`, or `Dispatched -> Failed`
/// for a task whose command failed. Transitive dependents of a failed task
/// move from `Pending` straight to `Skipped` and never become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskStatus {
    Pending,
    Ready,
    Dispatched,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyTask {
    pub index: TaskIndex,
    pub id: String,
    pub command: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    pub pending: usize,
    pub ready: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
struct State {
    status: Vec<TaskStatus>,
    /// Dependencies not yet completed, per task.
    waiting_on: Vec<usize>,
    ready: BTreeSet<TaskIndex>,
    completed: usize,
    terminal: usize,
}

impl State {
    fn is_settled(&self) -> bool {
        self.terminal == self.status.len()
    }
}

/// Ready-set bookkeeping for one run. Shareable between workers via `Arc`.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    state: Mutex<State>,
    progress: Notify,
}

impl Scheduler {
    pub fn new(graph: ValidatedGraph) -> Self {
        let graph = Arc::new(graph.into_inner());

        let waiting_on: Vec<usize> = graph.tasks().map(|(_, t)| t.dependencies().len()).collect();
        let mut status = vec![TaskStatus::Pending; graph.len()];
        let mut ready = BTreeSet::new();

        // 初始入度为 0 的任务直接就绪
        for (idx, &count) in waiting_on.iter().enumerate() {
            if count == 0 {
                status[idx] = TaskStatus::Ready;
                ready.insert(TaskIndex(idx));
            }
        }

        debug!(tasks = graph.len(), ready = ready.len(), "scheduler initialised");

        Self {
            graph,
            state: Mutex::new(State {
                status,
                waiting_on,
                ready,
                completed: 0,
                terminal: 0,
            }),
            progress: Notify::new(),
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Ids of tasks whose dependencies have all completed and which have not
    /// been dispatched yet. No ordering among them is promised.
    pub fn ready(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .ready
            .iter()
            .map(|&idx| self.graph.node(idx).id().to_string())
            .collect()
    }

    /// Move a ready task to `Dispatched`. A task can be dispatched only once.
    pub fn mark_dispatched(&self, id: &str) -> Result<()> {
        let idx = self.resolve(id)?;
        let mut state = self.state.lock();
        if !state.ready.remove(&idx) {
            return Err(ParagoError::NotReady(id.to_string()));
        }
        state.status[idx.0] = TaskStatus::Dispatched;
        info!(task = %id, "task dispatched");
        Ok(())
    }

    // ready() + mark_dispatched() 在同一把锁内完成
    pub fn take_ready(&self) -> Vec<ReadyTask> {
        let mut state = self.state.lock();
        let taken = std::mem::take(&mut state.ready);
        taken
            .into_iter()
            .map(|idx| {
                state.status[idx.0] = TaskStatus::Dispatched;
                let task = self.graph.node(idx);
                info!(task = %task.id(), "task dispatched");
                ReadyTask {
                    index: idx,
                    id: task.id().to_string(),
                    command: task.command().to_string(),
                }
            })
            .collect()
    }

    /// Record a successful finish. Returns the ids that became ready because
    /// of it.
    pub fn mark_completed(&self, id: &str) -> Result<Vec<String>> {
        let idx = self.resolve(id)?;
        let mut state = self.state.lock();
        Self::ensure_dispatched(&state, idx, id)?;

        state.status[idx.0] = TaskStatus::Completed;
        state.completed += 1;
        state.terminal += 1;

        let mut unlocked = Vec::new();
        for &child in self.graph.node(idx).dependents() {
            state.waiting_on[child.0] -= 1;
            if state.waiting_on[child.0] == 0 && state.status[child.0] == TaskStatus::Pending {
                state.status[child.0] = TaskStatus::Ready;
                state.ready.insert(child);
                unlocked.push(self.graph.node(child).id().to_string());
            }
        }
        drop(state);

        info!(task = %id, unlocked = unlocked.len(), "task completed");
        self.progress.notify_waiters();
        Ok(unlocked)
    }

    /// Record a failed finish. The task and every transitive dependent that
    /// is still pending are excluded from the rest of the run. Returns the
    /// skipped ids.
    pub fn mark_failed(&self, id: &str) -> Result<Vec<String>> {
        let idx = self.resolve(id)?;
        let mut state = self.state.lock();
        Self::ensure_dispatched(&state, idx, id)?;

        state.status[idx.0] = TaskStatus::Failed;
        state.terminal += 1;

        let mut skipped = Vec::new();
        let mut stack: Vec<TaskIndex> = self.graph.node(idx).dependents().to_vec();
        while let Some(child) = stack.pop() {
            if state.status[child.0] != TaskStatus::Pending {
                continue;
            }
            state.status[child.0] = TaskStatus::Skipped;
            state.terminal += 1;
            skipped.push(self.graph.node(child).id().to_string());
            stack.extend_from_slice(self.graph.node(child).dependents());
        }
        drop(state);

        warn!(task = %id, skipped = skipped.len(), "task failed; dependents skipped");
        self.progress.notify_waiters();
        Ok(skipped)
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().completed == self.graph.len()
    }

    /// True once every task is completed, failed or skipped.
    pub fn is_settled(&self) -> bool {
        self.state.lock().is_settled()
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        let idx = self.graph.lookup(id)?;
        Some(self.state.lock().status[idx.0])
    }

    pub fn summary(&self) -> ScheduleSummary {
        let state = self.state.lock();
        let mut summary = ScheduleSummary::default();
        for status in &state.status {
            match status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Ready => summary.ready += 1,
                TaskStatus::Dispatched => summary.dispatched += 1,
                TaskStatus::Completed => summary.completed += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Wait until there is something to dispatch or nothing is left to do.
    pub async fn wait_for_work(&self) {
        loop {
            let notified = self.progress.notified();
            tokio::pin!(notified);
            // 先注册再检查，避免丢失唤醒
            notified.as_mut().enable();
            {
                let state = self.state.lock();
                if !state.ready.is_empty() || state.is_settled() {
                    return;
                }
            }
            notified.await;
        }
    }

    fn resolve(&self, id: &str) -> Result<TaskIndex> {
        self.graph
            .lookup(id)
            .ok_or_else(|| ParagoError::UnknownTask(id.to_string()))
    }

    fn ensure_dispatched(state: &State, idx: TaskIndex, id: &str) -> Result<()> {
        match state.status[idx.0] {
            TaskStatus::Dispatched => Ok(()),
            TaskStatus::Completed | TaskStatus::Failed => {
                Err(ParagoError::DoubleCompletion(id.to_string()))
            }
            TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Skipped => {
                Err(ParagoError::NotDispatched(id.to_string()))
            }
        }
    }
}
