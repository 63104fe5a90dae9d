pub mod task;
pub mod graph;
pub mod cycle_check;
pub mod scheduler;
pub mod definition;
pub mod retry;
pub mod executor;
pub mod cli;
pub mod logging;

pub use task::{Task, TaskIndex, TaskRecord};
pub use graph::{TaskGraph, ValidatedGraph};
pub use cycle_check::{find_cycle, validate};
pub use scheduler::{ReadyTask, ScheduleSummary, Scheduler, TaskStatus};
pub use definition::DefinitionError;
pub use retry::{RetryPolicy, RetryExecutor};
pub use executor::{
    BoxRunner, CommandOutput, CommandRunner, Executor, ExecutorOptions, RunReport, ShellRunner,
    TaskFailure,
};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParagoError>;

#[derive(Error, Debug)]
pub enum ParagoError {
    #[error("Duplicate task id '{0}'")]
    DuplicateId(String),
    #[error("Task '{task}' depends on unknown task '{missing}'")]
    UnknownDependency { task: String, missing: String },
    #[error("Cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("Unknown task '{0}'")]
    UnknownTask(String),
    #[error("Task '{0}' is not ready for dispatch")]
    NotReady(String),
    #[error("Task '{0}' was never dispatched")]
    NotDispatched(String),
    #[error("Task '{0}' was already completed")]
    DoubleCompletion(String),
    #[error("Invalid task definition: {0}")]
    Definition(#[from] DefinitionError),
    #[error("Task '{task}' failed with exit code {code:?}")]
    CommandFailed { task: String, code: Option<i32> },
    #[error("Task execution failed: {0}")]
    TaskExecution(String),
    #[error("Context cancelled: {0}")]
    ContextCancelled(String),
    #[error("Retry failed: {0}")]
    RetryFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build and validate a graph from `records` and hand it to a fresh [`Scheduler`].
pub fn plan(records: &[TaskRecord]) -> Result<Scheduler> {
    let graph = TaskGraph::build(records)?.validate()?;
    Ok(Scheduler::new(graph))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_runs_builder_and_cycle_check() {
        let records = vec![
            TaskRecord::new("build", "make", Vec::<String>::new()),
            TaskRecord::new("test", "make test", ["build"]),
        ];
        let scheduler = plan(&records).unwrap();
        assert_eq!(scheduler.ready(), vec!["build"]);

        let cyclic = vec![TaskRecord::new("loop", "true", ["loop"])];
        assert!(matches!(plan(&cyclic), Err(ParagoError::CyclicDependency { .. })));
    }

    #[test]
    fn definition_errors_convert() {
        let err: ParagoError = definition::parse_str("build: 3\n").unwrap_err().into();
        assert_eq!(err.to_string(), "Invalid task definition: task build: invalid definition");
    }
}
