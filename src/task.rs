use serde::{Deserialize, Serialize};
use std::fmt;

/// A task as handed over by a definition source: dependencies are still
/// plain ids and nothing has been resolved yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(alias = "cmd")]
    pub command: String,
    #[serde(default, alias = "deps")]
    pub dependencies: Vec<String>,
}

impl TaskRecord {
    pub fn new<I, S>(id: impl Into<String>, command: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            command: command.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

/// Position of a task inside its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskIndex(pub(crate) usize);

impl TaskIndex {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A resolved task. Edges are indices into the owning [`crate::TaskGraph`].
#[derive(Debug, Clone)]
pub struct Task {
    id: String,
    command: String,
    pub(crate) dependencies: Vec<TaskIndex>,
    pub(crate) dependents: Vec<TaskIndex>,
}

impl Task {
    pub(crate) fn new(id: String, command: String) -> Self {
        Self {
            id,
            command,
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Direct prerequisites, in the order the record listed them.
    pub fn dependencies(&self) -> &[TaskIndex] {
        &self.dependencies
    }

    /// Tasks that list this one as a prerequisite.
    pub fn dependents(&self) -> &[TaskIndex] {
        &self.dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accepts_short_field_names() {
        let record: TaskRecord =
            serde_json::from_str(r#"{"id": "test", "cmd": "cargo test", "deps": ["build"]}"#)
                .unwrap();
        assert_eq!(record, TaskRecord::new("test", "cargo test", ["build"]));
    }

    #[test]
    fn record_dependencies_default_to_empty() {
        let record: TaskRecord =
            serde_json::from_str(r#"{"id": "build", "command": "make"}"#).unwrap();
        assert!(record.dependencies.is_empty());
    }
}
