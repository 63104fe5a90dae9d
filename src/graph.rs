use std::collections::HashMap;
use std::ops::Deref;

use tracing::debug;

use crate::{ParagoError, Result, Task, TaskIndex, TaskRecord, cycle_check};

/// Arena of tasks plus an id lookup table.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, TaskIndex>,
}

impl TaskGraph {
    /// Resolve `records` into a graph.
    ///
    /// Errors name the first offending record in input order, so the same
    /// malformed input always produces the same error.
    pub fn build(records: &[TaskRecord]) -> Result<Self> {
        let mut tasks = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());

        // 身份：每条记录一个节点
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), TaskIndex(i)).is_some() {
                return Err(ParagoError::DuplicateId(record.id.clone()));
            }
            tasks.push(Task::new(record.id.clone(), record.command.clone()));
        }

        // 连接：解析依赖 id
        for (i, record) in records.iter().enumerate() {
            for dep in &record.dependencies {
                let target = *index.get(dep).ok_or_else(|| ParagoError::UnknownDependency {
                    task: record.id.clone(),
                    missing: dep.clone(),
                })?;

                if tasks[i].dependencies.contains(&target) {
                    continue;
                }
                tasks[i].dependencies.push(target);
                tasks[target.0].dependents.push(TaskIndex(i));
            }
        }

        debug!(tasks = tasks.len(), "task graph built");

        Ok(Self { tasks, index })
    }

    pub fn validate(self) -> Result<ValidatedGraph> {
        cycle_check::validate(&self)?;
        Ok(ValidatedGraph(self))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, idx: TaskIndex) -> Option<&Task> {
        self.tasks.get(idx.0)
    }

    pub fn lookup(&self, id: &str) -> Option<TaskIndex> {
        self.index.get(id).copied()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.lookup(id).map(|idx| &self.tasks[idx.0])
    }

    // 按输入顺序
    pub fn tasks(&self) -> impl Iterator<Item = (TaskIndex, &Task)> {
        self.tasks.iter().enumerate().map(|(i, t)| (TaskIndex(i), t))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(Task::id)
    }

    pub(crate) fn node(&self, idx: TaskIndex) -> &Task {
        &self.tasks[idx.0]
    }
}

/// A [`TaskGraph`] that passed cycle detection.
#[derive(Debug, Clone)]
pub struct ValidatedGraph(TaskGraph);

impl ValidatedGraph {
    pub fn into_inner(self) -> TaskGraph {
        self.0
    }

    /// Group task ids into waves: wave `n` holds every task whose longest
    /// dependency chain has `n` links. Everything in one wave can run at the
    /// same time once the previous waves are done.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let graph = &self.0;
        let mut remaining: Vec<usize> = graph.tasks.iter().map(|t| t.dependencies.len()).collect();
        let mut current: Vec<TaskIndex> = graph
            .tasks()
            .filter(|(_, t)| t.dependencies.is_empty())
            .map(|(idx, _)| idx)
            .collect();
        let mut levels = Vec::new();

        while !current.is_empty() {
            let mut next = Vec::new();
            for &idx in &current {
                for &child in &graph.node(idx).dependents {
                    remaining[child.0] -= 1;
                    if remaining[child.0] == 0 {
                        next.push(child);
                    }
                }
            }
            next.sort();
            levels.push(current.iter().map(|&idx| graph.node(idx).id().to_string()).collect());
            current = next;
        }

        levels
    }
}

impl Deref for ValidatedGraph {
    type Target = TaskGraph;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
