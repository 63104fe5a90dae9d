use tracing::warn;

use crate::{ParagoError, Result, TaskGraph, TaskIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

/// Fails with [`ParagoError::CyclicDependency`] if the graph has a cycle.
pub fn validate(graph: &TaskGraph) -> Result<()> {
    match find_cycle(graph) {
        Some(cycle) => {
            warn!(cycle = %cycle.join(" -> "), "cyclic dependency detected");
            Err(ParagoError::CyclicDependency { cycle })
        }
        None => Ok(()),
    }
}

/// Depth-first search over dependency edges.
///
/// Returns the first cycle met when roots are tried in input order and edges
/// in dependency-list order. The witness starts and ends at the same task,
/// e.g. `["a", "b", "a"]`; a self-dependency gives `["a", "a"]`.
pub fn find_cycle(graph: &TaskGraph) -> Option<Vec<String>> {
    let mut color = vec![Color::Unvisited; graph.len()];
    // 显式栈：(节点, 下一条待访问的边)
    let mut stack: Vec<(TaskIndex, usize)> = Vec::new();

    for (root, _) in graph.tasks() {
        if color[root.0] != Color::Unvisited {
            continue;
        }
        color[root.0] = Color::InProgress;
        stack.push((root, 0));

        while let Some((node, next)) = stack.last_mut() {
            let node = *node;
            match graph.node(node).dependencies().get(*next) {
                Some(&dep) => {
                    *next += 1;
                    match color[dep.0] {
                        Color::Unvisited => {
                            color[dep.0] = Color::InProgress;
                            stack.push((dep, 0));
                        }
                        Color::InProgress => {
                            // 回边：环从 dep 所在位置开始
                            let start = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                            let mut cycle: Vec<String> = stack[start..]
                                .iter()
                                .map(|(n, _)| graph.node(*n).id().to_string())
                                .collect();
                            cycle.push(graph.node(dep).id().to_string());
                            return Some(cycle);
                        }
                        Color::Done => {}
                    }
                }
                None => {
                    color[node.0] = Color::Done;
                    stack.pop();
                }
            }
        }
    }

    None
}
