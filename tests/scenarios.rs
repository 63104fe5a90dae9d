use std::collections::HashSet;

use parago::{ParagoError, Scheduler, TaskGraph, TaskRecord, plan};

fn rec(id: &str, deps: &[&str]) -> TaskRecord {
    TaskRecord::new(id, "...", deps.iter().copied())
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

fn complete(s: &Scheduler, id: &str) {
    s.mark_dispatched(id).unwrap();
    s.mark_completed(id).unwrap();
}

#[test]
fn build_then_test() {
    let s = plan(&[rec("build", &[]), rec("test", &["build"])]).unwrap();
    assert_eq!(s.ready(), vec!["build"]);

    complete(&s, "build");
    assert_eq!(s.ready(), vec!["test"]);

    complete(&s, "test");
    assert!(s.is_finished());
}

#[test]
fn mutual_dependency_is_a_cycle() {
    let err = plan(&[rec("a", &["b"]), rec("b", &["a"])]).unwrap_err();
    match err {
        ParagoError::CyclicDependency { cycle } => {
            assert!(
                cycle == ["a", "b", "a"] || cycle == ["b", "a", "b"],
                "unexpected witness {cycle:?}"
            );
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn missing_dependency() {
    match plan(&[rec("a", &["missing"])]) {
        Err(ParagoError::UnknownDependency { task, missing }) => {
            assert_eq!((task.as_str(), missing.as_str()), ("a", "missing"));
        }
        other => panic!("expected UnknownDependency, got {other:?}"),
    }
}

#[test]
fn diamond() {
    let s = plan(&[
        rec("a", &[]),
        rec("b", &["a"]),
        rec("c", &["a"]),
        rec("d", &["b", "c"]),
    ])
    .unwrap();

    complete(&s, "a");
    assert_eq!(sorted(s.ready()), vec!["b", "c"]);

    complete(&s, "b");
    assert!(!s.ready().contains(&"d".to_string()));
    complete(&s, "c");
    assert_eq!(s.ready(), vec!["d"]);
}

#[test]
fn ids_round_trip() {
    let records = vec![rec("z", &[]), rec("m", &["z"]), rec("a", &["m", "z"])];
    let graph = TaskGraph::build(&records).unwrap();
    let ids: HashSet<&str> = graph.ids().collect();
    let expected: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, expected);
}

#[test]
fn error_message_shows_cycle() {
    let err = plan(&[rec("a", &["a"])]).unwrap_err();
    assert_eq!(err.to_string(), "Cyclic dependency detected: a -> a");
}
