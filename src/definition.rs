//! Decoding of task definition files.
//!
//! A definition document is a YAML mapping from task id to definition. Two
//! styles are accepted and may be mixed:
//!
//! ```yaml
//! build: cargo build            # shorthand: just a command
//! test:                         # full form
//!   cmd: cargo test
//!   deps: [build]
//! ```
//!
//! Records come out in document order.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::TaskRecord;

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("task {0}: cmd field missing")]
    MissingCmd(String),
    #[error("task {0}: cmd is not a string")]
    CmdNotString(String),
    #[error("task {0}: invalid definition")]
    InvalidDefinition(String),
    #[error("task {0}: deps is not an array")]
    DepsNotArray(String),
    #[error("task {0}: deps is not an array of strings")]
    DepsNotArrayOfStrings(String),
    #[error("document is not a mapping of task definitions")]
    NotAMapping,
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Vec<TaskRecord>, DefinitionError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), "loading task definitions");
    parse_str(&contents)
}

pub fn parse_reader(mut reader: impl Read) -> Result<Vec<TaskRecord>, DefinitionError> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    parse_str(&contents)
}

pub fn parse_str(input: &str) -> Result<Vec<TaskRecord>, DefinitionError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let raw: Value = serde_yaml::from_str(input)?;
    let mapping = match raw {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Ok(Vec::new()),
        _ => return Err(DefinitionError::NotAMapping),
    };

    let mut records = Vec::with_capacity(mapping.len());
    for (key, def) in mapping {
        let id = match key {
            Value::String(id) => id,
            other => return Err(DefinitionError::InvalidDefinition(render_key(&other))),
        };
        records.push(parse_task(id, def)?);
    }

    Ok(records)
}

fn parse_task(id: String, def: Value) -> Result<TaskRecord, DefinitionError> {
    match def {
        Value::String(command) => Ok(TaskRecord {
            id,
            command,
            dependencies: Vec::new(),
        }),
        Value::Mapping(fields) => {
            let command = match fields.get("cmd") {
                Some(Value::String(cmd)) => cmd.clone(),
                Some(_) => return Err(DefinitionError::CmdNotString(id)),
                None => return Err(DefinitionError::MissingCmd(id)),
            };

            let dependencies = match fields.get("deps") {
                None => Vec::new(),
                Some(Value::Sequence(items)) => {
                    let mut deps = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(dep) => deps.push(dep.clone()),
                            _ => return Err(DefinitionError::DepsNotArrayOfStrings(id)),
                        }
                    }
                    deps
                }
                Some(_) => return Err(DefinitionError::DepsNotArray(id)),
            };

            Ok(TaskRecord {
                id,
                command,
                dependencies,
            })
        }
        // 例如 `build: 3`
        _ => Err(DefinitionError::InvalidDefinition(id)),
    }
}

fn render_key(key: &Value) -> String {
    serde_yaml::to_string(key)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "<unprintable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorthand() {
        let yaml = "
build: echo Building
test: echo Testing
";
        let tasks = parse_str(yaml).unwrap();
        assert_eq!(
            tasks,
            vec![
                TaskRecord::new("build", "echo Building", Vec::<String>::new()),
                TaskRecord::new("test", "echo Testing", Vec::<String>::new()),
            ]
        );
    }

    #[test]
    fn full_definition() {
        let yaml = "
build:
    cmd: echo Building
test:
    cmd: echo Testing
    deps: [build]
";
        let tasks = parse_str(yaml).unwrap();
        assert_eq!(tasks[0], TaskRecord::new("build", "echo Building", Vec::<String>::new()));
        assert_eq!(tasks[1], TaskRecord::new("test", "echo Testing", ["build"]));
    }

    #[test]
    fn mixed_styles_keep_document_order() {
        let yaml = "
zeta: echo z
alpha:
    cmd: echo a
    deps: [zeta]
mid: echo m
";
        let ids: Vec<String> = parse_str(yaml).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn missing_cmd() {
        let err = parse_str("build:\n    deps: []\n").unwrap_err();
        assert!(matches!(err, DefinitionError::MissingCmd(id) if id == "build"));
    }

    #[test]
    fn cmd_not_string() {
        let err = parse_str("build:\n    cmd: [echo, hi]\n").unwrap_err();
        assert!(matches!(err, DefinitionError::CmdNotString(_)));
    }

    #[test]
    fn deps_not_array() {
        let err = parse_str("build:\n    cmd: make\n    deps: lint\n").unwrap_err();
        assert!(matches!(err, DefinitionError::DepsNotArray(_)));
    }

    #[test]
    fn deps_not_array_of_strings() {
        let err = parse_str("build:\n    cmd: make\n    deps: [lint, {a: b}]\n").unwrap_err();
        assert!(matches!(err, DefinitionError::DepsNotArrayOfStrings(_)));
    }

    #[test]
    fn invalid_definition() {
        let err = parse_str("build: 3\n").unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidDefinition(id) if id == "build"));
    }

    #[test]
    fn top_level_sequence_is_rejected() {
        assert!(matches!(parse_str("- build\n- test\n"), Err(DefinitionError::NotAMapping)));
    }

    #[test]
    fn syntax_error_is_reported() {
        assert!(matches!(parse_str("build: [unclosed\n"), Err(DefinitionError::Yaml(_))));
    }

    #[test]
    fn empty_document_has_no_tasks() {
        assert!(parse_str("").unwrap().is_empty());
        assert!(parse_str("# nothing here\n").unwrap().is_empty());
    }

    #[test]
    fn reader_and_path_agree() {
        let yaml = "build: make\n";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parago.yaml");
        std::fs::write(&path, yaml).unwrap();

        assert_eq!(load_from_path(&path).unwrap(), parse_reader(yaml.as_bytes()).unwrap());
    }
}
