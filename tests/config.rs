//! Layered configuration loading from TOML files

use std::io::Write;
use tasker_evaluator::config::{ConfigManager, LogFormat};
use tasker_evaluator::{
    BackendConfig, BackendKind, EvaluationRequest, EvaluatorConfig, EvaluatorError,
};

fn toml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_run_serially_without_a_store() {
    let config = EvaluatorConfig::default();

    assert_eq!(config.backend, BackendConfig::Serial);
    assert_eq!(config.execution.batch_size, None);
    assert!(!config.execution.resume);
    assert!(!config.execution.shuffle_rows);
    assert!(config.store.is_none());
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn file_settings_flow_into_a_request() {
    let file = toml_file(
        r#"
[backend]
kind = "distributed"
workers = 4
chunk_size = 8

[execution]
batch_size = 100
resume = true

[store]
url = "sqlite://runs/results.db"
table = "scores"
"#,
    );

    let manager = ConfigManager::load_from_file(file.path()).unwrap();
    let request = EvaluationRequest::from_config(manager.config());

    assert_eq!(request.backend.kind(), BackendKind::Distributed);
    assert_eq!(request.backend.chunk_size(), Some(8));
    assert_eq!(request.execution.batch_size, Some(100));
    assert!(request.execution.resume);
    let store = request.store.unwrap();
    assert_eq!(store.url, "sqlite://runs/results.db");
    assert_eq!(store.table, "scores");
    assert!(request.output_columns.is_empty());
}

#[test]
fn unknown_backend_kind_is_rejected() {
    let file = toml_file("[backend]\nkind = \"spark\"\n");
    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(err.is_configuration_error());
    match err {
        EvaluatorError::BackendUnavailable { name } => assert_eq!(name, "spark"),
        other => panic!("expected an unavailable backend, got {other:?}"),
    }
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ConfigManager::load_from_file(dir.path().join("absent.toml"));
    assert!(result.is_err());
}

#[test]
fn zero_batch_size_in_file_is_rejected() {
    let file = toml_file("[execution]\nbatch_size = 0\n");
    let err = ConfigManager::load_from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("execution.batch_size"));
}
