//! Large Computation Demo
//!
//! Evaluates a slow function over 20 rows, two of which fail, and prints the
//! resulting table.
//!
//! Usage:
//!   cargo run --example large_computation -- [backend] [batch_size] [chunk_size]
//!   cargo run --example large_computation -- worker-pool 5 2
//!   TASKER_EVALUATOR_CONFIG_PATH=evaluator.toml cargo run --example large_computation

use anyhow::Result;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;
use tasker_evaluator::config::ConfigManager;
use tasker_evaluator::logging::init_structured_logging;
use tasker_evaluator::prelude::*;
use tracing::info;

fn slow_plus_ten(row: &Row, _args: &ExtraArgs) -> Result<Row, EvalError> {
    std::thread::sleep(Duration::from_millis(200));

    let data = row.get("data").and_then(Value::as_i64).unwrap_or_default();
    if data == 1 || data == 3 {
        return Err(EvalError::msg(format!("The value {data} is forbidden")));
    }
    Ok([("out".to_string(), json!(data + 10))].into_iter().collect())
}

fn parse_size(arg: Option<String>) -> Result<Option<usize>> {
    Ok(match arg {
        Some(raw) => Some(raw.parse::<usize>()?).filter(|size| *size > 0),
        None => None,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let manager = ConfigManager::load_from_env()?;
    init_structured_logging(&manager.config().logging);

    let mut args = env::args().skip(1);
    let backend_name = args.next();
    let batch_size = parse_size(args.next())?;
    let chunk_size = parse_size(args.next())?;

    let mut request = EvaluationRequest::from_config(manager.config())
        .with_output("out", json!(0))
        .handle_ctrl_c(true);
    if let Some(name) = backend_name.as_deref() {
        request = request.with_backend(BackendConfig::from_name(Some(name))?);
    }
    if batch_size.is_some() {
        request.execution.batch_size = batch_size;
    }
    request.backend = request.backend.with_default_chunk_size(chunk_size);

    let dataset = Dataset::from_rows(
        (0..20)
            .map(|i| [("data".to_string(), json!(i))].into_iter().collect())
            .collect(),
    )?;

    info!(backend = %request.backend.kind(), "Starting large computation");
    let report = evaluate(dataset, slow_plus_ten, request).await?;

    for row in report.table.iter() {
        println!(
            "{:>3}  data={:<4} out={:<4} exception={}",
            row.id,
            row.value("data").unwrap_or(Value::Null),
            row.value("out").unwrap_or(Value::Null),
            row.exception.as_deref().map_or("-", |e| e.lines().next().unwrap_or("")),
        );
    }
    println!("{}", serde_json::to_string_pretty(&report.stats)?);
    Ok(())
}
