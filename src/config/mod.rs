//! # Evaluator Configuration
//!
//! Serde-deserialisable configuration for a run: which backend executes the
//! tasks, how the residual set is batched, where results are persisted and
//! how logs are emitted.
//!
//! ## Architecture
//!
//! - **Tagged backend selection**: [`BackendConfig`] is a closed enum keyed by
//!   `kind`; there is no open-ended backend discovery
//! - **Layered loading**: [`ConfigManager`] merges defaults, an optional TOML
//!   file and environment overrides through the `config` crate
//! - **Explicit validation**: zero sizes and empty store locations are rejected
//!   before a run starts
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_evaluator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_env()?;
//! let batch_size = manager.config().execution.batch_size;
//! let backend = manager.config().backend.kind();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::DEFAULT_TABLE_NAME;
use crate::error::EvaluatorError;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Execution backend
    pub backend: BackendConfig,

    /// Batching and run-loop behaviour
    pub execution: ExecutionConfig,

    /// Persisted store; `None` runs without resume support
    pub store: Option<StoreConfig>,

    /// Log output
    pub logging: LoggingConfig,
}

impl EvaluatorConfig {
    /// Reject values that would make a run misbehave
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution.batch_size == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "execution.batch_size",
                "0",
                "batch size must be positive (leave unset for a single batch)",
            ));
        }
        self.backend.validate()?;
        if let Some(store) = &self.store {
            store.validate()?;
        }
        Ok(())
    }
}

/// Names of the execution backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Serial,
    WorkerPool,
    Distributed,
    Interactive,
    VectorizedFrame,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Serial,
        BackendKind::WorkerPool,
        BackendKind::Distributed,
        BackendKind::Interactive,
        BackendKind::VectorizedFrame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Serial => "serial",
            BackendKind::WorkerPool => "worker-pool",
            BackendKind::Distributed => "distributed",
            BackendKind::Interactive => "interactive",
            BackendKind::VectorizedFrame => "vectorized-frame",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = EvaluatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "serial" => Ok(BackendKind::Serial),
            "worker-pool" => Ok(BackendKind::WorkerPool),
            "distributed" => Ok(BackendKind::Distributed),
            "interactive" => Ok(BackendKind::Interactive),
            "vectorized-frame" => Ok(BackendKind::VectorizedFrame),
            other => Err(EvaluatorError::backend_unavailable(other)),
        }
    }
}

/// Backend selection plus its variant-specific settings
///
/// `chunk_size` is the number of tasks shipped to a worker as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// Single thread, fully ordered
    #[default]
    Serial,

    /// Fixed pool of OS threads pulling from a shared queue
    WorkerPool {
        processes: Option<usize>,
        chunk_size: Option<usize>,
    },

    /// Remote-style futures collected as they complete
    Distributed {
        workers: Option<usize>,
        chunk_size: Option<usize>,
    },

    /// Load-balanced long-lived engines
    Interactive {
        engines: Option<usize>,
        high_water_mark: Option<usize>,
        chunk_size: Option<usize>,
    },

    /// Column-oriented partitions evaluated concurrently
    VectorizedFrame {
        partitions: Option<usize>,
        chunk_size: Option<usize>,
    },
}

impl BackendConfig {
    /// Default configuration for a backend name (`None` selects serial)
    ///
    /// Unknown names fail instead of falling back to serial.
    pub fn from_name(name: Option<&str>) -> Result<Self, EvaluatorError> {
        let kind = match name {
            None => BackendKind::Serial,
            Some(name) => name.parse()?,
        };
        Ok(Self::for_kind(kind))
    }

    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Serial => BackendConfig::Serial,
            BackendKind::WorkerPool => BackendConfig::WorkerPool {
                processes: None,
                chunk_size: None,
            },
            BackendKind::Distributed => BackendConfig::Distributed {
                workers: None,
                chunk_size: None,
            },
            BackendKind::Interactive => BackendConfig::Interactive {
                engines: None,
                high_water_mark: None,
                chunk_size: None,
            },
            BackendKind::VectorizedFrame => BackendConfig::VectorizedFrame {
                partitions: None,
                chunk_size: None,
            },
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Serial => BackendKind::Serial,
            BackendConfig::WorkerPool { .. } => BackendKind::WorkerPool,
            BackendConfig::Distributed { .. } => BackendKind::Distributed,
            BackendConfig::Interactive { .. } => BackendKind::Interactive,
            BackendConfig::VectorizedFrame { .. } => BackendKind::VectorizedFrame,
        }
    }

    pub fn chunk_size(&self) -> Option<usize> {
        match self {
            BackendConfig::Serial => None,
            BackendConfig::WorkerPool { chunk_size, .. }
            | BackendConfig::Distributed { chunk_size, .. }
            | BackendConfig::Interactive { chunk_size, .. }
            | BackendConfig::VectorizedFrame { chunk_size, .. } => *chunk_size,
        }
    }

    /// Fill in `chunk_size` when the variant has none configured
    pub fn with_default_chunk_size(mut self, default: Option<usize>) -> Self {
        match &mut self {
            BackendConfig::Serial => {}
            BackendConfig::WorkerPool { chunk_size, .. }
            | BackendConfig::Distributed { chunk_size, .. }
            | BackendConfig::Interactive { chunk_size, .. }
            | BackendConfig::VectorizedFrame { chunk_size, .. } => {
                if chunk_size.is_none() {
                    *chunk_size = default;
                }
            }
        }
        self
    }

    fn validate(&self) -> ConfigResult<()> {
        let positive = |field: &str, value: Option<usize>| -> ConfigResult<()> {
            if value == Some(0) {
                return Err(ConfigurationError::invalid_value(
                    format!("backend.{field}"),
                    "0",
                    "must be positive",
                ));
            }
            Ok(())
        };

        positive("chunk_size", self.chunk_size())?;
        match self {
            BackendConfig::Serial => Ok(()),
            BackendConfig::WorkerPool { processes, .. } => positive("processes", *processes),
            BackendConfig::Distributed { workers, .. } => positive("workers", *workers),
            BackendConfig::Interactive {
                engines,
                high_water_mark,
                ..
            } => {
                positive("engines", *engines)?;
                positive("high_water_mark", *high_water_mark)
            }
            BackendConfig::VectorizedFrame { partitions, .. } => {
                positive("partitions", *partitions)
            }
        }
    }
}

/// Batching and run-loop behaviour
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Tasks per batch; `None` runs the residual set as one batch
    pub batch_size: Option<usize>,

    /// Shuffle residual tasks before batching to spread slow rows
    pub shuffle_rows: bool,

    /// Resume from the persisted store instead of overwriting it
    pub resume: bool,

    /// Treat Ctrl-C as an operator interrupt
    pub handle_ctrl_c: bool,
}

/// Persisted store location
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// `sqlite://...` URL, or a plain file path
    pub url: String,

    #[serde(default = "default_table_name")]
    pub table: String,
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

impl StoreConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            table: default_table_name(),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "store.url",
                "",
                "store location must not be empty",
            ));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "store.table",
                "",
                "table name must not be empty",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,

    /// Filter directive; overrides the environment-derived level
    pub level: Option<String>,
}
