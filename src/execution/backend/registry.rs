//! Backend registry
//!
//! Closed set of backends compiled into this build. Selecting a backend the
//! build does not offer fails with [`EvaluatorError::BackendUnavailable`]
//! before any work starts.

use std::collections::BTreeSet;
use tracing::info;

use super::{Mapper, SerialBackend, WorkerPoolBackend};
use crate::config::{BackendConfig, BackendKind};
use crate::constants::available_parallelism;
use crate::error::{EvaluatorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRegistry {
    available: BTreeSet<BackendKind>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::from_features()
    }
}

impl BackendRegistry {
    /// Backends enabled by the crate features of this build
    pub fn from_features() -> Self {
        let mut available = BTreeSet::from([BackendKind::Serial, BackendKind::WorkerPool]);
        if cfg!(feature = "distributed") {
            available.insert(BackendKind::Distributed);
        }
        if cfg!(feature = "interactive") {
            available.insert(BackendKind::Interactive);
        }
        if cfg!(feature = "vectorized-frame") {
            available.insert(BackendKind::VectorizedFrame);
        }
        Self { available }
    }

    /// Registry restricted to `kinds`; kinds this build lacks are ignored
    pub fn restricted_to(kinds: impl IntoIterator<Item = BackendKind>) -> Self {
        let compiled = Self::from_features().available;
        Self {
            available: kinds
                .into_iter()
                .filter(|kind| compiled.contains(kind))
                .collect(),
        }
    }

    pub fn is_available(&self, kind: BackendKind) -> bool {
        self.available.contains(&kind)
    }

    pub fn available(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.available.iter().copied()
    }

    /// Construct and start the configured backend
    pub fn build(&self, config: &BackendConfig) -> Result<Box<dyn Mapper>> {
        let kind = config.kind();
        if !self.is_available(kind) {
            return Err(EvaluatorError::backend_unavailable(kind.as_str()));
        }

        let mapper: Box<dyn Mapper> = match config {
            BackendConfig::Serial => Box::new(SerialBackend::new()),
            BackendConfig::WorkerPool {
                processes,
                chunk_size,
            } => Box::new(WorkerPoolBackend::start(
                processes.unwrap_or_else(available_parallelism),
                *chunk_size,
            )?),
            #[cfg(feature = "distributed")]
            BackendConfig::Distributed {
                workers,
                chunk_size,
            } => Box::new(super::DistributedBackend::new(
                workers.unwrap_or_else(available_parallelism),
                *chunk_size,
            )),
            #[cfg(feature = "interactive")]
            BackendConfig::Interactive {
                engines,
                high_water_mark,
                chunk_size,
            } => Box::new(super::InteractiveBackend::start(
                engines.unwrap_or_else(available_parallelism),
                high_water_mark.unwrap_or(crate::constants::defaults::HIGH_WATER_MARK),
                *chunk_size,
            )?),
            #[cfg(feature = "vectorized-frame")]
            BackendConfig::VectorizedFrame {
                partitions,
                chunk_size,
            } => Box::new(super::VectorizedFrameBackend::new(
                partitions.unwrap_or_else(available_parallelism),
                *chunk_size,
            )),
            #[allow(unreachable_patterns)]
            _ => return Err(EvaluatorError::backend_unavailable(kind.as_str())),
        };

        info!(
            backend = %mapper.kind(),
            parallelism = mapper.parallelism(),
            "Execution backend ready"
        );
        Ok(mapper)
    }
}
