//! Configuration Loader
//!
//! Layers, lowest precedence first:
//!
//! 1. struct defaults
//! 2. an optional TOML file (`TASKER_EVALUATOR_CONFIG_PATH` or an explicit path)
//! 3. `EVALUATOR__<SECTION>__<KEY>` environment variables
//! 4. `PARALLEL_BATCH_SIZE` / `PARALLEL_CHUNK_SIZE` (`0` means unset)
//!
//! The merged result is validated before it is handed out. An unknown
//! `backend.kind` is reported as an unavailable backend rather than a parse
//! failure.

use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::{BackendKind, EvaluatorConfig};
use crate::constants::env as env_vars;
use crate::error::Result;

/// Loaded and validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: EvaluatorConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load using the file named by `TASKER_EVALUATOR_CONFIG_PATH`, if any
    pub fn load_from_env() -> Result<Self> {
        let path = env::var(env_vars::CONFIG_PATH).ok().map(PathBuf::from);
        Self::load(path.as_deref())
    }

    /// Load with an explicit TOML file as the base layer
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(Some(path.as_ref()))
    }

    /// Wrap an already-built configuration, validating it
    pub fn from_config(config: EvaluatorConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source: None,
        })
    }

    fn load(path: Option<&Path>) -> Result<Self> {
        let layered = layered_sources(path)?;
        if let Ok(kind) = layered.get_string("backend.kind") {
            kind.parse::<BackendKind>()?;
        }
        let mut config: EvaluatorConfig = layered
            .try_deserialize()
            .map_err(ConfigurationError::from)?;

        let chunk_size = read_size_override(env_vars::PARALLEL_CHUNK_SIZE)?;
        config.backend = config.backend.with_default_chunk_size(chunk_size);

        config.validate()?;

        info!(
            backend = %config.backend.kind(),
            batch_size = ?config.execution.batch_size,
            chunk_size = ?config.backend.chunk_size(),
            resume = config.execution.resume,
            store = config.store.is_some(),
            "Configuration loaded successfully"
        );

        Ok(Self {
            config,
            source: path.map(Path::to_path_buf),
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn into_config(self) -> EvaluatorConfig {
        self.config
    }

    /// File the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn layered_sources(path: Option<&Path>) -> ConfigResult<Config> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        debug!(path = %path.display(), "Loading evaluator configuration file");
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(env_vars::CONFIG_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let batch_size = read_size_override(env_vars::PARALLEL_BATCH_SIZE)?;
    builder = builder.set_override_option(
        "execution.batch_size",
        batch_size.map(|size| size as i64),
    )?;

    Ok(builder.build()?)
}

fn read_size_override(name: &str) -> ConfigResult<Option<usize>> {
    parse_size_override(name, env::var(name).ok().as_deref())
}

/// `None`, empty and `0` all mean "unset"
fn parse_size_override(name: &str, raw: Option<&str>) -> ConfigResult<Option<usize>> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let size: usize = raw.parse().map_err(|_| {
        ConfigurationError::invalid_value(name, raw, "expected a non-negative integer")
    })?;
    info!("Using {}={}", name, size);
    Ok((size > 0).then_some(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, BackendKind};
    use std::io::Write;

    #[test]
    fn size_overrides_treat_zero_as_unset() {
        assert_eq!(parse_size_override("X", None).unwrap(), None);
        assert_eq!(parse_size_override("X", Some("")).unwrap(), None);
        assert_eq!(parse_size_override("X", Some("0")).unwrap(), None);
        assert_eq!(parse_size_override("X", Some(" 12 ")).unwrap(), Some(12));
        assert!(parse_size_override("X", Some("-3")).is_err());
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[backend]
kind = "interactive"
engines = 3
high_water_mark = 2

[execution]
shuffle_rows = true
resume = true

[store]
url = "results.db"

[logging]
format = "json"
"#
        )
        .unwrap();

        let manager = ConfigManager::load_from_file(file.path()).unwrap();
        let config = manager.config();

        assert_eq!(config.backend.kind(), BackendKind::Interactive);
        assert!(matches!(
            config.backend,
            BackendConfig::Interactive {
                engines: Some(3),
                high_water_mark: Some(2),
                ..
            }
        ));
        assert!(config.execution.shuffle_rows);
        assert!(config.execution.resume);
        assert_eq!(config.store.as_ref().unwrap().table, "results");
        assert_eq!(manager.source(), Some(file.path()));
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[backend]\nkind = \"worker-pool\"\nprocesses = 0").unwrap();
        assert!(ConfigManager::load_from_file(file.path()).is_err());
    }

    #[test]
    fn unknown_backend_kind_is_unavailable() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[backend]\nkind = \"spark\"").unwrap();
        let err = ConfigManager::load_from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EvaluatorError::BackendUnavailable { ref name } if name == "spark"
        ));
    }

    #[test]
    fn from_config_validates() {
        let mut config = EvaluatorConfig::default();
        config.execution.batch_size = Some(0);
        assert!(ConfigManager::from_config(config).is_err());
    }
}
