//! Configuration Loader
//!
//! Environment-aware configuration loading. An optional file (TOML, YAML or
//! JSON, chosen by extension) is layered under `CMS_RESILIENCE__*` environment
//! variables, e.g. `CMS_RESILIENCE__STREAM__MAX_RECONNECT_ATTEMPTS=8`.

use super::error::{ConfigResult, ConfigurationError};
use super::ResilienceConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "CMS_RESILIENCE";

/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";

/// Default file location, used by [`ConfigManager::load`] when present
pub const DEFAULT_CONFIG_FILE: &str = "config/cms-resilience.toml";

/// Loaded and validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: ResilienceConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default file (if it exists) and the environment
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        let file = default_path.is_file().then_some(default_path);
        Self::build(file, true)
    }

    /// Load configuration from a specific file plus environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::build(Some(path.to_path_buf()), true)
    }

    /// Load a file without consulting environment variables.
    /// Useful for tests that must not depend on the process environment.
    pub fn load_file_only(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigurationError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::build(Some(path.to_path_buf()), false)
    }

    /// Wrap an already-constructed configuration after validating it
    pub fn from_config(config: ResilienceConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_file: None,
        }))
    }

    fn build(file: Option<PathBuf>, with_env: bool) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        let mut builder = config::Config::builder();

        if let Some(path) = &file {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        if with_env {
            builder = builder.add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let source_name = file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        let config: ResilienceConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|e| ConfigurationError::parse_error(source_name.clone(), e))?;

        config.validate()?;

        info!(
            environment = %environment,
            source = %source_name,
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_reconnect_attempts = config.stream.max_reconnect_attempts,
            conflict_strategy = ?config.sync.conflict_resolution_strategy,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_file: file,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Detected deployment environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File the configuration was read from, if any
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("CMS_RESILIENCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::degradation::FallbackStrategy;
    use crate::sync::ConflictStrategy;
    use std::io::Write;

    fn write_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_toml_file_overrides_defaults() {
        let file = write_file(
            ".toml",
            r#"
[circuit_breaker]
failure_threshold = 3
reset_timeout_ms = 1000

[degradation.fallback_strategies]
content_read = "cache"
drafts = "queue"

[sync]
conflict_resolution_strategy = "remote_wins"
invalidation_delay_ms = 250
"#,
        );

        let manager = ConfigManager::load_file_only(file.path()).unwrap();
        let config = manager.config();

        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.circuit_breaker.reset_timeout_ms, 1000);
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.degradation.strategy_for("drafts"), FallbackStrategy::Queue);
        assert_eq!(
            config.sync.conflict_resolution_strategy,
            ConflictStrategy::RemoteWins
        );
        assert_eq!(config.sync.invalidation_delay_ms, 250);
        assert_eq!(manager.source_file(), Some(file.path()));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file = write_file(
            ".toml",
            r#"
[degradation]
degradation_threshold = 1.5
"#,
        );

        let err = ConfigManager::load_file_only(file.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ConfigManager::load_from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigurationError::FileNotFound { .. }));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = ResilienceConfig::default();
        config.coordination.max_batch_size = 0;
        assert!(ConfigManager::from_config(config).is_err());
        assert!(ConfigManager::from_config(ResilienceConfig::default()).is_ok());
    }
}
