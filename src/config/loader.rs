//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers are merged with the
//! `config` crate in this order, later layers winning:
//!
//! 1. [`BridgeConfig::default`]
//! 2. `<config_dir>/config.json` (optional)
//! 3. `<working_dir>/config.<project_name>.json` (optional, only when a project name is set)
//! 4. `BRIDGE__SECTION__KEY` environment variables

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::BridgeConfig;
use crate::constants::{env as env_vars, files};

/// Where configuration layers are read from
///
/// Every field defaults to the process environment; tests override them to
/// stay isolated from each other.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Directory holding `config.json` (None = `BRIDGE_CONFIG_DIR` or `config`)
    pub config_directory: Option<PathBuf>,
    /// Directory searched for `config.<project_name>.json` (None = current dir)
    pub working_directory: Option<PathBuf>,
    /// Environment name (None = auto-detect)
    pub environment: Option<String>,
    /// Override variables (None = read the process environment)
    pub env_overrides: Option<HashMap<String, String>>,
}

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: BridgeConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(ConfigSources::default())
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(ConfigSources {
            config_directory: config_dir,
            ..ConfigSources::default()
        })
    }

    /// Load configuration from explicit sources
    pub fn load_from_sources(sources: ConfigSources) -> ConfigResult<Arc<ConfigManager>> {
        let environment = sources
            .environment
            .clone()
            .unwrap_or_else(Self::detect_environment);
        let config_directory = sources
            .config_directory
            .clone()
            .unwrap_or_else(Self::default_config_directory);
        let working_directory = match &sources.working_directory {
            Some(dir) => dir.clone(),
            None => env::current_dir()
                .map_err(|e| ConfigurationError::load_failed("working directory", e))?,
        };

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let base_file = config_directory.join(files::BASE_CONFIG_FILE);

        // First pass only discovers the project name, which selects the external file
        let discovery = Self::merge_layers(&base_file, None, &sources.env_overrides)?;
        let project_file = discovery
            .project_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| working_directory.join(files::project_config_file(name)));

        let config = match &project_file {
            Some(path) => Self::merge_layers(&base_file, Some(path), &sources.env_overrides)?,
            None => discovery,
        };

        config.validate()?;

        info!(
            environment = %environment,
            project_name = ?config.project_name,
            clustered = config.cluster.clustered,
            event_loop_pool_size = config.runtime.event_loop_pool_size,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory,
        }))
    }

    /// Wrap an in-code configuration (validated) without touching the filesystem
    pub fn from_config(
        config: BridgeConfig,
        environment: impl Into<String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.into(),
            config_directory: PathBuf::from(files::DEFAULT_CONFIG_DIR),
        }))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn merge_layers(
        base_file: &Path,
        project_file: Option<&Path>,
        env_overrides: &Option<HashMap<String, String>>,
    ) -> ConfigResult<BridgeConfig> {
        let defaults = Config::try_from(&BridgeConfig::default())
            .map_err(|e| ConfigurationError::load_failed("defaults", e))?;

        let mut builder = Config::builder().add_source(defaults).add_source(
            File::from(base_file.to_path_buf())
                .format(FileFormat::Json)
                .required(false),
        );

        if let Some(path) = project_file {
            debug!("Merging external configuration from {}", path.display());
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Json)
                    .required(false),
            );
        }

        let environment = Environment::with_prefix(env_vars::CONFIG_PREFIX)
            .prefix_separator(env_vars::CONFIG_SEPARATOR)
            .separator(env_vars::CONFIG_SEPARATOR)
            .try_parsing(true)
            .source(env_overrides.clone());

        builder
            .add_source(environment)
            .build()
            .map_err(|e| ConfigurationError::load_failed(base_file.display().to_string(), e))?
            .try_deserialize::<BridgeConfig>()
            .map_err(|e| ConfigurationError::load_failed(base_file.display().to_string(), e))
    }

    fn detect_environment() -> String {
        env::var(env_vars::BRIDGE_ENV)
            .or_else(|_| env::var(env_vars::APP_ENV))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var(env_vars::BRIDGE_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(files::DEFAULT_CONFIG_DIR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn isolated_sources(config_dir: &TempDir, working_dir: &TempDir) -> ConfigSources {
        ConfigSources {
            config_directory: Some(config_dir.path().to_path_buf()),
            working_directory: Some(working_dir.path().to_path_buf()),
            environment: Some("test".to_string()),
            env_overrides: Some(HashMap::new()),
        }
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let config_dir = TempDir::new().unwrap();
        let working_dir = TempDir::new().unwrap();

        let manager =
            ConfigManager::load_from_sources(isolated_sources(&config_dir, &working_dir)).unwrap();

        assert_eq!(manager.config(), &BridgeConfig::default());
        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config_directory(), config_dir.path());
    }

    #[test]
    fn test_base_file_overrides_defaults() {
        let config_dir = TempDir::new().unwrap();
        let working_dir = TempDir::new().unwrap();
        fs::write(
            config_dir.path().join("config.json"),
            r#"{"runtime": {"event_loop_pool_size": 2}, "cluster": {"port": 15701}}"#,
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_sources(isolated_sources(&config_dir, &working_dir)).unwrap();

        assert_eq!(manager.config().runtime.event_loop_pool_size, 2);
        assert_eq!(manager.config().cluster.port, 15701);
        assert!(!manager.config().cluster.clustered);
    }

    #[test]
    fn test_project_file_merges_over_base_file() {
        let config_dir = TempDir::new().unwrap();
        let working_dir = TempDir::new().unwrap();
        fs::write(
            config_dir.path().join("config.json"),
            r#"{"project_name": "orders", "cluster": {"port": 15701, "quorum_size": 2}}"#,
        )
        .unwrap();
        fs::write(
            working_dir.path().join("config.orders.json"),
            r#"{"cluster": {"port": 25701}}"#,
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_sources(isolated_sources(&config_dir, &working_dir)).unwrap();

        assert_eq!(manager.config().project_name.as_deref(), Some("orders"));
        assert_eq!(manager.config().cluster.port, 25701);
        assert_eq!(manager.config().cluster.quorum_size, 2);
    }

    #[test]
    fn test_environment_overrides_win() {
        let config_dir = TempDir::new().unwrap();
        let working_dir = TempDir::new().unwrap();
        fs::write(
            config_dir.path().join("config.json"),
            r#"{"cluster": {"clustered": false, "port": 15701}}"#,
        )
        .unwrap();

        let mut sources = isolated_sources(&config_dir, &working_dir);
        sources.env_overrides = Some(HashMap::from([
            ("BRIDGE__CLUSTER__CLUSTERED".to_string(), "true".to_string()),
            ("BRIDGE__CLUSTER__PORT".to_string(), "35701".to_string()),
        ]));

        let manager = ConfigManager::load_from_sources(sources).unwrap();

        assert!(manager.config().cluster.clustered);
        assert_eq!(manager.config().cluster.port, 35701);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config_dir = TempDir::new().unwrap();
        let working_dir = TempDir::new().unwrap();
        fs::write(
            config_dir.path().join("config.json"),
            r#"{"runtime": {"worker_pool_size": 0}}"#,
        )
        .unwrap();

        let err = ConfigManager::load_from_sources(isolated_sources(&config_dir, &working_dir))
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_malformed_file_is_a_load_failure() {
        let config_dir = TempDir::new().unwrap();
        let working_dir = TempDir::new().unwrap();
        fs::write(config_dir.path().join("config.json"), "{ not json").unwrap();

        let err = ConfigManager::load_from_sources(isolated_sources(&config_dir, &working_dir))
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::LoadFailed { .. }));
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = BridgeConfig::default();
        config.deployment.max_deployments = 0;

        assert!(ConfigManager::from_config(config, "test").is_err());
        assert!(ConfigManager::from_config(BridgeConfig::default(), "test").is_ok());
    }
}
