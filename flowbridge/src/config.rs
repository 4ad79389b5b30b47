//! Host configuration
//!
//! Values are layered, highest precedence last:
//! 1. Defaults
//! 2. `FLOWBRIDGE_*` environment variables
//! 3. `flowbridge.yaml` in the working directory (or an explicit path)

use crate::common::env_loader::{EnvLoader, InvalidEnvValue};
use crate::runtime::{DEFAULT_MAX_HISTORY_SIZE, DEFAULT_MAX_TURN_ITEMS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Name of the YAML configuration file
pub const CONFIG_FILE_NAME: &str = "flowbridge.yaml";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "FLOWBRIDGE";

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        /// Path to the configuration file that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        /// Path to the configuration file with invalid YAML content
        path: PathBuf,
        /// Underlying YAML parsing error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the configuration field that has an invalid value
        field: String,
        /// The invalid value that was provided
        value: String,
        /// Helpful hint about how to fix the issue
        hint: String,
    },
}

impl From<InvalidEnvValue> for ConfigError {
    fn from(invalid: InvalidEnvValue) -> Self {
        ConfigError::InvalidValue {
            hint: format!("{} could not be parsed", invalid.key),
            field: invalid.key,
            value: invalid.value,
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which dispatcher the host uses by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherKind {
    /// Start operations on the scheduler thread
    #[default]
    Inline,
    /// Start operations as tokio tasks
    Pool,
}

impl FromStr for DispatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(DispatcherKind::Inline),
            "pool" => Ok(DispatcherKind::Pool),
            other => Err(format!("unknown dispatcher '{}'", other)),
        }
    }
}

impl fmt::Display for DispatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherKind::Inline => write!(f, "inline"),
            DispatcherKind::Pool => write!(f, "pool"),
        }
    }
}

/// Settings of a [`WorkflowHost`](crate::runtime::WorkflowHost)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Events kept per instance history (default: 10000)
    pub max_history_size: usize,
    /// Save a snapshot whenever an instance goes idle (default: true)
    pub persist_on_idle: bool,
    /// Work items processed before yielding to tokio (default: 1024)
    pub max_turn_items: usize,
    /// Default dispatcher (default: inline)
    pub default_dispatcher: DispatcherKind,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_history_size: DEFAULT_MAX_HISTORY_SIZE,
            persist_on_idle: true,
            max_turn_items: DEFAULT_MAX_TURN_ITEMS,
            default_dispatcher: DispatcherKind::Inline,
        }
    }
}

impl HostConfig {
    /// Load configuration, falling back to defaults on any error
    pub fn new() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from the environment and the working directory
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(Self::find_yaml_config_file().as_deref())
    }

    /// Load configuration from the environment and an optional YAML file
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env_vars()?;
        if let Some(path) = path {
            YamlConfig::load_from_file(path)?.apply_to_config(&mut config);
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable configuration to this config
    pub fn apply_env_vars(&mut self) -> ConfigResult<()> {
        let loader = EnvLoader::new(ENV_PREFIX);

        if let Some(value) = loader.load_checked("MAX_HISTORY_SIZE")? {
            self.max_history_size = value;
        }
        if let Some(value) = loader.load_checked("PERSIST_ON_IDLE")? {
            self.persist_on_idle = value;
        }
        if let Some(value) = loader.load_checked("MAX_TURN_ITEMS")? {
            self.max_turn_items = value;
        }
        if let Some(value) = loader.load_checked("DEFAULT_DISPATCHER")? {
            self.default_dispatcher = value;
        }
        Ok(())
    }

    /// Find `flowbridge.yaml` in the working directory
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        let path = PathBuf::from(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!("Found configuration file: {:?}", path);
            Some(path)
        } else {
            None
        }
    }

    /// Validate the current configuration settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_history_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_history_size".to_string(),
                value: self.max_history_size.to_string(),
                hint: "max_history_size must be at least 1".to_string(),
            });
        }
        if self.max_turn_items == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_turn_items".to_string(),
                value: self.max_turn_items.to_string(),
                hint: "max_turn_items must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Example YAML configuration file content
    pub fn example_yaml_config() -> &'static str {
        r#"# flowbridge.yaml
# Events kept in each instance history
max_history_size: 10000
# Save a snapshot whenever an instance goes idle
persist_on_idle: true
# Work items processed before yielding to the tokio scheduler
max_turn_items: 1024
# Default dispatcher: inline or pool
default_dispatcher: inline
"#
    }
}

/// Values read from `flowbridge.yaml`; absent keys keep lower layers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    /// Events kept per instance history
    pub max_history_size: Option<usize>,
    /// Save a snapshot whenever an instance goes idle
    pub persist_on_idle: Option<bool>,
    /// Work items processed before yielding to tokio
    pub max_turn_items: Option<usize>,
    /// Default dispatcher
    pub default_dispatcher: Option<DispatcherKind>,
}

impl YamlConfig {
    /// Apply YAML configuration values to an existing config
    pub fn apply_to_config(&self, config: &mut HostConfig) {
        if let Some(value) = self.max_history_size {
            config.max_history_size = value;
        }
        if let Some(value) = self.persist_on_idle {
            config.persist_on_idle = value;
        }
        if let Some(value) = self.max_turn_items {
            config.max_turn_items = value;
        }
        if let Some(value) = self.default_dispatcher {
            config.default_dispatcher = value;
        }
    }

    /// Load YAML configuration from a file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading YAML configuration from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const ENV_KEYS: [&str; 4] = [
        "FLOWBRIDGE_MAX_HISTORY_SIZE",
        "FLOWBRIDGE_PERSIST_ON_IDLE",
        "FLOWBRIDGE_MAX_TURN_ITEMS",
        "FLOWBRIDGE_DEFAULT_DISPATCHER",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn yaml_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert_eq!(config.max_history_size, 10000);
        assert!(config.persist_on_idle);
        assert_eq!(config.max_turn_items, 1024);
        assert_eq!(config.default_dispatcher, DispatcherKind::Inline);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        clear_env();
        std::env::set_var("FLOWBRIDGE_MAX_TURN_ITEMS", "16");
        std::env::set_var("FLOWBRIDGE_PERSIST_ON_IDLE", "false");
        std::env::set_var("FLOWBRIDGE_DEFAULT_DISPATCHER", "Pool");

        let config = HostConfig::load_from(None).unwrap();
        assert_eq!(config.max_turn_items, 16);
        assert!(!config.persist_on_idle);
        assert_eq!(config.default_dispatcher, DispatcherKind::Pool);
        assert_eq!(config.max_history_size, 10000);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_yaml_overrides_env() {
        clear_env();
        std::env::set_var("FLOWBRIDGE_MAX_TURN_ITEMS", "16");
        std::env::set_var("FLOWBRIDGE_MAX_HISTORY_SIZE", "50");
        let file = yaml_file("max_turn_items: 8\ndefault_dispatcher: pool\n");

        let config = HostConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.max_turn_items, 8);
        assert_eq!(config.max_history_size, 50);
        assert_eq!(config.default_dispatcher, DispatcherKind::Pool);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_is_reported() {
        clear_env();
        std::env::set_var("FLOWBRIDGE_MAX_TURN_ITEMS", "many");

        match HostConfig::load_from(None) {
            Err(ConfigError::InvalidValue { field, value, .. }) => {
                assert_eq!(field, "FLOWBRIDGE_MAX_TURN_ITEMS");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected result {other:?}"),
        }

        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_turn_items_fails_validation() {
        clear_env();
        let file = yaml_file("max_turn_items: 0\n");
        assert!(matches!(
            HostConfig::load_from(Some(file.path())),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_malformed_yaml_is_reported() {
        clear_env();
        let file = yaml_file("max_turn_items: [unclosed\n");
        assert!(matches!(
            HostConfig::load_from(Some(file.path())),
            Err(ConfigError::YamlParse { .. })
        ));

        let unknown = yaml_file("max_turns: 3\n");
        assert!(matches!(
            HostConfig::load_from(Some(unknown.path())),
            Err(ConfigError::YamlParse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = YamlConfig::load_from_file("/nonexistent/flowbridge.yaml");
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }

    #[test]
    fn test_example_yaml_parses() {
        let parsed: YamlConfig = serde_yaml::from_str(HostConfig::example_yaml_config()).unwrap();
        let mut config = HostConfig::default();
        parsed.apply_to_config(&mut config);
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn test_dispatcher_kind_parsing() {
        assert_eq!("INLINE".parse::<DispatcherKind>(), Ok(DispatcherKind::Inline));
        assert!("threads".parse::<DispatcherKind>().is_err());
        assert_eq!(DispatcherKind::Pool.to_string(), "pool");
    }
}
