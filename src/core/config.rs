//! Configuration management

use clap::Parser;
use config::{
    builder::DefaultState, Config as ConfigBuilder, ConfigBuilder as Builder,
    ConfigError as BuilderError, Environment, File,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{Action, FormatVersion};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid bridge configuration: {0}")]
    InvalidBridge(String),

    #[error("Invalid relay configuration: {0}")]
    InvalidRelay(String),

    #[error("Invalid logging configuration: {0}")]
    InvalidLogging(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

impl From<BuilderError> for ConfigError {
    fn from(err: BuilderError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: CLI args > Environment variables > Config file > Defaults
    pub fn load(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        // 1. Defaults (lowest priority)
        let mut builder = with_defaults(ConfigBuilder::builder())?;

        // 2. Config file if specified
        if let Some(config_path) = &cli_args.config {
            if !config_path.exists() {
                return Err(ConfigError::FileNotFound(config_path.display().to_string()));
            }
            builder = builder.add_source(File::from(config_path.as_path()));
        }

        // 3. Environment variables, prefixed with MODBRIDGE_ and using __ for nesting
        // Example: MODBRIDGE_RELAY__TIMEOUT=5
        builder = builder.add_source(
            Environment::with_prefix("MODBRIDGE")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI arguments (highest priority)
        if let Some(version) = cli_args.format_version {
            builder = builder.set_override("bridge.format_version", version)?;
        }
        if let Some(dir) = &cli_args.bootstrap_dir {
            builder = builder.set_override("bridge.bootstrap_dir", dir.display().to_string())?;
        }
        if let Some(log_level) = &cli_args.log_level {
            builder = builder.set_override("logging.level", log_level.clone())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file path, on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: Config = with_defaults(ConfigBuilder::builder())?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bridge.validate()?;
        self.relay.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

fn with_defaults(builder: Builder<DefaultState>) -> Result<Builder<DefaultState>, ConfigError> {
    Ok(builder
        .set_default("bridge.format_version", 2)?
        .set_default("bridge.query_timeout", 60)?
        .set_default("relay.timeout", 30)?
        .set_default("relay.connect_timeout", 10)?
        .set_default("relay.user_agent", concat!("modbridge/", env!("CARGO_PKG_VERSION")))?
        .set_default("relay.accept_invalid_certs", false)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stdout")?
        .set_default("logging.max_file_size", 10485760)? // 10 MB
        .set_default("logging.max_backups", 5)?)
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "modbridge")]
#[command(
    about = "Run a media module query through the sandboxed script bridge",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the module's compiled JavaScript
    #[arg(short, long, value_name = "FILE")]
    pub module: PathBuf,

    /// Query action (search, get_info, get_episode_list, get_server, get_video, get_switch_config, logic)
    #[arg(
        short,
        long,
        value_name = "ACTION",
        default_value = "search",
        value_parser = parse_action
    )]
    pub action: Action,

    /// Query argument handed to the module
    #[arg(short, long, value_name = "QUERY", default_value = "")]
    pub query: String,

    /// Module switch values as key=value (value parsed as JSON, else string)
    #[arg(short, long = "switch", value_name = "KEY=VALUE")]
    pub switches: Vec<String>,

    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Protocol format version the module targets
    #[arg(long, value_name = "N")]
    pub format_version: Option<u8>,

    /// Directory containing common_v{N}.js bootstrap overrides
    #[arg(long, value_name = "DIR")]
    pub bootstrap_dir: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

fn parse_action(raw: &str) -> Result<Action, String> {
    let action: Action = raw.to_uppercase().parse::<Action>().map_err(|e| format!("{:?}", e))?;
    if action.is_query() {
        Ok(action)
    } else {
        Err(format!("not a query action: {}", raw))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub format_version: u8,
    #[serde(default)]
    pub bootstrap_dir: Option<PathBuf>,
    pub query_timeout: u64, // seconds
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        FormatVersion::try_from(self.format_version).map_err(ConfigError::InvalidBridge)?;

        if let Some(dir) = &self.bootstrap_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidBridge("bootstrap_dir cannot be empty".to_string()));
            }
        }

        if self.query_timeout == 0 {
            return Err(ConfigError::InvalidBridge(
                "query_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn format_version(&self) -> FormatVersion {
        FormatVersion::try_from(self.format_version).unwrap_or_default()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub timeout: u64,         // seconds
    pub connect_timeout: u64, // seconds
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::InvalidRelay("timeout must be greater than 0".to_string()));
        }

        if self.connect_timeout == 0 {
            return Err(ConfigError::InvalidRelay(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::InvalidRelay("user_agent cannot be empty".to_string()));
        }

        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            connect_timeout: 10,
            user_agent: concat!("modbridge/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    pub max_file_size: usize, // bytes
    pub max_backups: usize,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "level must be one of: {:?}",
                valid_levels
            )));
        }

        let valid_formats = ["json", "text"];
        if !valid_formats.contains(&self.format.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "format must be one of: {:?}",
                valid_formats
            )));
        }

        let valid_outputs = ["stdout", "file"];
        if !valid_outputs.contains(&self.output.as_str()) {
            return Err(ConfigError::InvalidLogging(format!(
                "output must be one of: {:?}",
                valid_outputs
            )));
        }

        if self.output == "file" && self.log_file.is_none() {
            return Err(ConfigError::InvalidLogging(
                "log_file must be specified when output is 'file'".to_string(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.max_backups == 0 {
            return Err(ConfigError::InvalidLogging(
                "max_backups must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[relay]\ntimeout = 5\n\n[bridge]\nformat_version = 1").unwrap();
        file.flush().unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.relay.timeout, 5);
        assert_eq!(config.relay.connect_timeout, 10);
        assert_eq!(config.bridge.format_version(), FormatVersion::V1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_format_version_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[bridge]\nformat_version = 9").unwrap();
        file.flush().unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBridge(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/modbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_logging_validation() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "text".to_string(),
            output: "file".to_string(),
            log_file: None,
            max_file_size: 1024,
            max_backups: 1,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relay_default_is_valid() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_cli_action_parser() {
        assert_eq!(parse_action("get_info").unwrap(), Action::GetInfo);
        assert!(parse_action("result").is_err());
        assert!(parse_action("bogus").is_err());
    }
}
