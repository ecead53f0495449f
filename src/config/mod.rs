//! Configuration Module
//!
//! TOML-based configuration for the subscription engine with support for:
//! - Routing behavior (QoS upgrade, shared-group rotation policy)
//! - Structural limits (topic levels, subscription quota)
//! - Feature switches (wildcard and shared subscriptions)
//! - Observability (subscribed-topics counts, match cache sizing)
//! - Environment variable overrides (ROUTEMQ_* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;


/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Deliver at the subscription QoS instead of
    /// min(publish QoS, subscription QoS)
    pub upgrade_outgoing_qos: bool,
    /// Maximum levels in a topic name or filter (0 = unlimited)
    pub max_topic_levels: usize,
    /// Maximum live subscriptions across all clients (0 = unlimited)
    pub max_subscriptions: usize,
    /// Allow `+`/`#` in filters
    pub wildcard_subscriptions: bool,
    /// Allow `$share/<group>/` filters
    pub shared_subscriptions: bool,
    /// A shared-group member denied by ACL still consumes its rotation
    /// turn; disabling passes the turn to the next member instead
    pub shared_rotation_on_denied: bool,
    /// Publish per-filter subscriber counts under
    /// `$SYS/broker/subscribed_topics/`
    pub publish_sub_counts: bool,
    /// Entries in the publish match cache (0 disables caching)
    pub match_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upgrade_outgoing_qos: false,
            max_topic_levels: 0,
            max_subscriptions: 0,
            wildcard_subscriptions: true,
            shared_subscriptions: true,
            shared_rotation_on_denied: true,
            publish_sub_counts: false,
            match_cache_size: 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file with `${VAR}` substitution and
    /// `ROUTEMQ__*` environment overrides. A missing file means defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("upgrade_outgoing_qos", false)?
            .set_default("max_topic_levels", 0)?
            .set_default("max_subscriptions", 0)?
            .set_default("wildcard_subscriptions", true)?
            .set_default("shared_subscriptions", true)?
            .set_default("shared_rotation_on_denied", true)?
            .set_default("publish_sub_counts", false)?
            .set_default("match_cache_size", 1024)?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (ROUTEMQ__MAX_TOPIC_LEVELS, etc.)
        let cfg = builder
            .add_source(
                Environment::with_prefix("ROUTEMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EngineConfig = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no
    /// file). Useful for containerized deployments.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A 65535-byte filter cannot hold more than 32768 levels, so a
        // larger cap would never fire
        if self.max_topic_levels > 32_768 {
            return Err(ConfigError::Validation(
                "max_topic_levels cannot exceed 32768".to_string(),
            ));
        }
        // Note: 0 means unbounded for all limits
        Ok(())
    }
}
