//! Configuration file parsing and structures.
//!
//! hearthkit reads a single TOML file naming the bridge, the hub transport,
//! the optional status API, and the hub entities to expose as accessories.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub mqtt: MqttConfig,

    #[serde(default)]
    pub api: Option<ApiConfig>,

    /// Hub entities exposed as accessories, in aid order
    #[serde(default)]
    pub accessories: Vec<AccessoryConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, e.g. `rumqttc = "warn"`
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Build a per-target filter from the default level and overrides.
    pub fn targets(&self) -> Targets {
        self.overrides
            .iter()
            .fold(Targets::new().with_default(self.level), |t, (target, level)| {
                t.with_target(target.clone(), *level)
            })
    }
}

fn default_bridge_name() -> String {
    "Hearth Bridge".to_string()
}

#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    /// Name the bridge advertises to remote clients
    #[serde(default = "default_bridge_name")]
    pub name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: default_bridge_name(),
        }
    }
}

fn default_topic_prefix() -> String {
    "hearthd".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

/// MQTT hub transport configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname or IP address
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    pub client_id: String,

    /// Prefix for entity state and service call topics (default: "hearthd")
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_api_port() -> u16 {
    8565
}

/// Status API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub listen: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

/// A hub entity to expose as an accessory
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessoryConfig {
    pub entity_id: String,

    /// Display name; defaults to the entity's object id with spaces
    #[serde(default)]
    pub name: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        contents.parse()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        for accessory in &self.accessories {
            let well_formed = matches!(
                accessory.entity_id.split_once('.'),
                Some((domain, object_id)) if !domain.is_empty() && !object_id.is_empty()
            );
            if !well_formed {
                return Err(ConfigError::InvalidEntityId(accessory.entity_id.clone()));
            }
        }
        Ok(self)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid entity id '{0}': expected <domain>.<object_id>")]
    InvalidEntityId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [mqtt]
            broker = "localhost"
            client_id = "hearthkit"
        "#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.bridge.name, "Hearth Bridge");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic_prefix, "hearthd");
        assert!(config.api.is_none());
        assert!(config.accessories.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [bridge]
            name = "Upstairs"

            [logging]
            level = "debug"

            [logging.overrides]
            rumqttc = "warn"

            [mqtt]
            broker = "10.0.0.2"
            port = 1884
            client_id = "kit"
            topic_prefix = "home"
            username = "user"
            password = "pass"

            [api]
            listen = "0.0.0.0"

            [[accessories]]
            entity_id = "fan.bedroom"
            name = "Bedroom Fan"

            [[accessories]]
            entity_id = "vacuum.rosie"
        "#;

        let config: Config = toml.parse().unwrap();
        assert_eq!(config.bridge.name, "Upstairs");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.overrides["rumqttc"], LogLevel::Warn);
        assert_eq!(config.mqtt.topic_prefix, "home");
        assert_eq!(config.mqtt.username.as_deref(), Some("user"));
        assert_eq!(config.api.unwrap().port, 8565);
        assert_eq!(
            config.accessories,
            vec![
                AccessoryConfig {
                    entity_id: "fan.bedroom".to_string(),
                    name: Some("Bedroom Fan".to_string()),
                },
                AccessoryConfig {
                    entity_id: "vacuum.rosie".to_string(),
                    name: None,
                },
            ]
        );
    }

    #[test]
    fn test_invalid_entity_id() {
        let toml = r#"
            [mqtt]
            broker = "localhost"
            client_id = "hearthkit"

            [[accessories]]
            entity_id = "bedroom_fan"
        "#;

        let err = toml.parse::<Config>().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"Invalid entity id 'bedroom_fan': expected <domain>.<object_id>");
    }

    #[test]
    fn test_invalid_log_level() {
        let toml = r#"
            [logging]
            level = "loud"

            [mqtt]
            broker = "localhost"
            client_id = "hearthkit"
        "#;

        assert!(matches!(toml.parse::<Config>(), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hearthkit.toml");
        std::fs::write(
            &path,
            r#"
            [mqtt]
            broker = "localhost"
            client_id = "hearthkit"

            [[accessories]]
            entity_id = "fan.office"
            "#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.accessories[0].entity_id, "fan.office");

        let missing = Config::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(..))));
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }
}
