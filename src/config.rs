//! Device configuration loaded from TOML
//!
//! The shared access key never lives in the file; the file names an
//! environment variable and the key is read at connect time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Top-level configuration for one simulated device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// Identity and hub endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Hub hostname, e.g. `contoso.azure-devices.net`
    pub host: String,
    /// Device identifier (must match [a-zA-Z0-9._-]+)
    pub device_id: String,
    /// Environment variable holding the base64 shared access key
    pub key_env: String,
    /// Optional digital-twin model id, appended to the MQTT user name
    pub model_id: Option<String>,
}

/// Call and connect windows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSection {
    /// Seconds to wait for the broker to accept the connection
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    /// Seconds a pending twin read/update may wait for its response
    #[serde(default = "default_twin_secs")]
    pub twin_secs: u64,
    /// Validity window of each generated SAS token, in minutes
    #[serde(default = "default_token_ttl_mins")]
    pub token_ttl_mins: u64,
}

fn default_connect_secs() -> u64 {
    30
}

fn default_twin_secs() -> u64 {
    30
}

fn default_token_ttl_mins() -> u64 {
    60
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            twin_secs: default_twin_secs(),
            token_ttl_mins: default_token_ttl_mins(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid device ID format: {0}")]
    InvalidDeviceId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: DeviceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation, shared by file loading and tests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_device_id(&self.device.device_id)?;
        if self.device.host.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "device.host must not be empty".to_string(),
            ));
        }
        if self.timeouts.token_ttl_mins == 0 {
            return Err(ConfigError::InvalidConfig(
                "timeouts.token_ttl_mins must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the shared access key from the configured environment
    /// variable. Looked up per connection attempt, never cached.
    pub fn device_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.device.key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.device.key_env.clone()))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[device]
host = "contoso.azure-devices.net"
device_id = "sim-01"
key_env = "AZIOT_DEVICE_KEY"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device ID '{device_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = DeviceConfig::test_config();
        assert_eq!(config.device.host, "contoso.azure-devices.net");
        assert_eq!(config.device.device_id, "sim-01");
        assert_eq!(config.device.model_id, None);
        assert_eq!(config.timeouts.connect_secs, 30);
        assert_eq!(config.timeouts.twin_secs, 30);
        assert_eq!(config.timeouts.token_ttl_mins, 60);
    }

    #[test]
    fn full_config_parses() {
        let toml_content = r#"
[device]
host = "contoso.azure-devices.net"
device_id = "thermostat-7"
key_env = "AZIOT_DEVICE_KEY"
model_id = "dtmi:com:example:Thermostat;1"

[timeouts]
connect_secs = 10
twin_secs = 5
token_ttl_mins = 15
"#;
        let config: DeviceConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(
            config.device.model_id.as_deref(),
            Some("dtmi:com:example:Thermostat;1")
        );
        assert_eq!(config.timeouts.twin_secs, 5);
        assert_eq!(config.timeouts.token_ttl_mins, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_device_id_is_rejected() {
        assert!(validate_device_id("device@host").is_err());
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id("valid-device_123.test").is_ok());
    }

    #[test]
    fn zero_token_ttl_is_rejected() {
        let mut config = DeviceConfig::test_config();
        config.timeouts.token_ttl_mins = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_key_env_is_an_error() {
        let mut config = DeviceConfig::test_config();
        config.device.key_env = "AZIOT_TEST_KEY_THAT_DOES_NOT_EXIST".to_string();
        assert!(matches!(
            config.device_key(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[device]
host = "contoso.azure-devices.net"
device_id = "sim-01"
key_env = "AZIOT_DEVICE_KEY"
"#
        )
        .unwrap();

        let config = DeviceConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.device.device_id, "sim-01");
    }

    #[test]
    fn load_rejects_bad_device_id() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[device]
host = "contoso.azure-devices.net"
device_id = "bad device id"
key_env = "AZIOT_DEVICE_KEY"
"#
        )
        .unwrap();

        assert!(matches!(
            DeviceConfig::load_from_file(file.path()),
            Err(ConfigError::InvalidDeviceId(_))
        ));
    }
}
