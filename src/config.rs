//! Configuration management for airgap-tx
//!
//! Settings come from an optional TOML file with environment variable
//! substitution. Command-line flags override file values, and the resolved
//! values are passed explicitly into each phase.

use crate::error::{AirgapError, AirgapResult};
use crate::signer::{DeviceOptions, ResponseFormat};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "AIRGAP_CONFIG";

/// Configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "airgap.toml";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid regex");
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node: NodeConfig,
    pub device: DeviceConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub endpoint: String,
    pub max_gas_price_gwei: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            max_gas_price_gwei: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host and port of the device proxy
    pub address: String,
    pub response_format: ResponseFormat,
    pub sign_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub confirm_address: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9999".to_string(),
            response_format: ResponseFormat::Fixed,
            sign_timeout_secs: 60,
            command_timeout_secs: 10,
            confirm_address: false,
        }
    }
}

impl DeviceConfig {
    pub fn options(&self) -> DeviceOptions {
        DeviceOptions {
            sign_timeout: Duration::from_secs(self.sign_timeout_secs),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            confirm_address: self.confirm_address,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub unsigned_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            unsigned_path: PathBuf::from("airgap.tx"),
        }
    }
}

impl Settings {
    /// Load settings from `AIRGAP_CONFIG`, `./airgap.toml`, or defaults
    pub fn load() -> AirgapResult<Self> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load_from(local);
        }

        let settings = Settings::default();
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> AirgapResult<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            AirgapError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let settings = Self::parse(&config_str)?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(settings)
    }

    /// Parse and validate TOML text
    pub fn parse(config_str: &str) -> AirgapResult<Self> {
        let config_str = substitute_env_vars(config_str);
        let settings: Settings = toml::from_str(&config_str)
            .map_err(|e| AirgapError::Config(format!("Failed to parse configuration: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> AirgapResult<()> {
        if self.node.endpoint.trim().is_empty() {
            return Err(AirgapError::Config("node endpoint is empty".to_string()));
        }
        if self.device.sign_timeout_secs == 0 || self.device.command_timeout_secs == 0 {
            return Err(AirgapError::Config(
                "device timeouts must be greater than zero".to_string(),
            ));
        }
        if self.device.address.trim().is_empty() {
            tracing::warn!("No device address configured - hardware signing unavailable");
        }
        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("AIRGAP_TEST_HOST", "node.example.com");
        let input = "endpoint = \"https://${AIRGAP_TEST_HOST}:8545\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "endpoint = \"https://node.example.com:8545\"");
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.node.endpoint, "http://localhost:8545");
        assert_eq!(settings.device.sign_timeout_secs, 60);
        assert_eq!(settings.device.response_format, ResponseFormat::Fixed);
        assert_eq!(settings.output.unsigned_path, PathBuf::from("airgap.tx"));
    }

    #[test]
    fn test_parse_full_file() {
        let settings = Settings::parse(
            r#"
            [node]
            endpoint = "http://10.0.0.2:8545"
            max_gas_price_gwei = 200

            [device]
            address = "127.0.0.1:40000"
            response_format = "structured"
            confirm_address = true

            [output]
            unsigned_path = "/media/usb/tx"
            "#,
        )
        .unwrap();

        assert_eq!(settings.node.max_gas_price_gwei, Some(200));
        assert_eq!(settings.device.response_format, ResponseFormat::Structured);
        assert!(settings.device.options().confirm_address);
        assert_eq!(settings.device.options().command_timeout, Duration::from_secs(10));
        assert_eq!(settings.output.unsigned_path, PathBuf::from("/media/usb/tx"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = Settings::parse("[device]\nsign_timeout_secs = 0\n");
        assert!(matches!(result, Err(AirgapError::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_format() {
        let result = Settings::parse("[device]\nresponse_format = \"v9\"\n");
        assert!(matches!(result, Err(AirgapError::Config(_))));
    }
}
