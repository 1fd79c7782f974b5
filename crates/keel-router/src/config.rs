//! Router configuration.
//!
//! [`RouterConfig`] carries provider deadlines, relay protection preferences,
//! and the capital the router starts with. Values come from, in increasing
//! priority: built-in defaults, an optional TOML file, and `KEEL__*`
//! environment variables (`KEEL__PROTECTION__MAX_BLOCK_DELAY=10`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use keel_core::constants::{is_supported_chain, DEFAULT_EVM_CHAIN_ID};
use keel_core::Asset;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "KEEL";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file or environment could not be read or deserialized.
    #[error("config load: {0}")]
    Load(String),

    /// A value was read but is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Load(e.to_string())
    }
}

/// Private relay preferences used by the protection wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Block builders allowed to see the transaction.
    pub builders: Vec<String>,
    /// Blocks the relay may hold the transaction before dropping it.
    pub max_block_delay: u64,
    /// Share with all listed builders immediately.
    pub fast: bool,
    /// Hex-encoded 32-byte relay authentication key. Random per process when unset.
    pub auth_key: Option<String>,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            builders: ["flashbots", "beaverbuild.org", "rsync", "titan"]
                .iter()
                .map(|b| b.to_string())
                .collect(),
            max_block_delay: 25,
            fast: true,
            auth_key: None,
        }
    }
}

/// Configuration for an execution router instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Deadline for one quote, bridge, or swap-initiation call.
    pub provider_timeout_ms: u64,
    /// Deadline for one broadcast submit or status call.
    pub status_timeout_ms: u64,
    /// Deadline for one balance query.
    pub balance_timeout_ms: u64,
    /// Chain used for fee estimates of non-EVM legs.
    pub default_chain_id: u64,
    pub protection: ProtectionConfig,
    /// Starting capital per asset, keyed by `SYMBOL` or `SYMBOL@CHAIN`.
    pub initial_capital: BTreeMap<String, Decimal>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 8_000,
            status_timeout_ms: 5_000,
            balance_timeout_ms: 5_000,
            default_chain_id: DEFAULT_EVM_CHAIN_ID,
            protection: ProtectionConfig::default(),
            initial_capital: BTreeMap::new(),
        }
    }
}

impl RouterConfig {
    /// Load defaults, then `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        let cfg: RouterConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check ranges and parse asset keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_timeout_ms == 0 {
            return Err(ConfigError::Invalid("provider_timeout_ms must be > 0".into()));
        }
        if self.status_timeout_ms == 0 {
            return Err(ConfigError::Invalid("status_timeout_ms must be > 0".into()));
        }
        if self.balance_timeout_ms == 0 {
            return Err(ConfigError::Invalid("balance_timeout_ms must be > 0".into()));
        }
        if !is_supported_chain(self.default_chain_id) {
            return Err(ConfigError::Invalid(format!(
                "unsupported default_chain_id {}",
                self.default_chain_id
            )));
        }
        if let Some(key) = &self.protection.auth_key {
            let bytes = hex::decode(key.trim_start_matches("0x"))
                .map_err(|e| ConfigError::Invalid(format!("protection.auth_key: {e}")))?;
            if bytes.len() != 32 {
                return Err(ConfigError::Invalid(format!(
                    "protection.auth_key must be 32 bytes, got {}",
                    bytes.len()
                )));
            }
        }
        self.capital()?;
        Ok(())
    }

    /// Starting capital with parsed asset keys.
    pub fn capital(&self) -> Result<Vec<(Asset, Decimal)>, ConfigError> {
        self.initial_capital
            .iter()
            .map(|(key, amount)| {
                let asset: Asset = key
                    .parse()
                    .map_err(|e| ConfigError::Invalid(format!("initial_capital: {e}")))?;
                if amount.is_sign_negative() {
                    return Err(ConfigError::Invalid(format!(
                        "initial_capital.{key} is negative"
                    )));
                }
                Ok((asset, *amount))
            })
            .collect()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }

    pub fn balance_timeout(&self) -> Duration {
        Duration::from_millis(self.balance_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = RouterConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.provider_timeout(), Duration::from_secs(8));
        assert_eq!(cfg.default_chain_id, 1);
        assert_eq!(cfg.protection.builders.len(), 4);
        assert!(cfg.protection.fast);
    }

    #[test]
    fn load_from_file() {
        let f = toml_file(
            r#"
provider_timeout_ms = 1500

[protection]
builders = ["flashbots"]
fast = false

[initial_capital]
ETH = "2.5"
"USDC@137" = "1000"
"#,
        );
        let cfg = RouterConfig::load(Some(f.path())).unwrap();
        assert_eq!(cfg.provider_timeout_ms, 1500);
        assert_eq!(cfg.status_timeout_ms, 5_000);
        assert_eq!(cfg.protection.builders, vec!["flashbots".to_string()]);
        assert!(!cfg.protection.fast);

        let capital = cfg.capital().unwrap();
        assert!(capital.contains(&(Asset::new("ETH"), Decimal::new(25, 1))));
        assert!(capital.contains(&(Asset::on_chain("USDC", 137), Decimal::new(1000, 0))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = RouterConfig::load(Some(Path::new("/nonexistent/keel.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let f = toml_file("[protection]\nmax_block_delay = 5\n");
        // SAFETY: no other test in this crate reads or writes this variable.
        unsafe { std::env::set_var("KEEL__PROTECTION__MAX_BLOCK_DELAY", "40") };
        let cfg = RouterConfig::load(Some(f.path()));
        unsafe { std::env::remove_var("KEEL__PROTECTION__MAX_BLOCK_DELAY") };
        assert_eq!(cfg.unwrap().protection.max_block_delay, 40);
    }

    #[test]
    fn zero_timeout_rejected() {
        let f = toml_file("provider_timeout_ms = 0\n");
        let err = RouterConfig::load(Some(f.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bad_auth_key_rejected() {
        let cfg = RouterConfig {
            protection: ProtectionConfig {
                auth_key: Some("abcd".into()),
                ..ProtectionConfig::default()
            },
            ..RouterConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn negative_capital_rejected() {
        let mut cfg = RouterConfig::default();
        cfg.initial_capital.insert("ETH".into(), Decimal::new(-1, 0));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unsupported_default_chain_rejected() {
        let cfg = RouterConfig {
            default_chain_id: 56,
            ..RouterConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
