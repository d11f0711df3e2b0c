use std::fs;
use std::path::Path;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::shared::errors::AppError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

/// Network addresses the stores talk to
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub dex_root: Address,
    pub wallet: Option<Address>,
    pub order_factory: Option<Address>,
}

/// Defaults applied to every submitted operation
#[derive(Debug, Clone, Deserialize)]
pub struct OperationsConfig {
    /// Upper bound on waiting for an on-chain callback; `0` disables it
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_deploy_wallet_value", with = "u128_string")]
    pub deploy_wallet_value: u128,
    #[serde(default = "default_transfer_value", with = "u128_string")]
    pub transfer_value: u128,
    #[serde(default = "default_slippage")]
    pub default_slippage: Decimal,
}

impl OperationsConfig {
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        (self.confirmation_timeout_secs > 0).then(|| Duration::from_secs(self.confirmation_timeout_secs))
    }
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            deploy_wallet_value: default_deploy_wallet_value(),
            transfer_value: default_transfer_value(),
            default_slippage: default_slippage(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesConfig {
    #[serde(default = "default_preferences_path")]
    pub path: String,
}

impl Default for PreferencesConfig {
    fn default() -> Self {
        Self {
            path: default_preferences_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Application configuration, loaded from `Config.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    pub api: Option<ApiConfig>,
    #[serde(default)]
    pub preferences: PreferencesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

fn default_deploy_wallet_value() -> u128 {
    100_000_000
}

fn default_transfer_value() -> u128 {
    2_500_000_000
}

fn default_slippage() -> Decimal {
    dec!(0.5)
}

fn default_api_timeout_ms() -> u64 {
    10_000
}

fn default_preferences_path() -> String {
    "preferences.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<AppConfig, AppError> {
        let config_content = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;
        Self::parse(&config_content)
    }

    pub fn parse(content: &str) -> Result<AppConfig, AppError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        if config.operations.default_slippage <= Decimal::ZERO
            || config.operations.default_slippage >= dec!(100)
        {
            return Err(AppError::ConfigError(format!(
                "default_slippage must be within (0, 100), got {}",
                config.operations.default_slippage
            )));
        }

        Ok(config)
    }
}
