//! Dependencies shared by every store

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::caches::{BalanceCache, PoolCache};
use crate::application::notifications::NotificationBus;
use crate::application::receipts::ReceiptBook;
use crate::infrastructure::provider::WalletProvider;
use crate::shared::config::{AppConfig, OperationsConfig};
use crate::shared::errors::AppError;
use crate::shared::types::Address;

/// Values attached to every submitted operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSettings {
    pub confirmation_timeout: Option<Duration>,
    pub deploy_wallet_value: u128,
    pub transfer_value: u128,
    pub default_slippage: Decimal,
}

impl From<&OperationsConfig> for OperationSettings {
    fn from(config: &OperationsConfig) -> Self {
        Self {
            confirmation_timeout: config.confirmation_timeout(),
            deploy_wallet_value: config.deploy_wallet_value,
            transfer_value: config.transfer_value,
            default_slippage: config.default_slippage,
        }
    }
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self::from(&OperationsConfig::default())
    }
}

/// Provider, wallet and shared caches handed to every store
#[derive(Clone)]
pub struct StoreContext {
    pub provider: Arc<dyn WalletProvider>,
    /// Account that signs messages and receives pair callbacks
    pub wallet: Address,
    pub settings: OperationSettings,
    pub balances: Arc<BalanceCache>,
    pub pools: Arc<PoolCache>,
    pub notifications: NotificationBus,
    pub receipts: Arc<ReceiptBook>,
}

impl StoreContext {
    pub fn new(provider: Arc<dyn WalletProvider>, wallet: Address, settings: OperationSettings) -> Self {
        Self {
            provider,
            wallet,
            settings,
            balances: Arc::new(BalanceCache::new()),
            pools: Arc::new(PoolCache::new()),
            notifications: NotificationBus::default(),
            receipts: Arc::new(ReceiptBook::new()),
        }
    }

    /// Context for the wallet configured under `[network]`
    pub fn from_config(provider: Arc<dyn WalletProvider>, config: &AppConfig) -> Result<Self, AppError> {
        let wallet = config
            .network
            .wallet
            .clone()
            .ok_or_else(|| AppError::ConfigError("network.wallet is not set".to_string()))?;
        Ok(Self::new(provider, wallet, OperationSettings::from(&config.operations)))
    }

    /// Cached balance of `root` in the context wallet
    pub fn cached_balance(&self, root: &Address) -> Option<u128> {
        self.balances.get(&(self.wallet.clone(), root.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::provider::MemoryProvider;
    use crate::shared::config::ConfigLoader;

    const DEX_ROOT: &str = "0:1111111111111111111111111111111111111111111111111111111111111111";
    const WALLET: &str = "0:2222222222222222222222222222222222222222222222222222222222222222";

    #[test]
    fn test_context_from_config() {
        let config = ConfigLoader::parse(&format!(
            "[network]\ndex_root = \"{}\"\nwallet = \"{}\"\n\n[operations]\ntransfer_value = 7\n",
            DEX_ROOT, WALLET
        ))
        .unwrap();
        let ctx = StoreContext::from_config(Arc::new(MemoryProvider::new()), &config).unwrap();

        assert_eq!(ctx.wallet.as_str(), WALLET);
        assert_eq!(ctx.settings.transfer_value, 7);
        assert_eq!(ctx.cached_balance(&ctx.wallet), None);
    }

    #[test]
    fn test_context_requires_wallet() {
        let config = ConfigLoader::parse(&format!("[network]\ndex_root = \"{}\"\n", DEX_ROOT)).unwrap();
        let result = StoreContext::from_config(Arc::new(MemoryProvider::new()), &config);
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
