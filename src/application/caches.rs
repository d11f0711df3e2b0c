//! Balance and pool caches shared by the stores

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::cache::VersionedCache;
use crate::infrastructure::contracts::{PairContract, PairSnapshot, TokenRootContract, TokenWalletContract};
use crate::infrastructure::provider::WalletProvider;
use crate::shared::errors::DexError;
use crate::shared::types::Address;

/// Token balances keyed by `(owner, token root)`
pub type BalanceCache = VersionedCache<(Address, Address), u128>;

/// Pair snapshots keyed by pair address
pub type PoolCache = VersionedCache<Address, PairSnapshot>;

async fn fetch_balance(provider: Arc<dyn WalletProvider>, owner: &Address, root: &Address) -> Result<u128, DexError> {
    let wallet = TokenRootContract::new(provider.clone(), root.clone()).wallet_of(owner).await?;
    TokenWalletContract::new(provider, wallet).balance_or_zero().await
}

/// Re-read the balance of `root` held by `owner`.
///
/// `None` when the read fails; the cached value is left as it was.
pub async fn refresh_balance(
    provider: Arc<dyn WalletProvider>,
    cache: &BalanceCache,
    owner: &Address,
    root: &Address,
) -> Option<u128> {
    let ticket = cache.ticket();
    match fetch_balance(provider, owner, root).await {
        Ok(balance) => {
            if !cache.commit((owner.clone(), root.clone()), ticket, balance) {
                debug!(%root, ticket = ticket.sequence(), "stale balance discarded");
            }
            Some(balance)
        }
        Err(e) => {
            warn!("⚠️ Failed to refresh balance of {}: {}", root, e);
            None
        }
    }
}

/// Re-read the snapshot of `pair`
pub async fn refresh_pool(provider: Arc<dyn WalletProvider>, cache: &PoolCache, pair: &Address) -> Option<PairSnapshot> {
    let ticket = cache.ticket();
    match PairContract::new(provider, pair.clone()).snapshot().await {
        Ok(snapshot) => {
            if !cache.commit(pair.clone(), ticket, snapshot.clone()) {
                debug!(%pair, ticket = ticket.sequence(), "stale pool snapshot discarded");
            }
            Some(snapshot)
        }
        Err(e) => {
            warn!("⚠️ Failed to refresh pool {}: {}", pair, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::math::Fee;
    use crate::infrastructure::provider::MemoryProvider;
    use crate::infrastructure::simulation::{synthetic_address, DexSimulator};

    #[tokio::test]
    async fn test_refresh_balance_commits_and_degrades() {
        let provider = Arc::new(MemoryProvider::new());
        let dex = DexSimulator::new(provider.clone());
        let token = dex.add_token("QUBE", 9);
        let owner = synthetic_address(500);
        dex.mint(&token.root, &owner, 1_000);

        let cache = BalanceCache::new();
        let balance = refresh_balance(provider.clone(), &cache, &owner, &token.root).await;
        assert_eq!(balance, Some(1_000));
        assert_eq!(cache.get(&(owner.clone(), token.root.clone())), Some(1_000));

        let unknown = synthetic_address(501);
        assert_eq!(refresh_balance(provider, &cache, &owner, &unknown).await, None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_pool() {
        let provider = Arc::new(MemoryProvider::new());
        let dex = DexSimulator::new(provider.clone());
        let left = dex.add_token("QUBE", 9);
        let right = dex.add_token("USDT", 6);
        let pair = dex.add_pair(&left, &right, 1_000, 2_000, Fee::ZERO);

        let cache = PoolCache::new();
        let snapshot = refresh_pool(provider, &cache, &pair).await.unwrap();
        assert_eq!(snapshot.balances.left_balance, 1_000);
        assert_eq!(cache.get(&pair).unwrap().roots.right, right.root);
    }
}
