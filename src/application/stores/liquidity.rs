//! Liquidity store: pool view, LP share, deposits through the DEX account and withdrawals

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use super::{numeric_id, OperationCancelled};
use crate::application::caches::{refresh_balance, refresh_pool};
use crate::application::context::StoreContext;
use crate::application::orchestrator::{OperationRequest, Orchestrator, TransactionCallbacks};
use crate::domain::correlation::{CallbackMethods, OperationOutcome, OperationSpec};
use crate::domain::math::{self, min_expected_amount, validate_slippage, WithdrawShare};
use crate::domain::state::StateContainer;
use crate::infrastructure::contracts::{
    DepositLiquidityParams, DexAccountContract, DexRootContract, PairContract, PairSnapshot, TokenRootContract,
    TokenWalletContract, TransferParams, WithdrawPayloadParams,
};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::{Address, Token};
use crate::shared::utils::{format_amount, to_base_units};

/// LP tokens of every pair use this precision
pub const LP_DECIMALS: u8 = 9;

pub const DEPOSIT_LIQUIDITY: OperationSpec = OperationSpec::new(
    "deposit-liquidity",
    CallbackMethods::new(&["dexPairDepositLiquiditySuccess"], &["dexPairOperationCancelled"]),
);

pub const WITHDRAW_LIQUIDITY: OperationSpec = OperationSpec::new(
    "withdraw-liquidity",
    CallbackMethods::new(&["dexPairWithdrawSuccess"], &["dexPairOperationCancelled"]),
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepositResult {
    #[serde(with = "u128_string")]
    pub left: u128,
    #[serde(with = "u128_string")]
    pub right: u128,
    #[serde(with = "u128_string")]
    pub lp_reward: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DepositSuccess {
    pub result: DepositResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WithdrawResult {
    #[serde(with = "u128_string")]
    pub lp: u128,
    #[serde(with = "u128_string")]
    pub left: u128,
    #[serde(with = "u128_string")]
    pub right: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WithdrawSuccess {
    pub result: WithdrawResult,
}

/// Pair as the liquidity screens show it, ordered by the pair's own roots
#[derive(Debug, Clone, PartialEq)]
pub struct PoolView {
    pub snapshot: PairSnapshot,
    pub left: Token,
    pub right: Token,
    pub lp_wallet: Address,
    pub lp_balance: u128,
    /// What the user's LP balance redeems for, when there is one
    pub share: Option<WithdrawShare>,
    /// Right tokens per left token
    pub left_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub left: Token,
    pub right: Token,
    pub left_amount: Decimal,
    pub right_amount: Decimal,
    pub auto_change: bool,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub left: Token,
    pub right: Token,
    /// LP amount in token units; the whole balance when `None`
    pub lp_amount: Option<Decimal>,
    pub slippage: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct LiquidityState {
    pub pool: Option<PoolView>,
}

pub struct LiquidityStore {
    orchestrator: Orchestrator,
    dex: DexRootContract,
    state: StateContainer<LiquidityState>,
}

impl LiquidityStore {
    pub fn new(ctx: StoreContext, dex_root: Address) -> Self {
        let dex = DexRootContract::new(ctx.provider.clone(), dex_root);
        Self {
            orchestrator: Orchestrator::new(ctx),
            dex,
            state: StateContainer::default(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> Arc<LiquidityState> {
        self.state.snapshot()
    }

    pub fn dispose(&self) {
        self.orchestrator.dispose();
    }

    /// Read the pair of two tokens together with the user's LP position
    pub async fn load_pool(&self, first: &Token, second: &Token) -> Result<PoolView, DexError> {
        if first.root == second.root {
            return Err(DexError::TokensNotSelected);
        }
        let ctx = self.orchestrator.context();
        let address = self.dex.expected_pair_address(&first.root, &second.root).await?;
        let deployed = ctx
            .provider
            .get_full_contract_state(&address)
            .await?
            .is_some_and(|state| state.is_deployed);
        if !deployed {
            return Err(DexError::PoolRootsNotDefined);
        }
        let snapshot = refresh_pool(ctx.provider.clone(), &ctx.pools, &address)
            .await
            .ok_or(DexError::PoolRootsNotDefined)?;

        let (left, right) = if snapshot.roots.left == first.root && snapshot.roots.right == second.root {
            (first.clone(), second.clone())
        } else if snapshot.roots.left == second.root && snapshot.roots.right == first.root {
            (second.clone(), first.clone())
        } else {
            return Err(DexError::PoolRootsNotDefined);
        };

        let lp_wallet = TokenRootContract::new(ctx.provider.clone(), snapshot.roots.lp.clone())
            .wallet_of(&ctx.wallet)
            .await?;
        let lp_balance = TokenWalletContract::new(ctx.provider.clone(), lp_wallet.clone())
            .balance_or_zero()
            .await?;
        ctx.balances
            .put((ctx.wallet.clone(), snapshot.roots.lp.clone()), lp_balance);

        let share = if lp_balance > 0 && !snapshot.is_empty() {
            Some(math::withdraw_share(
                lp_balance,
                snapshot.balances.lp_supply,
                snapshot.balances.left_balance,
                snapshot.balances.right_balance,
            )?)
        } else {
            None
        };
        let view = PoolView {
            left_price: snapshot.left_price(left.decimals, right.decimals),
            snapshot,
            left,
            right,
            lp_wallet,
            lp_balance,
            share,
        };
        debug!(pair = %view.snapshot.address, lp_balance, "pool loaded");
        self.state.update(|state| state.pool = Some(view.clone()));
        Ok(view)
    }

    /// Reserves redeemable for `lp_amount` of the pool's LP token
    pub fn withdraw_share(&self, pool: &PoolView, lp_amount: u128) -> Result<WithdrawShare, DexError> {
        let balances = &pool.snapshot.balances;
        math::withdraw_share(lp_amount, balances.lp_supply, balances.left_balance, balances.right_balance)
    }

    /// Local estimate of LP minted for depositing both sides, in the pair's order
    pub fn estimate_lp_reward(&self, pool: &PoolView, left_amount: u128, right_amount: u128) -> Result<u128, DexError> {
        let balances = &pool.snapshot.balances;
        math::expected_lp_reward(
            left_amount,
            right_amount,
            balances.left_balance,
            balances.right_balance,
            balances.lp_supply,
        )
    }

    /// Deposit both sides from the DEX account into the pair
    pub async fn deposit(
        &self,
        request: DepositRequest,
        callbacks: TransactionCallbacks<DepositSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<DepositSuccess, OperationCancelled>, DexError> {
        if request.left_amount <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(request.left_amount.to_string()));
        }
        if request.right_amount <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(request.right_amount.to_string()));
        }
        let pool = self.load_pool(&request.left, &request.right).await?;
        let ctx = self.orchestrator.context();

        let account_address = self.dex.expected_account_address(&ctx.wallet).await?;
        let account = DexAccountContract::new(ctx.provider.clone(), account_address.clone());
        if !account.is_deployed().await? {
            return Err(DexError::DexAccountNotDeployed(account_address.to_string()));
        }

        // Amounts in the pair's own left/right order
        let requested = [
            (&request.left, request.left_amount),
            (&request.right, request.right_amount),
        ];
        let amount_of = |root: &Address| -> Result<u128, DexError> {
            let (token, amount) = requested
                .iter()
                .find(|(token, _)| &token.root == root)
                .ok_or(DexError::PoolRootsNotDefined)?;
            to_base_units(*amount, token.decimals)
        };
        let roots = pool.snapshot.roots.clone();
        let left_amount = amount_of(&roots.left)?;
        let right_amount = amount_of(&roots.right)?;
        if left_amount == 0 || right_amount == 0 {
            return Err(DexError::InvalidAmount("deposit rounds to zero".to_string()));
        }

        let (left_available, right_available) =
            tokio::try_join!(account.balance_of(&roots.left), account.balance_of(&roots.right))?;
        if left_available < left_amount || right_available < right_amount {
            return Err(DexError::InsufficientBalance);
        }

        let pair = PairContract::new(ctx.provider.clone(), pool.snapshot.address.clone());
        let expected_lp_amount = pair
            .expected_deposit_liquidity(left_amount, right_amount, request.auto_change)
            .await
            .map_err(|e| DexError::CannotComputeExpectedAmount(e.to_string()))?;

        let operation = OperationRequest {
            spec: DEPOSIT_LIQUIDITY,
            watched: ctx.wallet.clone(),
            summary: format!(
                "deposit {} {} + {} {}",
                format_amount(left_amount, pool.left.decimals),
                pool.left.symbol,
                format_amount(right_amount, pool.right.decimals),
                pool.right.symbol
            ),
        };
        let owner = ctx.wallet.clone();
        let auto_change = request.auto_change;
        let attached_value = ctx.settings.transfer_value;
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    let params = DepositLiquidityParams {
                        call_id: numeric_id(&call_id)?,
                        left_root: roots.left,
                        left_amount,
                        right_root: roots.right,
                        right_amount,
                        lp_root: roots.lp,
                        expected_lp_amount,
                        auto_change,
                        attached_value,
                    };
                    Ok::<_, DexError>(account.deposit_liquidity(&owner, &params))
                },
                callbacks,
            )
            .await?;

        if let OperationOutcome::Succeeded(success) = &outcome {
            info!(
                "💧 Deposited into {}: LP reward {}",
                pool.snapshot.address,
                format_amount(success.result.lp_reward, LP_DECIMALS)
            );
            self.refresh_after(&pool).await;
        }
        Ok(outcome)
    }

    /// Burn LP tokens for both reserves of the pair
    pub async fn withdraw(
        &self,
        request: WithdrawRequest,
        callbacks: TransactionCallbacks<WithdrawSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<WithdrawSuccess, OperationCancelled>, DexError> {
        let pool = self.load_pool(&request.left, &request.right).await?;
        let ctx = self.orchestrator.context();
        let deployed = ctx
            .provider
            .get_full_contract_state(&pool.lp_wallet)
            .await?
            .is_some_and(|state| state.is_deployed);
        if !deployed || pool.lp_balance == 0 {
            return Err(DexError::LpWalletsNotExist);
        }

        let lp_amount = match request.lp_amount {
            Some(amount) if amount <= Decimal::ZERO => return Err(DexError::InvalidAmount(amount.to_string())),
            Some(amount) => to_base_units(amount, LP_DECIMALS)?,
            None => pool.lp_balance,
        };
        if lp_amount > pool.lp_balance {
            return Err(DexError::InsufficientBalance);
        }
        let slippage = validate_slippage(request.slippage.unwrap_or(ctx.settings.default_slippage))?;

        let pair = PairContract::new(ctx.provider.clone(), pool.snapshot.address.clone());
        let (expected_left, expected_right) = pair
            .expected_withdraw_liquidity(lp_amount)
            .await
            .map_err(|e| DexError::CannotComputeExpectedAmount(e.to_string()))?;
        let expected_left_amount = min_expected_amount(expected_left, slippage)?;
        let expected_right_amount = min_expected_amount(expected_right, slippage)?;

        let operation = OperationRequest {
            spec: WITHDRAW_LIQUIDITY,
            watched: ctx.wallet.clone(),
            summary: format!(
                "withdraw {} LP from {}/{}",
                format_amount(lp_amount, LP_DECIMALS),
                pool.left.symbol,
                pool.right.symbol
            ),
        };
        let owner = ctx.wallet.clone();
        let settings = ctx.settings.clone();
        let lp_wallet = TokenWalletContract::new(ctx.provider.clone(), pool.lp_wallet.clone());
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    let payload = pair
                        .build_withdraw_payload(&WithdrawPayloadParams {
                            id: numeric_id(&call_id)?,
                            deploy_wallet_value: settings.deploy_wallet_value,
                            expected_left_amount,
                            expected_right_amount,
                            recipient: owner.clone(),
                        })
                        .await?;
                    Ok::<_, DexError>(lp_wallet.transfer(
                        &owner,
                        TransferParams {
                            amount: lp_amount,
                            recipient: pair.address().clone(),
                            deploy_wallet_value: settings.deploy_wallet_value,
                            remaining_gas_to: owner.clone(),
                            payload,
                            attached_value: settings.transfer_value,
                        },
                    ))
                },
                callbacks,
            )
            .await?;

        if outcome.is_success() {
            self.refresh_after(&pool).await;
        }
        Ok(outcome)
    }

    async fn refresh_after(&self, pool: &PoolView) {
        let ctx = self.orchestrator.context();
        let owner = &ctx.wallet;
        let roots = &pool.snapshot.roots;
        tokio::join!(
            refresh_balance(ctx.provider.clone(), &ctx.balances, owner, &roots.left),
            refresh_balance(ctx.provider.clone(), &ctx.balances, owner, &roots.right),
            refresh_balance(ctx.provider.clone(), &ctx.balances, owner, &roots.lp),
        );
        if let Err(e) = self.load_pool(&pool.left, &pool.right).await {
            debug!("pool reload after operation failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::OperationSettings;
    use crate::domain::math::Fee;
    use crate::infrastructure::provider::MemoryProvider;
    use crate::infrastructure::simulation::{synthetic_address, DexSimulator};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_load_pool_reports_share() {
        let provider = Arc::new(MemoryProvider::new());
        let dex = DexSimulator::new(provider.clone());
        let left = dex.add_token("WEVER", 9);
        let right = dex.add_token("QUBE", 9);
        let pair = dex.add_pair(&left, &right, 500_000, 2_000_000, Fee::ZERO);
        let owner = synthetic_address(700);
        dex.mint(&dex.lp_root(&pair).unwrap(), &owner, 100_000);
        dex.set_reserves(&pair, 500_000, 2_000_000, 1_000_000);

        let ctx = StoreContext::new(provider, owner, OperationSettings::default());
        let store = LiquidityStore::new(ctx, dex.dex_root().clone());
        let view = store.load_pool(&right, &left).await.unwrap();

        assert_eq!(view.left, left);
        assert_eq!(view.lp_balance, 100_000);
        let share = view.share.unwrap();
        assert_eq!(share.left, 50_000);
        assert_eq!(share.right, 200_000);
        assert_eq!(share.percent, dec!(10));
        assert_eq!(view.left_price, Some(dec!(4)));
    }

    #[tokio::test]
    async fn test_missing_pool_and_lp_wallet() {
        let provider = Arc::new(MemoryProvider::new());
        let dex = DexSimulator::new(provider.clone());
        let left = dex.add_token("WEVER", 9);
        let right = dex.add_token("QUBE", 9);
        let other = dex.add_token("USDT", 6);
        dex.add_pair(&left, &right, 1_000, 1_000, Fee::ZERO);

        let ctx = StoreContext::new(provider, synthetic_address(701), OperationSettings::default());
        let store = LiquidityStore::new(ctx, dex.dex_root().clone());
        assert_eq!(store.load_pool(&left, &other).await, Err(DexError::PoolRootsNotDefined));

        let request = WithdrawRequest {
            left,
            right,
            lp_amount: None,
            slippage: None,
        };
        let result = store.withdraw(request, TransactionCallbacks::new()).await;
        assert!(matches!(result, Err(DexError::LpWalletsNotExist)));
    }
}
