//! Farming store: deposits, withdrawals and reward claims of one farm pool.
//!
//! Callbacks land on the user's farm data contract and echo the call id as
//! `nonce`.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{numeric_id, positive_amount, OperationCancelled};
use crate::application::caches::refresh_balance;
use crate::application::context::StoreContext;
use crate::application::orchestrator::{OperationRequest, Orchestrator, TransactionCallbacks};
use crate::domain::correlation::{CallbackMethods, OperationOutcome, OperationSpec};
use crate::domain::state::StateContainer;
use crate::infrastructure::api_clients::{DataApi, FarmingPoolInfo, FarmingPoolsRequest};
use crate::infrastructure::contracts::{
    FarmPoolContract, FarmPoolDetails, FarmUserDataContract, FarmUserDetails, TokenRootContract, TokenWalletContract,
    TransferParams,
};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::{u128_string, vec_u128_string};
use crate::shared::types::{Address, Token};
use crate::shared::utils::format_amount;

pub const FARM_DEPOSIT: OperationSpec = OperationSpec::new(
    "farm-deposit",
    CallbackMethods::new(&["onFarmDepositSuccess"], &["onFarmDepositReverted"]),
)
.with_id_field("nonce");

pub const FARM_WITHDRAW: OperationSpec = OperationSpec::new(
    "farm-withdraw",
    CallbackMethods::new(&["onFarmWithdrawSuccess"], &["onFarmWithdrawReverted"]),
)
.with_id_field("nonce");

pub const FARM_CLAIM: OperationSpec = OperationSpec::new(
    "farm-claim",
    CallbackMethods::new(&["onFarmClaimSuccess"], &["onFarmClaimReverted"]),
)
.with_id_field("nonce");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FarmDepositSuccess {
    #[serde(with = "u128_string")]
    pub deposit_amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FarmWithdrawSuccess {
    #[serde(with = "u128_string")]
    pub withdraw_amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FarmClaimSuccess {
    #[serde(default, with = "vec_u128_string")]
    pub rewards: Vec<u128>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FarmView {
    pub details: FarmPoolDetails,
    pub user_data: Address,
    /// `None` before the first deposit
    pub user: Option<FarmUserDetails>,
}

#[derive(Debug, Clone, Default)]
pub struct FarmingState {
    pub view: Option<FarmView>,
}

pub struct FarmingStore {
    orchestrator: Orchestrator,
    pool: FarmPoolContract,
    state: StateContainer<FarmingState>,
}

impl FarmingStore {
    pub fn new(ctx: StoreContext, pool: Address) -> Self {
        let pool = FarmPoolContract::new(ctx.provider.clone(), pool);
        Self {
            orchestrator: Orchestrator::new(ctx),
            pool,
            state: StateContainer::default(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> Arc<FarmingState> {
        self.state.snapshot()
    }

    pub fn dispose(&self) {
        self.orchestrator.dispose();
    }

    pub async fn load(&self) -> Result<FarmView, DexError> {
        let ctx = self.orchestrator.context();
        let (details, user_data) = tokio::try_join!(self.pool.details(), self.pool.user_data_address(&ctx.wallet))?;
        let user = FarmUserDataContract::new(ctx.provider.clone(), user_data.clone())
            .details()
            .await?;
        let view = FarmView {
            details,
            user_data,
            user,
        };
        self.state.update(|state| state.view = Some(view.clone()));
        Ok(view)
    }

    /// Indexed pool stats; `None` when the API is unreachable
    pub async fn pool_info(&self, api: &dyn DataApi) -> Option<FarmingPoolInfo> {
        let request = FarmingPoolsRequest {
            limit: 100,
            offset: 0,
            user_address: Some(self.orchestrator.context().wallet.clone()),
            is_active: None,
            ordering: None,
        };
        match api.farming_pools(&request).await {
            Ok(response) => response
                .pools_info
                .into_iter()
                .find(|info| &info.pool_address == self.pool.address()),
            Err(e) => {
                warn!("⚠️ Failed to load farming pools: {}", e);
                None
            }
        }
    }

    pub async fn deposit(
        &self,
        token: &Token,
        amount: Decimal,
        callbacks: TransactionCallbacks<FarmDepositSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<FarmDepositSuccess, OperationCancelled>, DexError> {
        let view = self.load().await?;
        if token.root != view.details.token_root {
            return Err(DexError::InvalidAddress(token.root.to_string()));
        }
        let amount = positive_amount(amount, token.decimals)?;
        let ctx = self.orchestrator.context();
        let owner = ctx.wallet.clone();

        let wallet = TokenRootContract::new(ctx.provider.clone(), token.root.clone())
            .wallet_of(&owner)
            .await?;
        let wallet = TokenWalletContract::new(ctx.provider.clone(), wallet);
        if wallet.balance_or_zero().await? < amount {
            return Err(DexError::InsufficientBalance);
        }

        let operation = OperationRequest {
            spec: FARM_DEPOSIT,
            watched: view.user_data.clone(),
            summary: format!("farm {} {}", format_amount(amount, token.decimals), token.symbol),
        };
        let pool = self.pool.clone();
        let settings = ctx.settings.clone();
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    let payload = pool.deposit_payload(&owner, numeric_id(&call_id)?).await?;
                    Ok::<_, DexError>(wallet.transfer(
                        &owner,
                        TransferParams {
                            amount,
                            recipient: pool.address().clone(),
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
            self.refresh_after(&[token.root.clone()]).await;
        }
        Ok(outcome)
    }

    pub async fn withdraw(
        &self,
        token: &Token,
        amount: Decimal,
        callbacks: TransactionCallbacks<FarmWithdrawSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<FarmWithdrawSuccess, OperationCancelled>, DexError> {
        let view = self.load().await?;
        let amount = positive_amount(amount, token.decimals)?;
        let deposited = view.user.as_ref().map(|user| user.amount).unwrap_or_default();
        if amount > deposited {
            return Err(DexError::InsufficientBalance);
        }

        let ctx = self.orchestrator.context();
        let operation = OperationRequest {
            spec: FARM_WITHDRAW,
            watched: view.user_data.clone(),
            summary: format!("unfarm {} {}", format_amount(amount, token.decimals), token.symbol),
        };
        let pool = self.pool.clone();
        let owner = ctx.wallet.clone();
        let attached_value = ctx.settings.transfer_value;
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    Ok::<_, DexError>(pool.withdraw(&owner, amount, numeric_id(&call_id)?, attached_value))
                },
                callbacks,
            )
            .await?;

        if outcome.is_success() {
            self.refresh_after(&[token.root.clone()]).await;
        }
        Ok(outcome)
    }

    pub async fn claim_reward(
        &self,
        callbacks: TransactionCallbacks<FarmClaimSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<FarmClaimSuccess, OperationCancelled>, DexError> {
        let view = self.load().await?;
        let has_rewards = view
            .user
            .as_ref()
            .is_some_and(|user| user.pending_rewards.iter().any(|reward| *reward > 0));
        if !has_rewards {
            return Err(DexError::InvalidAmount("nothing to claim".to_string()));
        }

        let ctx = self.orchestrator.context();
        let operation = OperationRequest {
            spec: FARM_CLAIM,
            watched: view.user_data.clone(),
            summary: format!("claim rewards of {}", self.pool.address()),
        };
        let pool = self.pool.clone();
        let owner = ctx.wallet.clone();
        let attached_value = ctx.settings.transfer_value;
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    Ok::<_, DexError>(pool.claim_reward(&owner, numeric_id(&call_id)?, attached_value))
                },
                callbacks,
            )
            .await?;

        if outcome.is_success() {
            self.refresh_after(&view.details.reward_token_roots).await;
        }
        Ok(outcome)
    }

    async fn refresh_after(&self, roots: &[Address]) {
        let ctx = self.orchestrator.context();
        for root in roots {
            refresh_balance(ctx.provider.clone(), &ctx.balances, &ctx.wallet, root).await;
        }
        if let Err(e) = self.load().await {
            debug!("farm reload failed: {}", e);
        }
    }
}
