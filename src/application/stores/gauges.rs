//! Gauge store: locked deposits, withdrawals and reward claims

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use super::{numeric_id, positive_amount, OperationCancelled};
use crate::application::caches::refresh_balance;
use crate::application::context::StoreContext;
use crate::application::orchestrator::{OperationRequest, Orchestrator, TransactionCallbacks};
use crate::domain::correlation::{CallbackMethods, OperationOutcome, OperationSpec};
use crate::domain::state::StateContainer;
use crate::infrastructure::contracts::{
    GaugeContract, GaugeDepositParams, GaugeDetails, TokenRootContract, TokenWalletContract, TransferParams,
};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::{u128_string, vec_u128_string};
use crate::shared::types::{Address, Token};
use crate::shared::utils::format_amount;

pub const GAUGE_DEPOSIT: OperationSpec = OperationSpec::new(
    "gauge-deposit",
    CallbackMethods::new(&["onGaugeDepositSuccess"], &["onGaugeDepositRevert"]),
)
.with_id_field("call_id");

pub const GAUGE_WITHDRAW: OperationSpec = OperationSpec::new(
    "gauge-withdraw",
    CallbackMethods::new(&["onGaugeWithdrawSuccess"], &["onGaugeWithdrawRevert"]),
)
.with_id_field("call_id");

pub const GAUGE_CLAIM: OperationSpec = OperationSpec::new(
    "gauge-claim",
    CallbackMethods::new(&["onGaugeClaimSuccess"], &["onGaugeClaimRevert"]),
)
.with_id_field("call_id");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GaugeDepositSuccess {
    #[serde(with = "u128_string")]
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GaugeWithdrawSuccess {
    #[serde(with = "u128_string")]
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GaugeClaimSuccess {
    #[serde(default, with = "vec_u128_string")]
    pub rewards: Vec<u128>,
}

#[derive(Debug, Clone)]
pub struct GaugeDepositRequest {
    pub token: Token,
    pub amount: Decimal,
    /// Seconds; zero deposits without a lock
    pub lock_time: u64,
    pub claim: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GaugeState {
    pub details: Option<GaugeDetails>,
}

pub struct GaugeStore {
    orchestrator: Orchestrator,
    gauge: GaugeContract,
    state: StateContainer<GaugeState>,
}

impl GaugeStore {
    pub fn new(ctx: StoreContext, gauge: Address) -> Self {
        let gauge = GaugeContract::new(ctx.provider.clone(), gauge);
        Self {
            orchestrator: Orchestrator::new(ctx),
            gauge,
            state: StateContainer::default(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> Arc<GaugeState> {
        self.state.snapshot()
    }

    pub fn dispose(&self) {
        self.orchestrator.dispose();
    }

    pub async fn load(&self) -> Result<GaugeDetails, DexError> {
        let details = self.gauge.details().await?;
        self.state.update(|state| state.details = Some(details.clone()));
        Ok(details)
    }

    pub async fn deposit(
        &self,
        request: GaugeDepositRequest,
        callbacks: TransactionCallbacks<GaugeDepositSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<GaugeDepositSuccess, OperationCancelled>, DexError> {
        let details = self.load().await?;
        if request.token.root != details.deposit_token_root {
            return Err(DexError::InvalidAddress(request.token.root.to_string()));
        }
        if request.lock_time > details.max_lock_time {
            return Err(DexError::InvalidAmount(format!(
                "lock time {} exceeds {}",
                request.lock_time, details.max_lock_time
            )));
        }
        let amount = positive_amount(request.amount, request.token.decimals)?;
        let ctx = self.orchestrator.context();
        let owner = ctx.wallet.clone();

        let wallet = TokenRootContract::new(ctx.provider.clone(), request.token.root.clone())
            .wallet_of(&owner)
            .await?;
        let wallet = TokenWalletContract::new(ctx.provider.clone(), wallet);
        if wallet.balance_or_zero().await? < amount {
            return Err(DexError::InsufficientBalance);
        }

        let operation = OperationRequest {
            spec: GAUGE_DEPOSIT,
            watched: owner.clone(),
            summary: format!(
                "lock {} {} in gauge",
                format_amount(amount, request.token.decimals),
                request.token.symbol
            ),
        };
        let gauge = self.gauge.clone();
        let settings = ctx.settings.clone();
        let (lock_time, claim) = (request.lock_time, request.claim);
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    let call_id = numeric_id(&call_id)?;
                    let payload = gauge
                        .deposit_payload(&GaugeDepositParams {
                            owner: owner.clone(),
                            lock_time,
                            claim,
                            call_id,
                            nonce: 0,
                        })
                        .await?;
                    Ok::<_, DexError>(wallet.transfer(
                        &owner,
                        TransferParams {
                            amount,
                            recipient: gauge.address().clone(),
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
            self.refresh_after(&[request.token.root]).await;
        }
        Ok(outcome)
    }

    pub async fn withdraw(
        &self,
        token: &Token,
        amount: Decimal,
        claim: bool,
        callbacks: TransactionCallbacks<GaugeWithdrawSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<GaugeWithdrawSuccess, OperationCancelled>, DexError> {
        let amount = positive_amount(amount, token.decimals)?;
        let ctx = self.orchestrator.context();
        let operation = OperationRequest {
            spec: GAUGE_WITHDRAW,
            watched: ctx.wallet.clone(),
            summary: format!("withdraw {} {} from gauge", format_amount(amount, token.decimals), token.symbol),
        };
        let gauge = self.gauge.clone();
        let owner = ctx.wallet.clone();
        let attached_value = ctx.settings.transfer_value;
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    Ok::<_, DexError>(gauge.withdraw(&owner, amount, claim, numeric_id(&call_id)?, attached_value))
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
        callbacks: TransactionCallbacks<GaugeClaimSuccess, OperationCancelled>,
    ) -> Result<OperationOutcome<GaugeClaimSuccess, OperationCancelled>, DexError> {
        let ctx = self.orchestrator.context();
        let operation = OperationRequest {
            spec: GAUGE_CLAIM,
            watched: ctx.wallet.clone(),
            summary: format!("claim gauge rewards of {}", self.gauge.address()),
        };
        let gauge = self.gauge.clone();
        let owner = ctx.wallet.clone();
        let attached_value = ctx.settings.transfer_value;
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    Ok::<_, DexError>(gauge.claim_reward(&owner, numeric_id(&call_id)?, attached_value))
                },
                callbacks,
            )
            .await?;

        if outcome.is_success() {
            let roots = self
                .state
                .snapshot()
                .details
                .as_ref()
                .map(|details| details.reward_token_roots.clone())
                .unwrap_or_default();
            self.refresh_after(&roots).await;
        }
        Ok(outcome)
    }

    async fn refresh_after(&self, roots: &[Address]) {
        let ctx = self.orchestrator.context();
        for root in roots {
            refresh_balance(ctx.provider.clone(), &ctx.balances, &ctx.wallet, root).await;
        }
        if let Err(e) = self.load().await {
            warn!("⚠️ Gauge reload failed: {}", e);
        }
    }
}
