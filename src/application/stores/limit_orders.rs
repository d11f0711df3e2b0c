//! Limit order store: create and cancel orders, list them through the data API

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{numeric_id, positive_amount, OperationCancelled};
use crate::application::caches::refresh_balance;
use crate::application::context::StoreContext;
use crate::application::orchestrator::{OperationRequest, Orchestrator, TransactionCallbacks};
use crate::domain::correlation::{CallbackMethods, OperationOutcome, OperationSpec};
use crate::domain::state::StateContainer;
use crate::infrastructure::api_clients::{DataApi, LimitOrderInfo, LimitOrdersRequest};
use crate::infrastructure::contracts::{
    CreateOrderParams, OrderContract, OrderFactoryContract, OrderRootContract, OrderState, TokenRootContract,
    TokenWalletContract, TransferParams,
};
use crate::infrastructure::preferences::{Preferences, LIMIT_ORDER_FILTER_KEY};
use crate::shared::errors::{AppError, DexError};
use crate::shared::types::{Address, Token};
use crate::shared::utils::format_amount;

pub const CREATE_ORDER: OperationSpec = OperationSpec::new(
    "create-order",
    CallbackMethods::new(&["onOrderCreateOrderSuccess"], &["onOrderCreateOrderReject"]),
);

pub const CANCEL_ORDER: OperationSpec = OperationSpec::new(
    "cancel-order",
    CallbackMethods::new(&["onOrderStateCancelled"], &["onOrderStateCancelledReject"]),
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderCreated {
    pub order: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrderClosed {}

/// Which orders the list shows; persisted between sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrderFilter {
    #[serde(default)]
    pub spent_token_root: Option<Address>,
    #[serde(default)]
    pub receive_token_root: Option<Address>,
    /// Empty means every state
    #[serde(default)]
    pub states: Vec<OrderState>,
}

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub spent: Token,
    pub receive: Token,
    pub spent_amount: Decimal,
    pub receive_amount: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct LimitOrderState {
    pub filter: LimitOrderFilter,
    pub orders: Vec<LimitOrderInfo>,
}

pub struct LimitOrderStore {
    orchestrator: Orchestrator,
    factory: OrderFactoryContract,
    preferences: Arc<Preferences>,
    api: Option<Arc<dyn DataApi>>,
    state: StateContainer<LimitOrderState>,
}

impl LimitOrderStore {
    pub fn new(ctx: StoreContext, factory: Address, preferences: Arc<Preferences>) -> Self {
        let factory = OrderFactoryContract::new(ctx.provider.clone(), factory);
        let filter = preferences.get::<LimitOrderFilter>(LIMIT_ORDER_FILTER_KEY).unwrap_or_default();
        Self {
            orchestrator: Orchestrator::new(ctx),
            factory,
            preferences,
            api: None,
            state: StateContainer::new(LimitOrderState {
                filter,
                orders: Vec::new(),
            }),
        }
    }

    pub fn with_api(mut self, api: Arc<dyn DataApi>) -> Self {
        self.api = Some(api);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> Arc<LimitOrderState> {
        self.state.snapshot()
    }

    pub fn dispose(&self) {
        self.orchestrator.dispose();
    }

    pub fn filter(&self) -> LimitOrderFilter {
        self.state.snapshot().filter.clone()
    }

    pub fn set_filter(&self, filter: LimitOrderFilter) -> Result<(), AppError> {
        self.preferences.set(LIMIT_ORDER_FILTER_KEY, &filter)?;
        self.state.update(|state| state.filter = filter);
        Ok(())
    }

    /// Orders of the wallet matching the saved filter; empty without an API
    pub async fn load_orders(&self) -> Vec<LimitOrderInfo> {
        let Some(api) = &self.api else {
            return Vec::new();
        };
        let filter = self.filter();
        let request = LimitOrdersRequest {
            owner: Some(self.orchestrator.context().wallet.clone()),
            states: filter.states,
            spent_token_root: filter.spent_token_root,
            receive_token_root: filter.receive_token_root,
            limit: 100,
            offset: 0,
        };
        match api.limit_orders(&request).await {
            Ok(response) => {
                self.state.update(|state| state.orders = response.orders.clone());
                response.orders
            }
            Err(e) => {
                warn!("⚠️ Failed to load limit orders: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
        callbacks: TransactionCallbacks<OrderCreated, OperationCancelled>,
    ) -> Result<OperationOutcome<OrderCreated, OperationCancelled>, DexError> {
        if request.spent.root == request.receive.root {
            return Err(DexError::TokensNotSelected);
        }
        let spent_amount = positive_amount(request.spent_amount, request.spent.decimals)?;
        let receive_amount = positive_amount(request.receive_amount, request.receive.decimals)?;
        let ctx = self.orchestrator.context();
        let owner = ctx.wallet.clone();

        let root_address = self.factory.expected_order_root(&request.spent.root).await?;
        let deployed = ctx
            .provider
            .get_full_contract_state(&root_address)
            .await?
            .is_some_and(|state| state.is_deployed);
        if !deployed {
            return Err(DexError::InvalidAddress(root_address.to_string()));
        }
        let order_root = OrderRootContract::new(ctx.provider.clone(), root_address);

        let wallet = TokenRootContract::new(ctx.provider.clone(), request.spent.root.clone())
            .wallet_of(&owner)
            .await?;
        let wallet = TokenWalletContract::new(ctx.provider.clone(), wallet);
        if wallet.balance_or_zero().await? < spent_amount {
            return Err(DexError::InsufficientBalance);
        }

        let operation = OperationRequest {
            spec: CREATE_ORDER,
            watched: owner.clone(),
            summary: format!(
                "order {} {} for {} {}",
                format_amount(spent_amount, request.spent.decimals),
                request.spent.symbol,
                format_amount(receive_amount, request.receive.decimals),
                request.receive.symbol
            ),
        };
        let settings = ctx.settings.clone();
        let receive_root = request.receive.root.clone();
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    let payload = order_root
                        .build_payload(&CreateOrderParams {
                            call_id: numeric_id(&call_id)?,
                            receive_root,
                            expected_amount: receive_amount,
                            deploy_wallet_value: settings.deploy_wallet_value,
                        })
                        .await?;
                    Ok::<_, DexError>(wallet.transfer(
                        &owner,
                        TransferParams {
                            amount: spent_amount,
                            recipient: order_root.address().clone(),
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

        if let OperationOutcome::Succeeded(created) = &outcome {
            info!("📝 Limit order created at {}", created.order);
            refresh_balance(ctx.provider.clone(), &ctx.balances, &ctx.wallet, &request.spent.root).await;
        }
        Ok(outcome)
    }

    pub async fn cancel_order(
        &self,
        order: &Address,
        callbacks: TransactionCallbacks<OrderClosed, OperationCancelled>,
    ) -> Result<OperationOutcome<OrderClosed, OperationCancelled>, DexError> {
        let ctx = self.orchestrator.context();
        let order = OrderContract::new(ctx.provider.clone(), order.clone());
        let details = order.details().await?;
        if details.owner != ctx.wallet {
            return Err(DexError::InvalidAddress(order.address().to_string()));
        }
        if !details.state.is_open() {
            return Err(DexError::UnexpectedResponse(format!(
                "order {} is {:?}",
                order.address(),
                details.state
            )));
        }

        let operation = OperationRequest {
            spec: CANCEL_ORDER,
            watched: ctx.wallet.clone(),
            summary: format!("cancel order {}", order.address()),
        };
        let owner = ctx.wallet.clone();
        let attached_value = ctx.settings.transfer_value;
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move { Ok::<_, DexError>(order.cancel(&owner, numeric_id(&call_id)?, attached_value)) },
                callbacks,
            )
            .await?;

        if outcome.is_success() {
            refresh_balance(ctx.provider.clone(), &ctx.balances, &ctx.wallet, &details.spent_token_root).await;
        }
        Ok(outcome)
    }
}
