//! Swap store: quotes over known pairs and direct or cross-pair exchanges

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use super::numeric_id;
use crate::application::caches::{refresh_balance, refresh_pool};
use crate::application::context::{OperationSettings, StoreContext};
use crate::application::orchestrator::{OperationRequest, Orchestrator, TransactionCallbacks};
use crate::domain::correlation::{CallbackMethods, OperationOutcome, OperationSpec};
use crate::domain::math::{
    min_expected_amount, validate_slippage, ConstantProductMath, SwapRoute, TokenGraph, DEFAULT_MAX_HOPS,
};
use crate::domain::state::StateContainer;
use crate::infrastructure::contracts::{
    CrossExchangePayloadParams, CrossExchangeStep, DexRootContract, ExchangePayloadParams, PairContract, PairSnapshot,
    TokenRootContract, TokenWalletContract, TransferParams,
};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::{Address, Token};
use crate::shared::utils::{format_amount, to_base_units};

pub const SWAP: OperationSpec = OperationSpec::new(
    "swap",
    CallbackMethods::new(&["dexPairExchangeSuccess"], &["dexPairOperationCancelled"]),
);

pub const CROSS_SWAP: OperationSpec = OperationSpec::new(
    "cross-swap",
    CallbackMethods::new(&["onCrossExchangeSuccess"], &["onCrossExchangeCancel"]),
);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExchangeResult {
    pub spent_token: Address,
    #[serde(with = "u128_string")]
    pub spent_amount: u128,
    pub receive_token: Address,
    #[serde(with = "u128_string")]
    pub receive_amount: u128,
    #[serde(with = "u128_string")]
    pub fee: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwapSuccess {
    pub result: ExchangeResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SwapCancelled {
    /// Hop that stopped a cross-pair exchange
    #[serde(default)]
    pub step_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub spent: Token,
    pub receive: Token,
    /// Amount of `spent` in token units
    pub amount: Decimal,
    /// Tolerance in percent; the configured default when `None`
    pub slippage: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapQuote {
    pub route: SwapRoute,
    pub amount_in: u128,
    /// Expected output of every hop as reported by the pairs
    pub step_amounts: Vec<u128>,
    /// Least output accepted for every hop, each taken from that hop's own
    /// expected amount rather than compounded from the previous hop's minimum
    pub step_minimums: Vec<u128>,
    pub expected_amount: u128,
    pub min_expected_amount: u128,
    /// Fee taken by the first pair
    pub fee: u128,
    pub price_impact: Option<Decimal>,
    pub slippage: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct SwapState {
    pub quote: Option<SwapQuote>,
    pub last_result: Option<ExchangeResult>,
}

pub struct SwapStore {
    orchestrator: Orchestrator,
    dex: DexRootContract,
    graph: RwLock<TokenGraph>,
    tokens: RwLock<HashMap<Address, Token>>,
    state: StateContainer<SwapState>,
}

impl SwapStore {
    pub fn new(ctx: StoreContext, dex_root: Address) -> Self {
        let dex = DexRootContract::new(ctx.provider.clone(), dex_root);
        Self {
            orchestrator: Orchestrator::new(ctx),
            dex,
            graph: RwLock::new(TokenGraph::new()),
            tokens: RwLock::new(HashMap::new()),
            state: StateContainer::default(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> Arc<SwapState> {
        self.state.snapshot()
    }

    pub fn dispose(&self) {
        self.orchestrator.dispose();
    }

    pub fn token(&self, root: &Address) -> Option<Token> {
        self.tokens.read().get(root).cloned()
    }

    /// Load the pair of `left` and `right` into the route graph
    pub async fn register_pair(&self, left: &Token, right: &Token) -> Result<PairSnapshot, DexError> {
        let ctx = self.orchestrator.context();
        let address = self.dex.expected_pair_address(&left.root, &right.root).await?;
        let snapshot = refresh_pool(ctx.provider.clone(), &ctx.pools, &address)
            .await
            .ok_or(DexError::PoolRootsNotDefined)?;

        let (left_decimals, right_decimals) = if snapshot.roots.left == left.root && snapshot.roots.right == right.root {
            (left.decimals, right.decimals)
        } else if snapshot.roots.left == right.root && snapshot.roots.right == left.root {
            (right.decimals, left.decimals)
        } else {
            return Err(DexError::PoolRootsNotDefined);
        };
        let liquidity = snapshot.liquidity(left_decimals, right_decimals)?;

        self.graph.write().add_pair(liquidity);
        {
            let mut tokens = self.tokens.write();
            tokens.insert(left.root.clone(), left.clone());
            tokens.insert(right.root.clone(), right.clone());
        }
        info!("🔗 Registered pair {}/{} at {}", left.symbol, right.symbol, address);
        Ok(snapshot)
    }

    /// Best route for the request with amounts confirmed by the pairs
    pub async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote, DexError> {
        if request.spent.root == request.receive.root {
            return Err(DexError::TokensNotSelected);
        }
        if request.amount <= Decimal::ZERO {
            return Err(DexError::InvalidAmount(request.amount.to_string()));
        }
        let ctx = self.orchestrator.context();
        let slippage = validate_slippage(request.slippage.unwrap_or(ctx.settings.default_slippage))?;
        let amount_in = to_base_units(request.amount, request.spent.decimals)?;
        if amount_in == 0 {
            return Err(DexError::InvalidAmount(request.amount.to_string()));
        }

        let (estimate, price_impact) = {
            let graph = self.graph.read();
            let estimate = graph.best_route(&request.spent.root, &request.receive.root, request.amount, DEFAULT_MAX_HOPS)?;
            let price_impact = match estimate.route.hops.as_slice() {
                [hop] => graph
                    .pair(&hop.pair)
                    .and_then(|pair| pair.direction(&hop.spent_root))
                    .and_then(|pool| ConstantProductMath::price_impact(request.amount, &pool).ok()),
                _ => None,
            };
            (estimate, price_impact)
        };
        debug!(hops = estimate.route.hops.len(), estimate = %estimate.amount_out, "route selected");

        let mut current = amount_in;
        let mut fee = 0;
        let mut step_amounts = Vec::with_capacity(estimate.route.hops.len());
        let mut step_minimums = Vec::with_capacity(estimate.route.hops.len());
        for (index, hop) in estimate.route.hops.iter().enumerate() {
            let expected = PairContract::new(ctx.provider.clone(), hop.pair.clone())
                .expected_exchange(current, &hop.spent_root)
                .await
                .map_err(|e| DexError::CannotComputeExpectedAmount(e.to_string()))?;
            if expected.expected_amount == 0 {
                return Err(DexError::CannotComputeExpectedAmount(format!("{} returns nothing", hop.pair)));
            }
            if index == 0 {
                fee = expected.expected_fee;
            }
            step_amounts.push(expected.expected_amount);
            step_minimums.push(min_expected_amount(expected.expected_amount, slippage)?);
            current = expected.expected_amount;
        }

        let quote = SwapQuote {
            route: estimate.route,
            amount_in,
            expected_amount: current,
            min_expected_amount: step_minimums.last().copied().unwrap_or_default(),
            step_amounts,
            step_minimums,
            fee,
            price_impact,
            slippage,
        };
        info!(
            "💱 Quote {} {} -> {} {} (min {}, {} hop(s))",
            request.amount,
            request.spent.symbol,
            format_amount(quote.expected_amount, request.receive.decimals),
            request.receive.symbol,
            format_amount(quote.min_expected_amount, request.receive.decimals),
            quote.route.hops.len()
        );
        self.state.update(|state| state.quote = Some(quote.clone()));
        Ok(quote)
    }

    /// Amount of `spent` a direct pair needs to pay out `receive_amount`
    pub async fn expected_spend_amount(&self, spent: &Token, receive: &Token, receive_amount: u128) -> Result<u128, DexError> {
        let pair = self.dex.expected_pair_address(&spent.root, &receive.root).await?;
        PairContract::new(self.orchestrator.context().provider.clone(), pair)
            .expected_spend_amount(receive_amount, &receive.root)
            .await
            .map(|expected| expected.expected_amount)
            .map_err(|e| DexError::CannotComputeExpectedAmount(e.to_string()))
    }

    /// Quote the request and exchange along the selected route
    pub async fn swap(
        &self,
        request: SwapRequest,
        callbacks: TransactionCallbacks<SwapSuccess, SwapCancelled>,
    ) -> Result<OperationOutcome<SwapSuccess, SwapCancelled>, DexError> {
        let quote = self.quote(&request).await?;
        let ctx = self.orchestrator.context();
        let owner = ctx.wallet.clone();

        let spent_wallet = TokenRootContract::new(ctx.provider.clone(), request.spent.root.clone())
            .wallet_of(&owner)
            .await?;
        let spent_wallet = TokenWalletContract::new(ctx.provider.clone(), spent_wallet);
        if spent_wallet.balance_or_zero().await? < quote.amount_in {
            return Err(DexError::InsufficientBalance);
        }

        let first_hop = quote.route.hops.first().ok_or(DexError::RouteNotFound)?;
        let first_pair = PairContract::new(ctx.provider.clone(), first_hop.pair.clone());
        let spec = if quote.route.is_direct() { SWAP } else { CROSS_SWAP };
        let operation = OperationRequest {
            spec,
            watched: owner.clone(),
            summary: format!(
                "{} {} -> {} {}",
                request.amount,
                request.spent.symbol,
                format_amount(quote.expected_amount, request.receive.decimals),
                request.receive.symbol
            ),
        };

        let settings = ctx.settings.clone();
        let plan = quote.clone();
        let recipient = owner.clone();
        let outcome = self
            .orchestrator
            .execute(
                operation,
                move |call_id| async move {
                    let id = numeric_id(&call_id)?;
                    let payload = if plan.route.is_direct() {
                        first_pair
                            .build_exchange_payload(&ExchangePayloadParams {
                                id,
                                deploy_wallet_value: settings.deploy_wallet_value,
                                expected_amount: plan.min_expected_amount,
                                recipient: recipient.clone(),
                            })
                            .await?
                    } else {
                        first_pair
                            .build_cross_exchange_payload(&cross_exchange_params(id, &plan, &settings, &recipient))
                            .await?
                    };
                    Ok::<_, DexError>(spent_wallet.transfer(
                        &recipient,
                        TransferParams {
                            amount: plan.amount_in,
                            recipient: first_pair.address().clone(),
                            deploy_wallet_value: settings.deploy_wallet_value,
                            remaining_gas_to: recipient.clone(),
                            payload,
                            attached_value: settings.transfer_value,
                        },
                    ))
                },
                callbacks,
            )
            .await?;

        if let OperationOutcome::Succeeded(success) = &outcome {
            self.state.update(|state| state.last_result = Some(success.result.clone()));
            self.refresh_after(&request, &quote.route).await;
        }
        Ok(outcome)
    }

    async fn refresh_after(&self, request: &SwapRequest, route: &SwapRoute) {
        let ctx = self.orchestrator.context();
        let owner = &ctx.wallet;
        let (spent, received) = tokio::join!(
            refresh_balance(ctx.provider.clone(), &ctx.balances, owner, &request.spent.root),
            refresh_balance(ctx.provider.clone(), &ctx.balances, owner, &request.receive.root),
        );
        debug!(?spent, ?received, "balances refreshed");

        for hop in &route.hops {
            let Some(snapshot) = refresh_pool(ctx.provider.clone(), &ctx.pools, &hop.pair).await else {
                continue;
            };
            let decimals = {
                let tokens = self.tokens.read();
                tokens
                    .get(&snapshot.roots.left)
                    .zip(tokens.get(&snapshot.roots.right))
                    .map(|(left, right)| (left.decimals, right.decimals))
            };
            if let Some(liquidity) = decimals.and_then(|(left, right)| snapshot.liquidity(left, right).ok()) {
                self.graph.write().add_pair(liquidity);
            }
        }
    }
}

fn cross_exchange_params(
    id: u64,
    quote: &SwapQuote,
    settings: &OperationSettings,
    recipient: &Address,
) -> CrossExchangePayloadParams {
    let hops = &quote.route.hops;
    let steps = hops
        .iter()
        .zip(&quote.step_minimums)
        .enumerate()
        .skip(1)
        .map(|(index, (hop, minimum))| CrossExchangeStep {
            amount: *minimum,
            roots: vec![hop.spent_root.clone(), hop.receive_root.clone()],
            outcoming: hop.receive_root.clone(),
            numerator: 1,
            next_step_indices: if index + 1 < hops.len() { vec![index as u32] } else { Vec::new() },
        })
        .collect();

    CrossExchangePayloadParams {
        id,
        deploy_wallet_value: settings.deploy_wallet_value,
        expected_amount: quote.step_minimums.first().copied().unwrap_or(quote.min_expected_amount),
        outcoming: hops.first().map(|hop| hop.receive_root.clone()).unwrap_or_else(|| recipient.clone()),
        steps,
        recipient: recipient.clone(),
    }
}
