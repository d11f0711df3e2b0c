//! DEX pair getters and payload builders

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{call_typed, Value0};
use crate::domain::math::{Fee, PairLiquidity};
use crate::infrastructure::provider::WalletProvider;
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;
use crate::shared::utils::from_base_units;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRoots {
    pub left: Address,
    pub right: Address,
    pub lp: Address,
}

impl TokenRoots {
    pub fn contains(&self, root: &Address) -> bool {
        &self.left == root || &self.right == root
    }

    /// The other side of the pair
    pub fn counterpart(&self, root: &Address) -> Option<&Address> {
        if root == &self.left {
            Some(&self.right)
        } else if root == &self.right {
            Some(&self.left)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairBalances {
    #[serde(with = "u128_string")]
    pub lp_supply: u128,
    #[serde(with = "u128_string")]
    pub left_balance: u128,
    #[serde(with = "u128_string")]
    pub right_balance: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    #[serde(with = "u128_string")]
    pub denominator: u128,
    #[serde(with = "u128_string")]
    pub pool_numerator: u128,
    #[serde(with = "u128_string")]
    pub beneficiary_numerator: u128,
}

impl FeeParams {
    /// Total fee charged on the spent amount
    pub fn fee(&self) -> Result<Fee, DexError> {
        let numerator = self.pool_numerator + self.beneficiary_numerator;
        let convert = |value: u128| u64::try_from(value).map_err(|e| DexError::Math(e.to_string()));
        Fee::new(convert(numerator)?, convert(self.denominator)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedExchange {
    #[serde(with = "u128_string")]
    pub expected_amount: u128,
    #[serde(with = "u128_string")]
    pub expected_fee: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct ExpectedWithdraw {
    #[serde(with = "u128_string")]
    expected_left_amount: u128,
    #[serde(with = "u128_string")]
    expected_right_amount: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct ExpectedDeposit {
    #[serde(with = "u128_string")]
    lp_reward: u128,
}

/// Everything the stores read from a pair in one place
#[derive(Debug, Clone, PartialEq)]
pub struct PairSnapshot {
    pub address: Address,
    pub roots: TokenRoots,
    pub balances: PairBalances,
    pub fee: Fee,
}

impl PairSnapshot {
    pub fn is_empty(&self) -> bool {
        self.balances.lp_supply == 0
    }

    /// Reserves in token units for route search
    pub fn liquidity(&self, left_decimals: u8, right_decimals: u8) -> Result<PairLiquidity, DexError> {
        Ok(PairLiquidity {
            pair: self.address.clone(),
            left_root: self.roots.left.clone(),
            right_root: self.roots.right.clone(),
            left_reserve: from_base_units(self.balances.left_balance, left_decimals)?,
            right_reserve: from_base_units(self.balances.right_balance, right_decimals)?,
            fee: self.fee,
        })
    }

    /// Reserve of `root`, if it belongs to the pair
    pub fn reserve_of(&self, root: &Address) -> Option<u128> {
        if root == &self.roots.left {
            Some(self.balances.left_balance)
        } else if root == &self.roots.right {
            Some(self.balances.right_balance)
        } else {
            None
        }
    }

    pub fn left_price(&self, left_decimals: u8, right_decimals: u8) -> Option<Decimal> {
        let left = from_base_units(self.balances.left_balance, left_decimals).ok()?;
        let right = from_base_units(self.balances.right_balance, right_decimals).ok()?;
        if left.is_zero() {
            return None;
        }
        right.checked_div(left)
    }
}

#[derive(Debug, Clone)]
pub struct ExchangePayloadParams {
    pub id: u64,
    pub deploy_wallet_value: u128,
    pub expected_amount: u128,
    pub recipient: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossExchangeStep {
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub roots: Vec<Address>,
    pub outcoming: Address,
    pub numerator: u32,
    #[serde(rename = "nextStepIndices")]
    pub next_step_indices: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct CrossExchangePayloadParams {
    pub id: u64,
    pub deploy_wallet_value: u128,
    pub expected_amount: u128,
    /// Root received from the first pair
    pub outcoming: Address,
    pub steps: Vec<CrossExchangeStep>,
    pub recipient: Address,
}

#[derive(Debug, Clone)]
pub struct WithdrawPayloadParams {
    pub id: u64,
    pub deploy_wallet_value: u128,
    pub expected_left_amount: u128,
    pub expected_right_amount: u128,
    pub recipient: Address,
}

#[derive(Clone)]
pub struct PairContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl PairContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, input: Value) -> Result<T, DexError> {
        call_typed(self.provider.as_ref(), &self.address, method, input).await
    }

    pub async fn token_roots(&self) -> Result<TokenRoots, DexError> {
        self.call("getTokenRoots", json!({ "answerId": 0 })).await
    }

    pub async fn balances(&self) -> Result<PairBalances, DexError> {
        let output: Value0<PairBalances> = self.call("getBalances", json!({ "answerId": 0 })).await?;
        Ok(output.value0)
    }

    pub async fn fee_params(&self) -> Result<FeeParams, DexError> {
        let output: Value0<FeeParams> = self.call("getFeeParams", json!({ "answerId": 0 })).await?;
        Ok(output.value0)
    }

    pub async fn snapshot(&self) -> Result<PairSnapshot, DexError> {
        let (roots, balances, fee_params) = tokio::try_join!(self.token_roots(), self.balances(), self.fee_params())?;
        Ok(PairSnapshot {
            address: self.address.clone(),
            roots,
            balances,
            fee: fee_params.fee()?,
        })
    }

    pub async fn expected_exchange(&self, amount: u128, spent_root: &Address) -> Result<ExpectedExchange, DexError> {
        self.call(
            "expectedExchange",
            json!({ "answerId": 0, "amount": amount.to_string(), "spent_token_root": spent_root }),
        )
        .await
    }

    pub async fn expected_spend_amount(
        &self,
        receive_amount: u128,
        receive_root: &Address,
    ) -> Result<ExpectedExchange, DexError> {
        self.call(
            "expectedSpendAmount",
            json!({ "answerId": 0, "receive_amount": receive_amount.to_string(), "receive_token_root": receive_root }),
        )
        .await
    }

    /// Left and right amounts returned for burning `lp_amount`
    pub async fn expected_withdraw_liquidity(&self, lp_amount: u128) -> Result<(u128, u128), DexError> {
        let output: ExpectedWithdraw = self
            .call(
                "expectedWithdrawLiquidity",
                json!({ "answerId": 0, "lp_amount": lp_amount.to_string() }),
            )
            .await?;
        Ok((output.expected_left_amount, output.expected_right_amount))
    }

    pub async fn expected_deposit_liquidity(
        &self,
        left_amount: u128,
        right_amount: u128,
        auto_change: bool,
    ) -> Result<u128, DexError> {
        let output: ExpectedDeposit = self
            .call(
                "expectedDepositLiquidity",
                json!({
                    "answerId": 0,
                    "left_amount": left_amount.to_string(),
                    "right_amount": right_amount.to_string(),
                    "auto_change": auto_change,
                }),
            )
            .await?;
        Ok(output.lp_reward)
    }

    pub async fn build_exchange_payload(&self, params: &ExchangePayloadParams) -> Result<Value, DexError> {
        let output: Value0<Value> = self
            .call(
                "buildExchangePayloadV2",
                json!({
                    "answerId": 0,
                    "_id": params.id.to_string(),
                    "_deployWalletGrams": params.deploy_wallet_value.to_string(),
                    "_expectedAmount": params.expected_amount.to_string(),
                    "_recipient": params.recipient,
                    "_referrer": Value::Null,
                }),
            )
            .await?;
        Ok(output.value0)
    }

    pub async fn build_cross_exchange_payload(&self, params: &CrossExchangePayloadParams) -> Result<Value, DexError> {
        let output: Value0<Value> = self
            .call(
                "buildCrossPairExchangePayloadV2",
                json!({
                    "answerId": 0,
                    "_id": params.id.to_string(),
                    "_deployWalletGrams": params.deploy_wallet_value.to_string(),
                    "_expectedAmount": params.expected_amount.to_string(),
                    "_outcoming": params.outcoming,
                    "_nextStepIndices": [0],
                    "_steps": params.steps,
                    "_recipient": params.recipient,
                    "_referrer": Value::Null,
                }),
            )
            .await?;
        Ok(output.value0)
    }

    pub async fn build_withdraw_payload(&self, params: &WithdrawPayloadParams) -> Result<Value, DexError> {
        let output: Value0<Value> = self
            .call(
                "buildWithdrawLiquidityPayloadV2",
                json!({
                    "answerId": 0,
                    "_id": params.id.to_string(),
                    "_deployWalletGrams": params.deploy_wallet_value.to_string(),
                    "_expectedLeftAmount": params.expected_left_amount.to_string(),
                    "_expectedRightAmount": params.expected_right_amount.to_string(),
                    "_recipient": params.recipient,
                    "_referrer": Value::Null,
                }),
            )
            .await?;
        Ok(output.value0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::provider::MemoryProvider;
    use rust_decimal_macros::dec;

    fn address(byte: &str) -> Address {
        format!("0:{}", byte.repeat(32)).parse().unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_reads_all_getters() {
        let provider = Arc::new(MemoryProvider::new());
        let (left, right, lp) = (address("01"), address("02"), address("03"));
        let roots = json!({ "left": left, "right": right, "lp": lp });
        provider.on_call("getTokenRoots", move |_, _| Ok(roots.clone()));
        provider.on_call("getBalances", |_, _| {
            Ok(json!({ "value0": {
                "lp_supply": "1000000",
                "left_balance": "1000000000000",
                "right_balance": "2000000000000",
            }}))
        });
        provider.on_call("getFeeParams", |_, _| {
            Ok(json!({ "value0": { "denominator": "1000000", "pool_numerator": "2500", "beneficiary_numerator": "500" }}))
        });

        let pair = PairContract::new(provider, address("0a"));
        let snapshot = pair.snapshot().await.unwrap();
        assert_eq!(snapshot.roots.counterpart(&left), Some(&right));
        assert_eq!(snapshot.fee, Fee::new(3000, 1_000_000).unwrap());
        assert_eq!(snapshot.reserve_of(&right), Some(2_000_000_000_000));
        assert_eq!(snapshot.left_price(9, 9), Some(dec!(2)));

        let liquidity = snapshot.liquidity(9, 9).unwrap();
        assert_eq!(liquidity.left_reserve, dec!(1000));
    }

    #[tokio::test]
    async fn test_malformed_response_is_reported() {
        let provider = Arc::new(MemoryProvider::new());
        provider.on_call("expectedExchange", |_, _| Ok(json!({ "expected_amount": "x" })));
        let pair = PairContract::new(provider, address("0a"));
        let error = pair.expected_exchange(1, &address("01")).await.unwrap_err();
        assert!(matches!(error, DexError::UnexpectedResponse(_)));
    }
}
