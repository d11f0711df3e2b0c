//! DEX root and per-user DEX account

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{call_typed, Value0};
use crate::domain::correlation::FunctionCall;
use crate::infrastructure::provider::{OutgoingMessage, WalletProvider};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

#[derive(Clone)]
pub struct DexRootContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl DexRootContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn expected_pair_address(&self, left_root: &Address, right_root: &Address) -> Result<Address, DexError> {
        let output: Value0<Address> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "getExpectedPairAddress",
            json!({ "answerId": 0, "left_root": left_root, "right_root": right_root }),
        )
        .await?;
        Ok(output.value0)
    }

    pub async fn expected_account_address(&self, owner: &Address) -> Result<Address, DexError> {
        let output: Value0<Address> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "getExpectedAccountAddress",
            json!({ "answerId": 0, "account_owner": owner }),
        )
        .await?;
        Ok(output.value0)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WalletData {
    #[serde(with = "u128_string")]
    balance: u128,
}

#[derive(Debug, Clone)]
pub struct DepositLiquidityParams {
    pub call_id: u64,
    pub left_root: Address,
    pub left_amount: u128,
    pub right_root: Address,
    pub right_amount: u128,
    pub lp_root: Address,
    pub expected_lp_amount: u128,
    pub auto_change: bool,
    pub attached_value: u128,
}

#[derive(Clone)]
pub struct DexAccountContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl DexAccountContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn is_deployed(&self) -> Result<bool, DexError> {
        Ok(self
            .provider
            .get_full_contract_state(&self.address)
            .await?
            .is_some_and(|state| state.is_deployed))
    }

    /// Tokens of `root` held by the account
    pub async fn balance_of(&self, root: &Address) -> Result<u128, DexError> {
        let output: WalletData = call_typed(
            self.provider.as_ref(),
            &self.address,
            "getWalletData",
            json!({ "answerId": 0, "token_root": root }),
        )
        .await?;
        Ok(output.balance)
    }

    /// Message from `owner` depositing both sides of a pair from the account
    pub fn deposit_liquidity(&self, owner: &Address, params: &DepositLiquidityParams) -> OutgoingMessage {
        OutgoingMessage {
            sender: owner.clone(),
            recipient: self.address.clone(),
            amount: params.attached_value,
            bounce: true,
            call: FunctionCall::new(
                "depositLiquidityV2",
                json!({
                    "_callId": params.call_id.to_string(),
                    "_operations": [
                        { "amount": params.left_amount.to_string(), "root": params.left_root },
                        { "amount": params.right_amount.to_string(), "root": params.right_root },
                    ],
                    "_expected": { "amount": params.expected_lp_amount.to_string(), "root": params.lp_root },
                    "_autoChange": params.auto_change,
                    "_remainingGasTo": owner,
                    "_referrer": Value::Null,
                }),
            ),
        }
    }
}
