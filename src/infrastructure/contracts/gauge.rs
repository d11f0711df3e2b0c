//! Vote-escrow gauge

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{call_typed, Value0};
use crate::domain::correlation::FunctionCall;
use crate::infrastructure::provider::{OutgoingMessage, WalletProvider};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeDetails {
    pub deposit_token_root: Address,
    pub reward_token_roots: Vec<Address>,
    #[serde(with = "u128_string")]
    pub total_supply: u128,
    pub max_lock_time: u64,
}

#[derive(Debug, Clone)]
pub struct GaugeDepositParams {
    pub owner: Address,
    pub lock_time: u64,
    pub claim: bool,
    pub call_id: u64,
    pub nonce: u64,
}

#[derive(Clone)]
pub struct GaugeContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl GaugeContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn details(&self) -> Result<GaugeDetails, DexError> {
        let output: Value0<GaugeDetails> =
            call_typed(self.provider.as_ref(), &self.address, "getDetails", json!({ "answerId": 0 })).await?;
        Ok(output.value0)
    }

    pub async fn deposit_payload(&self, params: &GaugeDepositParams) -> Result<Value, DexError> {
        let output: Value0<Value> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "encodeDepositPayload",
            json!({
                "answerId": 0,
                "deposit_owner": params.owner,
                "lock_time": params.lock_time,
                "claim": params.claim,
                "call_id": params.call_id.to_string(),
                "nonce": params.nonce.to_string(),
                "callback_payload": Value::Null,
            }),
        )
        .await?;
        Ok(output.value0)
    }

    pub fn withdraw(
        &self,
        owner: &Address,
        amount: u128,
        claim: bool,
        call_id: u64,
        attached_value: u128,
    ) -> OutgoingMessage {
        self.message(
            owner,
            attached_value,
            FunctionCall::new(
                "withdraw",
                json!({
                    "amount": amount.to_string(),
                    "claim": claim,
                    "call_id": call_id.to_string(),
                    "nonce": "0",
                    "callback_payload": Value::Null,
                }),
            ),
        )
    }

    pub fn claim_reward(&self, owner: &Address, call_id: u64, attached_value: u128) -> OutgoingMessage {
        self.message(
            owner,
            attached_value,
            FunctionCall::new(
                "claimReward",
                json!({ "call_id": call_id.to_string(), "nonce": "0", "callback_payload": Value::Null }),
            ),
        )
    }

    fn message(&self, owner: &Address, attached_value: u128, call: FunctionCall) -> OutgoingMessage {
        OutgoingMessage {
            sender: owner.clone(),
            recipient: self.address.clone(),
            amount: attached_value,
            bounce: true,
            call,
        }
    }
}
