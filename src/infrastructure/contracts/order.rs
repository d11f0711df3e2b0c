//! Limit order factory, per-token order root and single orders

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{call_typed, Value0};
use crate::domain::correlation::FunctionCall;
use crate::infrastructure::provider::{OutgoingMessage, WalletProvider};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    Initialize,
    AwaitTokens,
    Active,
    Filled,
    Cancelled,
    Expired,
}

impl OrderState {
    pub fn is_open(&self) -> bool {
        matches!(self, OrderState::AwaitTokens | OrderState::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub owner: Address,
    pub state: OrderState,
    pub spent_token_root: Address,
    pub receive_token_root: Address,
    #[serde(with = "u128_string")]
    pub spent_amount: u128,
    #[serde(with = "u128_string")]
    pub expected_amount: u128,
    #[serde(with = "u128_string")]
    pub current_spent_amount: u128,
    #[serde(with = "u128_string")]
    pub current_receive_amount: u128,
}

#[derive(Debug, Clone)]
pub struct CreateOrderParams {
    pub call_id: u64,
    pub receive_root: Address,
    pub expected_amount: u128,
    pub deploy_wallet_value: u128,
}

#[derive(Clone)]
pub struct OrderFactoryContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl OrderFactoryContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    /// Order root collecting orders that spend `spent_root`
    pub async fn expected_order_root(&self, spent_root: &Address) -> Result<Address, DexError> {
        let output: Value0<Address> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "getExpectedAddressOrderRoot",
            json!({ "answerId": 0, "token": spent_root }),
        )
        .await?;
        Ok(output.value0)
    }
}

#[derive(Clone)]
pub struct OrderRootContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl OrderRootContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn build_payload(&self, params: &CreateOrderParams) -> Result<Value, DexError> {
        let output: Value0<Value> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "buildPayload",
            json!({
                "answerId": 0,
                "callbackId": params.call_id.to_string(),
                "tokenReceive": params.receive_root,
                "expectedTokenAmount": params.expected_amount.to_string(),
                "deployWalletValue": params.deploy_wallet_value.to_string(),
            }),
        )
        .await?;
        Ok(output.value0)
    }
}

#[derive(Clone)]
pub struct OrderContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl OrderContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn details(&self) -> Result<OrderDetails, DexError> {
        let output: Value0<OrderDetails> =
            call_typed(self.provider.as_ref(), &self.address, "getDetails", json!({ "answerId": 0 })).await?;
        Ok(output.value0)
    }

    pub fn cancel(&self, owner: &Address, call_id: u64, attached_value: u128) -> OutgoingMessage {
        OutgoingMessage {
            sender: owner.clone(),
            recipient: self.address.clone(),
            amount: attached_value,
            bounce: true,
            call: FunctionCall::new("cancel", json!({ "callbackId": call_id.to_string() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::provider::MemoryProvider;

    fn address(byte: &str) -> Address {
        format!("0:{}", byte.repeat(32)).parse().unwrap()
    }

    #[tokio::test]
    async fn test_order_details_decode() {
        let provider = Arc::new(MemoryProvider::new());
        let (owner, spent, receive) = (address("01"), address("02"), address("03"));
        provider.on_call("getDetails", move |_, _| {
            Ok(json!({ "value0": {
                "owner": owner,
                "state": "Active",
                "spent_token_root": spent,
                "receive_token_root": receive,
                "spent_amount": "100",
                "expected_amount": "200",
                "current_spent_amount": "40",
                "current_receive_amount": "80",
            }}))
        });

        let order = OrderContract::new(provider, address("07"));
        let details = order.details().await.unwrap();
        assert!(details.state.is_open());
        assert_eq!(details.current_spent_amount, 40);
        assert_eq!(order.cancel(&address("01"), 5, 1).call.input["callbackId"], "5");
    }
}
