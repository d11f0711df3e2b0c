//! Farming pool and per-user farming data

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{call_typed, Value0};
use crate::domain::correlation::FunctionCall;
use crate::infrastructure::provider::{OutgoingMessage, WalletProvider};
use crate::shared::errors::DexError;
use crate::shared::serde_utils::{u128_string, vec_u128_string};
use crate::shared::types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmPoolDetails {
    pub token_root: Address,
    pub reward_token_roots: Vec<Address>,
    #[serde(with = "u128_string")]
    pub token_balance: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmUserDetails {
    #[serde(with = "u128_string")]
    pub amount: u128,
    #[serde(default, with = "vec_u128_string")]
    pub pending_rewards: Vec<u128>,
}

#[derive(Clone)]
pub struct FarmPoolContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl FarmPoolContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn details(&self) -> Result<FarmPoolDetails, DexError> {
        let output: Value0<FarmPoolDetails> =
            call_typed(self.provider.as_ref(), &self.address, "getDetails", json!({ "answerId": 0 })).await?;
        Ok(output.value0)
    }

    pub async fn user_data_address(&self, owner: &Address) -> Result<Address, DexError> {
        let output: Value0<Address> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "getUserDataAddress",
            json!({ "answerId": 0, "user": owner }),
        )
        .await?;
        Ok(output.value0)
    }

    /// Transfer payload that credits a deposit to `owner`
    pub async fn deposit_payload(&self, owner: &Address, nonce: u64) -> Result<Value, DexError> {
        let output: Value0<Value> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "encodeDepositPayload",
            json!({ "answerId": 0, "deposit_owner": owner, "nonce": nonce.to_string() }),
        )
        .await?;
        Ok(output.value0)
    }

    pub fn withdraw(&self, owner: &Address, amount: u128, nonce: u64, attached_value: u128) -> OutgoingMessage {
        self.message(
            owner,
            attached_value,
            FunctionCall::new(
                "withdraw",
                json!({ "amount": amount.to_string(), "send_gas_to": owner, "nonce": nonce.to_string() }),
            ),
        )
    }

    pub fn claim_reward(&self, owner: &Address, nonce: u64, attached_value: u128) -> OutgoingMessage {
        self.message(
            owner,
            attached_value,
            FunctionCall::new("claimReward", json!({ "send_gas_to": owner, "nonce": nonce.to_string() })),
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

#[derive(Clone)]
pub struct FarmUserDataContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl FarmUserDataContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// `None` until the first deposit deploys the contract
    pub async fn details(&self) -> Result<Option<FarmUserDetails>, DexError> {
        let deployed = self
            .provider
            .get_full_contract_state(&self.address)
            .await?
            .is_some_and(|state| state.is_deployed);
        if !deployed {
            return Ok(None);
        }
        let output: Value0<FarmUserDetails> =
            call_typed(self.provider.as_ref(), &self.address, "getDetails", json!({ "answerId": 0 })).await?;
        Ok(Some(output.value0))
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
    async fn test_user_data_is_absent_before_first_deposit() {
        let provider = Arc::new(MemoryProvider::new());
        let user_data = FarmUserDataContract::new(provider, address("05"));
        assert_eq!(user_data.details().await.unwrap(), None);
    }

    #[test]
    fn test_withdraw_and_claim_messages() {
        let provider = Arc::new(MemoryProvider::new());
        let pool = FarmPoolContract::new(provider, address("06"));
        let owner = address("01");

        let withdraw = pool.withdraw(&owner, 15, 9, 100);
        assert_eq!(withdraw.recipient, address("06"));
        assert_eq!(withdraw.call.input["nonce"], "9");
        assert_eq!(withdraw.call.input["amount"], "15");

        let claim = pool.claim_reward(&owner, 10, 100);
        assert_eq!(claim.call.method, "claimReward");
    }
}
