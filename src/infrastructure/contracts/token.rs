//! Fungible token root and wallet

use std::sync::Arc;

use serde_json::{json, Value};

use super::{call_typed, Uint128, Value0};
use crate::domain::correlation::FunctionCall;
use crate::infrastructure::provider::{OutgoingMessage, WalletProvider};
use crate::shared::errors::DexError;
use crate::shared::types::Address;

#[derive(Clone)]
pub struct TokenRootContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl TokenRootContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Address of the token wallet owned by `owner`, deployed or not
    pub async fn wallet_of(&self, owner: &Address) -> Result<Address, DexError> {
        let output: Value0<Address> = call_typed(
            self.provider.as_ref(),
            &self.address,
            "walletOf",
            json!({ "answerId": 0, "walletOwner": owner }),
        )
        .await?;
        Ok(output.value0)
    }

    pub async fn total_supply(&self) -> Result<u128, DexError> {
        let output: Value0<Uint128> =
            call_typed(self.provider.as_ref(), &self.address, "totalSupply", json!({ "answerId": 0 })).await?;
        Ok(output.value0.0)
    }
}

/// Parameters of a token transfer that notifies the receiving side
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub amount: u128,
    /// Owner of the receiving token wallet
    pub recipient: Address,
    pub deploy_wallet_value: u128,
    pub remaining_gas_to: Address,
    pub payload: Value,
    /// Value attached to the message paying for the whole chain of calls
    pub attached_value: u128,
}

#[derive(Clone)]
pub struct TokenWalletContract {
    provider: Arc<dyn WalletProvider>,
    address: Address,
}

impl TokenWalletContract {
    pub fn new(provider: Arc<dyn WalletProvider>, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub async fn balance(&self) -> Result<u128, DexError> {
        let output: Value0<Uint128> =
            call_typed(self.provider.as_ref(), &self.address, "balance", json!({ "answerId": 0 })).await?;
        Ok(output.value0.0)
    }

    /// Balance of a wallet that may not be deployed yet
    pub async fn balance_or_zero(&self) -> Result<u128, DexError> {
        match self.provider.get_full_contract_state(&self.address).await? {
            Some(state) if state.is_deployed => self.balance().await,
            _ => Ok(0),
        }
    }

    /// Message asking this wallet, owned by `owner`, to transfer tokens
    pub fn transfer(&self, owner: &Address, params: TransferParams) -> OutgoingMessage {
        OutgoingMessage {
            sender: owner.clone(),
            recipient: self.address.clone(),
            amount: params.attached_value,
            bounce: true,
            call: FunctionCall::new(
                "transfer",
                json!({
                    "amount": params.amount.to_string(),
                    "recipient": params.recipient,
                    "deployWalletValue": params.deploy_wallet_value.to_string(),
                    "remainingGasTo": params.remaining_gas_to,
                    "notify": true,
                    "payload": params.payload,
                }),
            ),
        }
    }
}
