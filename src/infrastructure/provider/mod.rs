//! Wallet provider boundary: account subscriptions, read-only calls and
//! delayed message delivery.

pub mod memory;
pub mod subscription;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::domain::correlation::{FunctionCall, RawTransaction, TransactionEvent};
use crate::shared::errors::ProviderError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

pub use memory::MemoryProvider;
pub use subscription::{SubscriptionHandle, SubscriptionRegistry, TransactionSubscription};

/// Internal message sent from the user's wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub sender: Address,
    pub recipient: Address,
    #[serde(with = "u128_string")]
    pub amount: u128,
    pub bounce: bool,
    pub call: FunctionCall,
}

/// Handle returned once the wallet accepted and signed a message
#[derive(Debug)]
pub struct DelayedMessage {
    pub message_hash: String,
    pub expire_at: DateTime<Utc>,
    /// Resolves to the wallet transaction that carried the message
    pub transaction: oneshot::Receiver<RawTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState {
    #[serde(with = "u128_string")]
    pub balance: u128,
    pub is_deployed: bool,
    pub code_hash: Option<String>,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn subscribe(&self, account: &Address) -> Result<TransactionSubscription, ProviderError>;

    /// Run a getter locally against the latest contract state
    async fn call(&self, contract: &Address, method: &str, input: Value) -> Result<Value, ProviderError>;

    async fn send_delayed(&self, message: OutgoingMessage) -> Result<DelayedMessage, ProviderError>;

    /// Decode a transaction's inbound call, keeping only the given methods
    fn decode_transaction(&self, transaction: &RawTransaction, methods: &[&str]) -> Option<TransactionEvent>;

    async fn get_full_contract_state(&self, address: &Address) -> Result<Option<ContractState>, ProviderError>;
}
