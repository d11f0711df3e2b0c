//! In-memory wallet provider with scriptable getters and message handlers

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{ContractState, DelayedMessage, OutgoingMessage, SubscriptionRegistry, TransactionSubscription, WalletProvider};
use crate::domain::correlation::{decode_function_call, FunctionCall, RawTransaction, TransactionEvent};
use crate::shared::errors::ProviderError;
use crate::shared::types::Address;

type CallHandler = Arc<dyn Fn(&Address, &Value) -> Result<Value, ProviderError> + Send + Sync>;
type SendHandler = Arc<dyn Fn(&MemoryProvider, &OutgoingMessage) + Send + Sync>;

const MESSAGE_TTL_SECS: i64 = 60;

#[derive(Default)]
struct Handlers {
    by_contract: HashMap<(Address, String), CallHandler>,
    by_method: HashMap<String, CallHandler>,
    on_send: Vec<(Option<Address>, SendHandler)>,
}

/// Wallet provider backed by process memory.
///
/// Getters are answered by registered handlers, sent messages are recorded and
/// handed to the handler registered for their recipient, which may emit
/// callback transactions through [`MemoryProvider::callback`].
pub struct MemoryProvider {
    registry: SubscriptionRegistry,
    handlers: Mutex<Handlers>,
    send_failures: Mutex<VecDeque<ProviderError>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    states: Mutex<HashMap<Address, ContractState>>,
    next_lt: AtomicU64,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            registry: SubscriptionRegistry::new(),
            handlers: Mutex::new(Handlers::default()),
            send_failures: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            states: Mutex::new(HashMap::new()),
            next_lt: AtomicU64::new(1_000),
        }
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Answer `method` on any contract
    pub fn on_call<H>(&self, method: &str, handler: H)
    where
        H: Fn(&Address, &Value) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .by_method
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Answer `method` on one contract; takes precedence over [`Self::on_call`]
    pub fn on_contract_call<H>(&self, contract: &Address, method: &str, handler: H)
    where
        H: Fn(&Address, &Value) -> Result<Value, ProviderError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .by_contract
            .insert((contract.clone(), method.to_string()), Arc::new(handler));
    }

    /// React to messages delivered to `recipient`
    pub fn on_send<H>(&self, recipient: &Address, handler: H)
    where
        H: Fn(&MemoryProvider, &OutgoingMessage) + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .on_send
            .push((Some(recipient.clone()), Arc::new(handler)));
    }

    /// React to every sent message
    pub fn on_any_send<H>(&self, handler: H)
    where
        H: Fn(&MemoryProvider, &OutgoingMessage) + Send + Sync + 'static,
    {
        self.handlers.lock().on_send.push((None, Arc::new(handler)));
    }

    /// Make the next `send_delayed` fail with `error`
    pub fn fail_next_send(&self, error: ProviderError) {
        self.send_failures.lock().push_back(error);
    }

    pub fn sent_messages(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    pub fn set_contract_state(&self, address: &Address, state: ContractState) {
        self.states.lock().insert(address.clone(), state);
    }

    pub fn next_lt(&self) -> u64 {
        self.next_lt.fetch_add(1, Ordering::SeqCst)
    }

    /// Publish a transaction on `account` whose inbound message calls `method`
    pub fn callback(&self, account: &Address, src: Option<&Address>, method: &str, input: Value) -> RawTransaction {
        let lt = self.next_lt();
        let transaction = RawTransaction {
            lt,
            hash: format!("{:064x}", rand::random::<u128>() ^ lt as u128),
            account: account.clone(),
            src: src.cloned(),
            body: Some(FunctionCall::new(method, input)),
            aborted: false,
        };
        self.emit(transaction.clone());
        transaction
    }

    /// Publish a prepared transaction as is
    pub fn emit(&self, transaction: RawTransaction) -> usize {
        let delivered = self.registry.publish(&transaction);
        debug!(lt = transaction.lt, account = %transaction.account, delivered, "emitted transaction");
        delivered
    }

    fn find_call_handler(&self, contract: &Address, method: &str) -> Option<CallHandler> {
        let handlers = self.handlers.lock();
        handlers
            .by_contract
            .get(&(contract.clone(), method.to_string()))
            .or_else(|| handlers.by_method.get(method))
            .cloned()
    }

    fn send_handlers_for(&self, recipient: &Address) -> Vec<SendHandler> {
        self.handlers
            .lock()
            .on_send
            .iter()
            .filter(|(address, _)| address.as_ref().map_or(true, |address| address == recipient))
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

#[async_trait]
impl WalletProvider for MemoryProvider {
    async fn subscribe(&self, account: &Address) -> Result<TransactionSubscription, ProviderError> {
        Ok(self.registry.subscribe(account))
    }

    async fn call(&self, contract: &Address, method: &str, input: Value) -> Result<Value, ProviderError> {
        let handler = self.find_call_handler(contract, method).ok_or_else(|| {
            ProviderError::new(
                ProviderError::METHOD_NOT_FOUND,
                format!("{} is not answered by {}", method, contract),
            )
        })?;
        handler(contract, &input)
    }

    async fn send_delayed(&self, message: OutgoingMessage) -> Result<DelayedMessage, ProviderError> {
        if let Some(error) = self.send_failures.lock().pop_front() {
            debug!(code = error.code, "send rejected");
            return Err(error);
        }
        info!(
            recipient = %message.recipient,
            method = %message.call.method,
            amount = message.amount,
            "message sent"
        );
        self.sent.lock().push(message.clone());

        let outgoing = self.callback(
            &message.sender,
            None,
            "sendTransaction",
            json!({
                "dest": message.recipient,
                "value": message.amount.to_string(),
                "bounce": message.bounce,
                "payload": message.call,
            }),
        );
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(outgoing.clone());

        for handler in self.send_handlers_for(&message.recipient) {
            handler(self, &message);
        }

        Ok(DelayedMessage {
            message_hash: outgoing.hash,
            expire_at: Utc::now() + ChronoDuration::seconds(MESSAGE_TTL_SECS),
            transaction: receiver,
        })
    }

    fn decode_transaction(&self, transaction: &RawTransaction, methods: &[&str]) -> Option<TransactionEvent> {
        decode_function_call(transaction, methods)
    }

    async fn get_full_contract_state(&self, address: &Address) -> Result<Option<ContractState>, ProviderError> {
        Ok(self.states.lock().get(address).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: &str) -> Address {
        format!("0:{}", byte.repeat(32)).parse().unwrap()
    }

    #[tokio::test]
    async fn test_contract_handler_takes_precedence() {
        let provider = MemoryProvider::new();
        let pair = address("01");
        provider.on_call("getBalances", |_, _| Ok(json!({"value0": "generic"})));
        provider.on_contract_call(&pair, "getBalances", |_, _| Ok(json!({"value0": "pair"})));

        let specific = provider.call(&pair, "getBalances", json!({})).await.unwrap();
        let generic = provider.call(&address("02"), "getBalances", json!({})).await.unwrap();
        assert_eq!(specific["value0"], "pair");
        assert_eq!(generic["value0"], "generic");

        let missing = provider.call(&pair, "unknown", json!({})).await.unwrap_err();
        assert_eq!(missing.code, ProviderError::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_send_runs_handlers_and_resolves_transaction() {
        let provider = MemoryProvider::new();
        let wallet = address("01");
        let pair = address("02");
        provider.on_send(&pair, |provider, message| {
            provider.callback(&message.sender, Some(&message.recipient), "done", json!({}));
        });
        let mut subscription = provider.subscribe(&wallet).await.unwrap();

        let delayed = provider
            .send_delayed(OutgoingMessage {
                sender: wallet.clone(),
                recipient: pair.clone(),
                amount: 1,
                bounce: true,
                call: FunctionCall::new("exchange", json!({})),
            })
            .await
            .unwrap();

        let carried = delayed.transaction.await.unwrap();
        assert_eq!(carried.hash, delayed.message_hash);
        let first = subscription.receiver.recv().await.unwrap();
        let second = subscription.receiver.recv().await.unwrap();
        assert_eq!(first.body.unwrap().method, "sendTransaction");
        assert_eq!(second.body.unwrap().method, "done");
        assert!(second.lt > first.lt);
        assert_eq!(provider.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_send_failure() {
        let provider = MemoryProvider::new();
        provider.fail_next_send(ProviderError::user_rejected());
        let result = provider
            .send_delayed(OutgoingMessage {
                sender: address("01"),
                recipient: address("02"),
                amount: 0,
                bounce: false,
                call: FunctionCall::new("exchange", json!({})),
            })
            .await;
        assert!(result.unwrap_err().is_user_rejected());
        assert!(provider.sent_messages().is_empty());
    }
}
