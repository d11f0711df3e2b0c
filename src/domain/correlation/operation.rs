//! Send one message and settle on its single correlated callback

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::call_id::CorrelationId;
use super::dispose::DisposeSignal;
use super::event::{CallbackKind, CallbackMethods, TransactionEvent};
use super::filter::EventStreamFilter;
use crate::infrastructure::provider::{DelayedMessage, WalletProvider};
use crate::shared::errors::ProviderError;
use crate::shared::types::Address;

/// Static description of one correlated action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub methods: CallbackMethods,
    /// Callback input field echoing the call id
    pub id_field: &'static str,
}

impl OperationSpec {
    pub const fn new(name: &'static str, methods: CallbackMethods) -> Self {
        Self {
            name,
            methods,
            id_field: "id",
        }
    }

    pub const fn with_id_field(mut self, id_field: &'static str) -> Self {
        self.id_field = id_field;
        self
    }
}

/// Why an operation did not succeed
#[derive(Debug, Clone, PartialEq)]
pub enum OperationFailure<F> {
    /// The contract answered with a failure callback
    Rejected(F),
    /// The wallet refused the message
    Submission(ProviderError),
    /// The payload could not be built
    Preparation(String),
    /// A callback arrived but its inputs did not decode
    Decode(String),
    TimedOut,
    Cancelled,
}

impl<F> fmt::Display for OperationFailure<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationFailure::Rejected(_) => f.write_str("operation was rejected on chain"),
            OperationFailure::Submission(error) => f.write_str(&error.message),
            OperationFailure::Preparation(message) => write!(f, "failed to prepare message: {}", message),
            OperationFailure::Decode(message) => write!(f, "failed to decode callback: {}", message),
            OperationFailure::TimedOut => f.write_str("confirmation timed out"),
            OperationFailure::Cancelled => f.write_str("operation cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome<S, F> {
    Succeeded(S),
    Failed(OperationFailure<F>),
    /// The user declined to sign; nothing is reported
    Abandoned,
}

impl<S, F> OperationOutcome<S, F> {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Succeeded(_))
    }
}

/// Resolve with the first stream item accepted by `predicate`.
///
/// `None` when the stream ends first.
pub async fn await_first_match<St, P>(stream: &mut St, mut predicate: P) -> Option<TransactionEvent>
where
    St: Stream<Item = TransactionEvent> + Unpin,
    P: FnMut(&TransactionEvent) -> bool,
{
    while let Some(event) = stream.next().await {
        if predicate(&event) {
            return Some(event);
        }
        debug!(lt = event.lt, method = %event.method, "callback for another call id");
    }
    None
}

/// One outgoing message awaiting its correlated callback.
///
/// Opening subscribes to the watched account; the subscription lives inside
/// the operation and is released when it is dropped, whatever the exit path.
/// [`CorrelatedOperation::run`] takes `self`, so an operation settles once.
pub struct CorrelatedOperation<S, F> {
    spec: OperationSpec,
    call_id: CorrelationId,
    filter: EventStreamFilter,
    deadline: Option<Duration>,
    dispose: Option<DisposeSignal>,
    _payloads: PhantomData<fn() -> (S, F)>,
}

impl<S, F> CorrelatedOperation<S, F>
where
    S: DeserializeOwned,
    F: DeserializeOwned,
{
    pub async fn open(
        provider: Arc<dyn WalletProvider>,
        account: &Address,
        spec: OperationSpec,
        call_id: CorrelationId,
    ) -> Result<Self, ProviderError> {
        let filter = EventStreamFilter::open(provider, account, spec.methods.all(), None).await?;
        Ok(Self {
            spec,
            call_id,
            filter,
            deadline: None,
            dispose: None,
            _payloads: PhantomData,
        })
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_dispose_signal(mut self, signal: DisposeSignal) -> Self {
        self.dispose = Some(signal);
        self
    }

    pub fn call_id(&self) -> &CorrelationId {
        &self.call_id
    }

    pub fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    /// Send the message and wait for the callback carrying this call id.
    ///
    /// `on_send` runs once the wallet accepted the message, before waiting.
    pub async fn run<Fut, OnSend>(mut self, send: Fut, on_send: OnSend) -> OperationOutcome<S, F>
    where
        Fut: Future<Output = Result<DelayedMessage, ProviderError>>,
        OnSend: FnOnce(&DelayedMessage),
    {
        let name = self.spec.name;
        let mut dispose = self.dispose.take();
        if dispose.as_ref().is_some_and(DisposeSignal::is_disposed) {
            debug!(operation = name, call_id = %self.call_id, "store disposed before sending");
            return OperationOutcome::Failed(OperationFailure::Cancelled);
        }

        let delayed = match send.await {
            Ok(delayed) => delayed,
            Err(error) if error.is_user_rejected() => {
                info!(operation = name, call_id = %self.call_id, "user declined to sign");
                return OperationOutcome::Abandoned;
            }
            Err(error) => {
                warn!(operation = name, call_id = %self.call_id, code = error.code, "send failed: {}", error.message);
                return OperationOutcome::Failed(OperationFailure::Submission(error));
            }
        };
        on_send(&delayed);
        debug!(operation = name, call_id = %self.call_id, message = %delayed.message_hash, "awaiting callback");

        let deadline = self.deadline;
        let call_id = self.call_id.clone();
        let id_field = self.spec.id_field;
        let matched = {
            let first_match = await_first_match(&mut self.filter, |event| {
                event.field(id_field).is_some_and(|value| call_id.matches(value))
            });
            let timeout = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep(deadline).await,
                    None => futures::future::pending::<()>().await,
                }
            };
            let disposed = async {
                match dispose.as_mut() {
                    Some(signal) => signal.disposed().await,
                    None => futures::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = first_match => event.ok_or(OperationFailure::Cancelled),
                _ = timeout => Err(OperationFailure::TimedOut),
                _ = disposed => Err(OperationFailure::Cancelled),
            }
        };
        self.filter.close();

        let event = match matched {
            Ok(event) => event,
            Err(failure) => {
                warn!(operation = name, call_id = %self.call_id, "{}", failure);
                return OperationOutcome::Failed(failure);
            }
        };

        match self.spec.methods.classify(&event.method) {
            Some(CallbackKind::Success) => match event.decode::<S>() {
                Ok(payload) => {
                    info!(operation = name, call_id = %self.call_id, lt = event.lt, "operation succeeded");
                    OperationOutcome::Succeeded(payload)
                }
                Err(error) => OperationOutcome::Failed(OperationFailure::Decode(error.to_string())),
            },
            Some(CallbackKind::Failure) => match event.decode::<F>() {
                Ok(payload) => {
                    info!(operation = name, call_id = %self.call_id, method = %event.method, "operation rejected");
                    OperationOutcome::Failed(OperationFailure::Rejected(payload))
                }
                Err(error) => OperationOutcome::Failed(OperationFailure::Decode(error.to_string())),
            },
            None => OperationOutcome::Failed(OperationFailure::Decode(format!(
                "unexpected callback {}",
                event.method
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::correlation::{Disposer, FunctionCall};
    use crate::infrastructure::provider::{MemoryProvider, OutgoingMessage};
    use serde::Deserialize;
    use serde_json::{json, Value};

    const SPEC: OperationSpec = OperationSpec::new("test", CallbackMethods::new(&["aSuccess"], &["aFail"]));

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ack {
        id: String,
    }

    fn wallet() -> Address {
        format!("0:{}", "01".repeat(32)).parse().unwrap()
    }

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            sender: wallet(),
            recipient: format!("0:{}", "02".repeat(32)).parse().unwrap(),
            amount: 0,
            bounce: true,
            call: FunctionCall::new("act", json!({})),
        }
    }

    async fn open(provider: &Arc<MemoryProvider>, id: u64) -> CorrelatedOperation<Ack, Value> {
        CorrelatedOperation::open(provider.clone(), &wallet(), SPEC, CorrelationId::from(id))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_matching_callback_wins() {
        let provider = Arc::new(MemoryProvider::new());
        let operation = open(&provider, 7).await;
        provider.callback(&wallet(), None, "aSuccess", json!({"id": "8"}));
        provider.callback(&wallet(), None, "aSuccess", json!({"id": "7"}));
        provider.callback(&wallet(), None, "aFail", json!({"id": "7"}));

        let mut sent = 0;
        let outcome = operation.run(provider.send_delayed(message()), |_| sent += 1).await;
        assert_eq!(outcome, OperationOutcome::Succeeded(Ack { id: "7".into() }));
        assert_eq!(sent, 1);
        assert_eq!(provider.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_callback_is_rejection() {
        let provider = Arc::new(MemoryProvider::new());
        let operation = open(&provider, 1).await;
        provider.callback(&wallet(), None, "aFail", json!({"id": 1, "reason": "slippage"}));

        let outcome = operation.run(provider.send_delayed(message()), |_| {}).await;
        match outcome {
            OperationOutcome::Failed(OperationFailure::Rejected(data)) => assert_eq!(data["reason"], "slippage"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_user_rejection_is_silent_abandonment() {
        let provider = Arc::new(MemoryProvider::new());
        provider.fail_next_send(ProviderError::user_rejected());
        let operation = open(&provider, 1).await;

        let mut sent = false;
        let outcome = operation.run(provider.send_delayed(message()), |_| sent = true).await;
        assert_eq!(outcome, OperationOutcome::Abandoned);
        assert!(!sent);
        assert_eq!(provider.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_settles_pending_operation() {
        let provider = Arc::new(MemoryProvider::new());
        let operation = open(&provider, 1).await.with_deadline(Some(Duration::from_millis(20)));

        let outcome = operation.run(provider.send_delayed(message()), |_| {}).await;
        assert_eq!(outcome, OperationOutcome::Failed(OperationFailure::TimedOut));
        assert_eq!(provider.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_disposal_settles_pending_operation() {
        let provider = Arc::new(MemoryProvider::new());
        let disposer = Disposer::new();
        let operation = open(&provider, 1).await.with_dispose_signal(disposer.signal());

        let pending = tokio::spawn({
            let provider = provider.clone();
            async move { operation.run(provider.send_delayed(message()), |_| {}).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        disposer.dispose();

        let outcome = pending.await.unwrap();
        assert_eq!(outcome, OperationOutcome::Failed(OperationFailure::Cancelled));
        assert_eq!(provider.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_reported() {
        let provider = Arc::new(MemoryProvider::new());
        let operation = open(&provider, 3).await;
        provider.callback(&wallet(), None, "aSuccess", json!({"id": 3}));

        let outcome = operation.run(provider.send_delayed(message()), |_| {}).await;
        assert!(matches!(outcome, OperationOutcome::Failed(OperationFailure::Decode(_))));
    }

    #[tokio::test]
    async fn test_await_first_match_ends_with_stream() {
        let mut empty = futures::stream::empty::<TransactionEvent>();
        assert!(await_first_match(&mut empty, |_| true).await.is_none());
    }
}
