//! Submission lifecycle shared by every store.
//!
//! A store describes one action as an [`OperationRequest`] plus a builder for
//! its message; [`Orchestrator::execute`] does the rest: busy tracking, the
//! correlated send, receipts, notifications and exactly one continuation.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::context::StoreContext;
use crate::application::notifications::NotificationKind;
use crate::application::receipts::{Receipt, ReceiptStatus};
use crate::domain::correlation::{
    CorrelatedOperation, CorrelationId, Disposer, OperationFailure, OperationOutcome, OperationSpec,
};
use crate::domain::state::StateContainer;
use crate::infrastructure::provider::OutgoingMessage;
use crate::shared::errors::DexError;
use crate::shared::types::Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OperationPhase {
    #[default]
    Idle,
    AwaitingSubmission,
    AwaitingConfirmation,
    Succeeded,
    Failed,
    Abandoned,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub phase: OperationPhase,
    pub busy: bool,
    pub operation: Option<&'static str>,
    pub call_id: Option<CorrelationId>,
}

/// What the failure continuation receives
#[derive(Debug)]
pub struct FailureReport<F> {
    pub call_id: CorrelationId,
    pub operation: &'static str,
    pub message: String,
    pub reason: OperationFailure<F>,
}

impl<F> FailureReport<F> {
    /// Decoded failure callback, when the contract rejected the operation
    pub fn rejection(&self) -> Option<&F> {
        match &self.reason {
            OperationFailure::Rejected(payload) => Some(payload),
            _ => None,
        }
    }
}

type SendCallback = Box<dyn FnOnce(&Receipt) + Send>;
type SuccessCallback<S> = Box<dyn FnOnce(&S) + Send>;
type FailureCallback<F> = Box<dyn FnOnce(&FailureReport<F>) + Send>;

/// Optional continuations of one submission
pub struct TransactionCallbacks<S, F> {
    on_send: Option<SendCallback>,
    on_success: Option<SuccessCallback<S>>,
    on_failure: Option<FailureCallback<F>>,
}

impl<S, F> Default for TransactionCallbacks<S, F> {
    fn default() -> Self {
        Self {
            on_send: None,
            on_success: None,
            on_failure: None,
        }
    }
}

impl<S, F> TransactionCallbacks<S, F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_send(mut self, callback: impl FnOnce(&Receipt) + Send + 'static) -> Self {
        self.on_send = Some(Box::new(callback));
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(&S) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl FnOnce(&FailureReport<F>) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(callback));
        self
    }
}

/// One action a store submits
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub spec: OperationSpec,
    /// Account whose transactions carry the callback
    pub watched: Address,
    /// Human-readable line for receipts and notifications
    pub summary: String,
}

struct BusyGuard<'a> {
    status: &'a StateContainer<OperationStatus>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.status.update_if(|status| std::mem::replace(&mut status.busy, false));
    }
}

pub struct Orchestrator {
    ctx: StoreContext,
    disposer: Disposer,
    status: StateContainer<OperationStatus>,
}

impl Orchestrator {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            ctx,
            disposer: Disposer::new(),
            status: StateContainer::default(),
        }
    }

    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    pub fn status(&self) -> Arc<OperationStatus> {
        self.status.snapshot()
    }

    pub fn watch_status(&self) -> watch::Receiver<Arc<OperationStatus>> {
        self.status.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.status.snapshot().busy
    }

    /// Settle the pending operation as cancelled and refuse new ones
    pub fn dispose(&self) {
        debug!("store disposed");
        self.disposer.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer.is_disposed()
    }

    /// Submit one correlated operation.
    ///
    /// `build` receives the fresh call id and returns the message to send;
    /// its errors settle the operation through `on_failure`. Returns `Err`
    /// only when nothing was attempted (busy or disposed).
    pub async fn execute<S, F, B, Fut>(
        &self,
        request: OperationRequest,
        build: B,
        callbacks: TransactionCallbacks<S, F>,
    ) -> Result<OperationOutcome<S, F>, DexError>
    where
        S: DeserializeOwned,
        F: DeserializeOwned,
        B: FnOnce(CorrelationId) -> Fut,
        Fut: Future<Output = Result<OutgoingMessage, DexError>>,
    {
        if self.disposer.is_disposed() {
            return Err(DexError::Disposed);
        }
        let OperationRequest { spec, watched, summary } = request;
        let call_id = CorrelationId::generate();

        let acquired = self.status.update_if(|status| {
            if status.busy {
                return false;
            }
            *status = OperationStatus {
                phase: OperationPhase::AwaitingSubmission,
                busy: true,
                operation: Some(spec.name),
                call_id: Some(call_id.clone()),
            };
            true
        });
        if !acquired {
            warn!("⚠️ {} rejected: another operation is in progress", spec.name);
            return Err(DexError::Busy);
        }
        let _busy = BusyGuard { status: &self.status };
        let TransactionCallbacks {
            on_send,
            on_success,
            on_failure,
        } = callbacks;
        info!("🚀 {} [{}]: {}", spec.name, call_id, summary);

        let outcome = match build(call_id.clone()).await {
            Err(error) => {
                warn!("⚠️ {} [{}] could not be prepared: {}", spec.name, call_id, error);
                OperationOutcome::Failed(OperationFailure::Preparation(error.to_string()))
            }
            Ok(message) => {
                match CorrelatedOperation::<S, F>::open(self.ctx.provider.clone(), &watched, spec, call_id.clone()).await {
                    Err(error) => OperationOutcome::Failed(OperationFailure::Submission(error)),
                    Ok(operation) => {
                        let operation = operation
                            .with_deadline(self.ctx.settings.confirmation_timeout)
                            .with_dispose_signal(self.disposer.signal());
                        let send = self.ctx.provider.send_delayed(message);
                        operation
                            .run(send, |delayed| {
                                let receipt =
                                    self.ctx
                                        .receipts
                                        .record(&call_id, spec.name, &delayed.message_hash, &summary);
                                self.status
                                    .update(|status| status.phase = OperationPhase::AwaitingConfirmation);
                                info!("📨 {} [{}] accepted by wallet: {}", spec.name, call_id, delayed.message_hash);
                                if let Some(callback) = on_send {
                                    callback(&receipt);
                                }
                            })
                            .await
                    }
                }
            }
        };

        match outcome {
            OperationOutcome::Succeeded(payload) => {
                self.ctx.receipts.settle(&call_id, ReceiptStatus::Succeeded);
                self.status.update(|status| status.phase = OperationPhase::Succeeded);
                self.ctx
                    .notifications
                    .publish(&call_id, spec.name, NotificationKind::Success, summary);
                info!("✅ {} [{}] confirmed", spec.name, call_id);
                if let Some(callback) = on_success {
                    callback(&payload);
                }
                Ok(OperationOutcome::Succeeded(payload))
            }
            OperationOutcome::Failed(reason) => {
                self.ctx.receipts.settle(&call_id, ReceiptStatus::Failed);
                self.status.update(|status| status.phase = OperationPhase::Failed);
                let message = reason.to_string();
                if !self.disposer.is_disposed() {
                    self.ctx
                        .notifications
                        .publish(&call_id, spec.name, NotificationKind::Failure, message.clone());
                }
                warn!("❌ {} [{}] failed: {}", spec.name, call_id, message);
                let report = FailureReport {
                    call_id,
                    operation: spec.name,
                    message,
                    reason,
                };
                if let Some(callback) = on_failure {
                    callback(&report);
                }
                Ok(OperationOutcome::Failed(report.reason))
            }
            OperationOutcome::Abandoned => {
                self.status.update(|status| status.phase = OperationPhase::Abandoned);
                info!("🚫 {} [{}] abandoned by user", spec.name, call_id);
                Ok(OperationOutcome::Abandoned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::context::OperationSettings;
    use crate::domain::correlation::{CallbackMethods, FunctionCall};
    use crate::infrastructure::provider::MemoryProvider;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const PING: OperationSpec = OperationSpec::new("ping", CallbackMethods::new(&["pong"], &["pongFailed"]));

    #[derive(Debug, Deserialize)]
    struct Pong {}

    fn address(byte: &str) -> Address {
        format!("0:{}", byte.repeat(32)).parse().unwrap()
    }

    fn orchestrator(provider: Arc<MemoryProvider>) -> Orchestrator {
        let settings = OperationSettings {
            confirmation_timeout: Some(Duration::from_secs(5)),
            ..OperationSettings::default()
        };
        Orchestrator::new(StoreContext::new(provider, address("01"), settings))
    }

    fn request() -> OperationRequest {
        OperationRequest {
            spec: PING,
            watched: address("01"),
            summary: "ping".to_string(),
        }
    }

    fn ping(call_id: CorrelationId) -> OutgoingMessage {
        OutgoingMessage {
            sender: address("01"),
            recipient: address("02"),
            amount: 0,
            bounce: true,
            call: FunctionCall::new("ping", json!({ "id": call_id.as_str() })),
        }
    }

    #[tokio::test]
    async fn test_success_settles_receipt_and_notifies() {
        let provider = Arc::new(MemoryProvider::new());
        provider.on_send(&address("02"), |provider, message| {
            let id = message.call.input["id"].clone();
            provider.callback(&message.sender, Some(&message.recipient), "pong", json!({ "id": id }));
        });
        let orchestrator = orchestrator(provider);
        let mut phases = orchestrator.watch_status();
        let successes = Arc::new(AtomicUsize::new(0));
        let counter = successes.clone();

        let outcome = orchestrator
            .execute(
                request(),
                |call_id| async move { Ok(ping(call_id)) },
                TransactionCallbacks::<Pong, Pong>::new().on_success(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        let status = orchestrator.status();
        assert_eq!(status.phase, OperationPhase::Succeeded);
        assert!(!status.busy);
        let receipts = orchestrator.context().receipts.list();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].status, ReceiptStatus::Succeeded);
        assert_eq!(orchestrator.context().notifications.count(), 1);
        assert!(phases.has_changed().unwrap());
        assert_eq!(phases.borrow_and_update().phase, OperationPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_preparation_error_goes_to_failure_callback() {
        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = orchestrator(provider.clone());
        let failures = Arc::new(AtomicUsize::new(0));
        let counter = failures.clone();

        let outcome = orchestrator
            .execute(
                request(),
                |_| async { Err(DexError::CannotComputeExpectedAmount("no getter".to_string())) },
                TransactionCallbacks::<Pong, Pong>::new().on_failure(move |report| {
                    assert!(report.message.contains("no getter"));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, OperationOutcome::Failed(OperationFailure::Preparation(_))));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(provider.sent_messages().is_empty());
        assert_eq!(provider.registry().active_count(), 0);
    }

    #[tokio::test]
    async fn test_second_submission_while_busy_is_rejected() {
        let provider = Arc::new(MemoryProvider::new());
        let orchestrator = Arc::new(orchestrator(provider));

        let pending = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .execute(request(), |call_id| async move { Ok(ping(call_id)) }, TransactionCallbacks::<Pong, Pong>::new())
                    .await
            })
        };
        while !orchestrator.is_busy() {
            tokio::task::yield_now().await;
        }

        let second = orchestrator
            .execute(request(), |call_id| async move { Ok(ping(call_id)) }, TransactionCallbacks::<Pong, Pong>::new())
            .await;
        assert!(matches!(second, Err(DexError::Busy)));

        orchestrator.dispose();
        let first = pending.await.unwrap().unwrap();
        assert!(matches!(first, OperationOutcome::Failed(OperationFailure::Cancelled)));
        assert!(!orchestrator.is_busy());
        assert_eq!(orchestrator.context().notifications.count(), 0);

        let after = orchestrator
            .execute(request(), |call_id| async move { Ok(ping(call_id)) }, TransactionCallbacks::<Pong, Pong>::new())
            .await;
        assert!(matches!(after, Err(DexError::Disposed)));
    }
}
