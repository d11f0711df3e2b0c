mod common;

use std::sync::Arc;
use std::time::Duration;

use flatdex::application::orchestrator::{OperationRequest, Orchestrator, TransactionCallbacks};
use flatdex::domain::correlation::{
    CallbackMethods, CorrelatedOperation, CorrelationId, OperationFailure, OperationOutcome, OperationSpec,
};
use flatdex::infrastructure::provider::{MemoryProvider, WalletProvider};
use flatdex::infrastructure::simulation::synthetic_address;
use flatdex::shared::errors::{DexError, ProviderError};
use flatdex::shared::types::Address;
use serde::Deserialize;
use serde_json::json;

use common::{message, settings, Counter};

const PING: OperationSpec = OperationSpec::new("ping", CallbackMethods::new(&["pingSuccess"], &["pingFailed"]));

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Pong {
    value: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct PingFailed {
    reason: String,
}

fn wallet() -> Address {
    synthetic_address(1)
}

fn target() -> Address {
    synthetic_address(2)
}

/// Reply to every `ping` with a success callback echoing the id and value
fn echo_pings(provider: &MemoryProvider) {
    provider.on_send(&target(), |provider, message| {
        let id = message.call.input["id"].clone();
        let value = id.as_str().and_then(|id| id.parse::<u64>().ok()).unwrap_or_default() % 1000;
        provider.callback(&message.sender, Some(&message.recipient), "pingSuccess", json!({ "id": id, "value": value }));
    });
}

fn orchestrator(provider: Arc<MemoryProvider>) -> Orchestrator {
    Orchestrator::new(flatdex::application::StoreContext::new(provider, wallet(), settings()))
}

fn request() -> OperationRequest {
    OperationRequest {
        spec: PING,
        watched: wallet(),
        summary: "ping".to_string(),
    }
}

async fn open(provider: &Arc<MemoryProvider>, id: u64) -> CorrelatedOperation<Pong, PingFailed> {
    let provider: Arc<dyn WalletProvider> = provider.clone();
    CorrelatedOperation::open(provider, &wallet(), PING, CorrelationId::from(id))
        .await
        .unwrap()
        .with_deadline(Some(Duration::from_secs(5)))
}

#[tokio::test]
async fn test_concurrent_operations_resolve_with_their_own_callbacks() {
    let provider = Arc::new(MemoryProvider::new());
    echo_pings(&provider);

    let first = open(&provider, 1_001).await;
    let second = open(&provider, 2_002).await;
    assert_eq!(provider.registry().active_for(&wallet()), 2);

    let (first, second) = tokio::join!(
        first.run(provider.send_delayed(message(&wallet(), &target(), "ping", 1_001)), |_| {}),
        second.run(provider.send_delayed(message(&wallet(), &target(), "ping", 2_002)), |_| {}),
    );

    assert_eq!(first, OperationOutcome::Succeeded(Pong { value: 1 }));
    assert_eq!(second, OperationOutcome::Succeeded(Pong { value: 2 }));
    assert_eq!(provider.registry().active_count(), 0);
}

#[tokio::test]
async fn test_duplicate_callbacks_fire_continuations_once() {
    let provider = Arc::new(MemoryProvider::new());
    provider.on_send(&target(), |provider, message| {
        let id = message.call.input["id"].clone();
        for _ in 0..2 {
            provider.callback(&message.sender, None, "pingSuccess", json!({ "id": id.clone(), "value": 7 }));
        }
    });
    let store = orchestrator(provider.clone());
    let successes = Counter::default();
    let failures = Counter::default();

    let outcome = {
        let (successes, failures) = (successes.clone(), failures.clone());
        store
            .execute(
                request(),
                |call_id| async move { Ok::<_, DexError>(message(&wallet(), &target(), "ping", call_id.as_u64().unwrap_or_default())) },
                TransactionCallbacks::<Pong, PingFailed>::new()
                    .on_success(move |_| successes.hit())
                    .on_failure(move |_| failures.hit()),
            )
            .await
            .unwrap()
    };

    assert_eq!(outcome, OperationOutcome::Succeeded(Pong { value: 7 }));
    // A late duplicate has nobody left to deliver to
    let late = provider.callback(&wallet(), None, "pingSuccess", json!({ "id": "1", "value": 7 }));
    assert_eq!(provider.emit(late), 0);
    assert_eq!(successes.get(), 1);
    assert_eq!(failures.get(), 0);
    assert_eq!(store.context().notifications.count(), 1);
}

#[tokio::test]
async fn test_user_rejection_is_silent_and_releases_subscription() {
    let provider = Arc::new(MemoryProvider::new());
    provider.fail_next_send(ProviderError::user_rejected());
    let store = orchestrator(provider.clone());
    let failures = Counter::default();

    let outcome = {
        let failures = failures.clone();
        store
            .execute(
                request(),
                |call_id| async move { Ok::<_, DexError>(message(&wallet(), &target(), "ping", call_id.as_u64().unwrap_or_default())) },
                TransactionCallbacks::<Pong, PingFailed>::new().on_failure(move |_| failures.hit()),
            )
            .await
            .unwrap()
    };

    assert_eq!(outcome, OperationOutcome::Abandoned);
    assert_eq!(failures.get(), 0);
    assert_eq!(store.context().notifications.count(), 0);
    assert!(store.context().receipts.is_empty());
    assert_eq!(provider.registry().active_count(), 0);
    assert!(!store.is_busy());
}

#[tokio::test]
async fn test_send_error_reports_raw_message_once() {
    let provider = Arc::new(MemoryProvider::new());
    provider.fail_next_send(ProviderError::new(7, "message expired"));
    let store = orchestrator(provider.clone());
    let failures = Counter::default();
    let reported = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let outcome = {
        let (failures, reported) = (failures.clone(), reported.clone());
        store
            .execute(
                request(),
                |call_id| async move { Ok::<_, DexError>(message(&wallet(), &target(), "ping", call_id.as_u64().unwrap_or_default())) },
                TransactionCallbacks::<Pong, PingFailed>::new().on_failure(move |report| {
                    failures.hit();
                    reported.lock().push(report.message.clone());
                }),
            )
            .await
            .unwrap()
    };

    match outcome {
        OperationOutcome::Failed(OperationFailure::Submission(error)) => assert_eq!(error.code, 7),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(failures.get(), 1);
    assert_eq!(reported.lock().as_slice(), ["message expired".to_string()]);
    assert_eq!(provider.registry().active_count(), 0);
}

#[tokio::test]
async fn test_failure_callback_carries_decoded_rejection() {
    let provider = Arc::new(MemoryProvider::new());
    provider.on_send(&target(), |provider, message| {
        let id = message.call.input["id"].clone();
        provider.callback(&message.sender, None, "pingFailed", json!({ "id": id, "reason": "slippage" }));
    });
    let store = orchestrator(provider.clone());
    let rejection = Arc::new(parking_lot::Mutex::new(None));

    {
        let rejection = rejection.clone();
        store
            .execute(
                request(),
                |call_id| async move { Ok::<_, DexError>(message(&wallet(), &target(), "ping", call_id.as_u64().unwrap_or_default())) },
                TransactionCallbacks::<Pong, PingFailed>::new()
                    .on_failure(move |report| *rejection.lock() = report.rejection().cloned()),
            )
            .await
            .unwrap();
    }

    assert_eq!(
        rejection.lock().clone(),
        Some(PingFailed {
            reason: "slippage".to_string()
        })
    );
    assert_eq!(store.context().notifications.count(), 1);
}

#[tokio::test]
async fn test_unlisted_method_with_matching_id_does_not_resolve() {
    let provider = Arc::new(MemoryProvider::new());
    provider.on_send(&target(), |provider, message| {
        let id = message.call.input["id"].clone();
        provider.callback(&message.sender, None, "pingAudited", json!({ "id": id, "value": 1 }));
    });
    let operation = open(&provider, 5_005)
        .await
        .with_deadline(Some(Duration::from_millis(100)));

    let outcome = operation
        .run(provider.send_delayed(message(&wallet(), &target(), "ping", 5_005)), |_| {})
        .await;

    assert_eq!(outcome, OperationOutcome::Failed(OperationFailure::TimedOut));
    assert_eq!(provider.registry().active_count(), 0);
}

#[tokio::test]
async fn test_double_unsubscribe_is_isolated() {
    let provider = MemoryProvider::new();
    let first = provider.registry().subscribe(&wallet());
    let mut second = provider.registry().subscribe(&wallet());

    assert!(first.handle.unsubscribe());
    assert!(!first.handle.unsubscribe());
    assert!(!first.handle.is_active());
    assert!(second.handle.is_active());
    assert_eq!(provider.registry().active_for(&wallet()), 1);

    provider.callback(&wallet(), None, "pingSuccess", json!({ "id": "1", "value": 1 }));
    let delivered = second.receiver.recv().await.unwrap();
    assert_eq!(delivered.account, wallet());
}
