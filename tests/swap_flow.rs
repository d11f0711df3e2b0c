mod common;

use flatdex::application::stores::swap::{SwapCancelled, SwapRequest, SwapStore, SwapSuccess};
use flatdex::application::{NotificationKind, OperationPhase, ReceiptStatus, TransactionCallbacks};
use flatdex::domain::correlation::{OperationFailure, OperationOutcome};
use flatdex::domain::math::{min_expected_amount, Fee};
use flatdex::shared::errors::{DexError, ProviderError};
use rust_decimal_macros::dec;
use serde_json::json;

use common::{market, Counter, Market};

async fn swap_store(market: &Market) -> SwapStore {
    let store = SwapStore::new(market.ctx.clone(), market.dex.dex_root().clone());
    store.register_pair(&market.qube, &market.usdt).await.unwrap();
    store
}

fn ten_qube(market: &Market) -> SwapRequest {
    SwapRequest {
        spent: market.qube.clone(),
        receive: market.usdt.clone(),
        amount: dec!(10),
        slippage: Some(dec!(0.5)),
    }
}

#[tokio::test]
async fn test_direct_swap_settles_balances_and_notifies() {
    let market = market();
    let store = swap_store(&market).await;
    let sent = Counter::default();
    let received = Counter::default();

    let callbacks = {
        let (sent, received) = (sent.clone(), received.clone());
        TransactionCallbacks::<SwapSuccess, SwapCancelled>::new()
            .on_send(move |_| sent.hit())
            .on_success(move |success| {
                assert_eq!(success.result.receive_amount, 19_801_980_198);
                received.hit();
            })
    };
    let outcome = store.swap(ten_qube(&market), callbacks).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!((sent.get(), received.get()), (1, 1));
    assert_eq!(market.dex.balance(&market.qube.root, &market.wallet), 90_000_000_000);
    assert_eq!(market.dex.balance(&market.usdt.root, &market.wallet), 19_801_980_198);
    assert_eq!(market.ctx.cached_balance(&market.usdt.root), Some(19_801_980_198));

    let notifications = market.ctx.notifications.recent();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Success);
    let receipts = market.ctx.receipts.list();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].status, ReceiptStatus::Succeeded);

    let status = store.orchestrator().status();
    assert_eq!(status.phase, OperationPhase::Succeeded);
    assert!(!status.busy);
    assert_eq!(market.provider.registry().active_count(), 0);
    assert!(store.state().last_result.is_some());
}

#[tokio::test]
async fn test_swap_quote_uses_pair_amounts() {
    let market = market();
    let store = swap_store(&market).await;

    let quote = store.quote(&ten_qube(&market)).await.unwrap();
    assert_eq!(quote.expected_amount, 19_801_980_198);
    assert_eq!(quote.min_expected_amount, 19_702_970_297);
    assert_eq!(quote.step_amounts, vec![19_801_980_198]);
}

#[tokio::test]
async fn test_abandoned_swap_leaves_no_trace() {
    let market = market();
    let store = swap_store(&market).await;
    market.provider.fail_next_send(ProviderError::user_rejected());
    let failures = Counter::default();

    let outcome = {
        let failures = failures.clone();
        store
            .swap(
                ten_qube(&market),
                TransactionCallbacks::new().on_failure(move |_| failures.hit()),
            )
            .await
            .unwrap()
    };

    assert_eq!(outcome, OperationOutcome::Abandoned);
    assert!(!store.orchestrator().is_busy());
    assert_eq!(store.orchestrator().status().phase, OperationPhase::Abandoned);
    assert_eq!(failures.get(), 0);
    assert_eq!(market.ctx.notifications.count(), 0);
    assert_eq!(market.provider.registry().active_count(), 0);
    assert_eq!(market.dex.balance(&market.qube.root, &market.wallet), 100_000_000_000);
}

#[tokio::test]
async fn test_swap_cancelled_when_pair_pays_less_than_minimum() {
    let market = market();
    let store = swap_store(&market).await;
    // The pair promises far more than it will pay
    market
        .provider
        .on_contract_call(&market.pair, "expectedExchange", |_, _| {
            Ok(json!({ "expected_amount": "30000000000", "expected_fee": "0" }))
        });
    let failures = Counter::default();

    let outcome = {
        let failures = failures.clone();
        store
            .swap(
                ten_qube(&market),
                TransactionCallbacks::new().on_failure(move |report| {
                    assert!(report.rejection().is_some());
                    failures.hit();
                }),
            )
            .await
            .unwrap()
    };

    assert_eq!(outcome, OperationOutcome::Failed(OperationFailure::Rejected(SwapCancelled::default())));
    assert_eq!(failures.get(), 1);
    assert_eq!(market.dex.balance(&market.qube.root, &market.wallet), 100_000_000_000);
    let notifications = market.ctx.notifications.recent();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Failure);
    assert_eq!(market.ctx.receipts.list()[0].status, ReceiptStatus::Failed);
}

#[tokio::test]
async fn test_cross_pair_swap_routes_through_intermediate_token() {
    let market = market();
    let wever = market.dex.add_token("WEVER", 9);
    let tip = market.dex.add_token("TIP", 6);
    market
        .dex
        .add_pair(&market.usdt, &wever, 1_000_000_000_000, 1_000_000_000_000, Fee::ZERO);
    market.dex.add_pair(&wever, &tip, 1_000_000_000_000, 1_000_000_000, Fee::ZERO);

    let store = swap_store(&market).await;
    store.register_pair(&market.usdt, &wever).await.unwrap();
    store.register_pair(&wever, &tip).await.unwrap();

    let request = SwapRequest {
        spent: market.qube.clone(),
        receive: tip.clone(),
        amount: dec!(10),
        slippage: Some(dec!(1)),
    };
    let quote = store.quote(&request).await.unwrap();
    assert_eq!(quote.route.hops.len(), 3);
    assert_eq!(quote.step_minimums.len(), 3);
    for (amount, minimum) in quote.step_amounts.iter().zip(&quote.step_minimums) {
        assert_eq!(*minimum, min_expected_amount(*amount, dec!(1)).unwrap());
    }
    assert_eq!(quote.min_expected_amount, quote.step_minimums[2]);

    let outcome = store.swap(request, TransactionCallbacks::new()).await.unwrap();
    match outcome {
        OperationOutcome::Succeeded(success) => {
            assert_eq!(success.result.receive_token, tip.root);
            assert_eq!(success.result.receive_amount, quote.expected_amount);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(market.dex.balance(&tip.root, &market.wallet), quote.expected_amount);
}

#[tokio::test]
async fn test_swap_checks_balance_before_sending() {
    let market = market();
    let store = swap_store(&market).await;
    let request = SwapRequest {
        amount: dec!(1000),
        ..ten_qube(&market)
    };

    assert_eq!(
        store.swap(request, TransactionCallbacks::new()).await,
        Err(DexError::InsufficientBalance)
    );
    assert!(market.provider.sent_messages().is_empty());
    assert!(!store.orchestrator().is_busy());
}

#[tokio::test]
async fn test_disposed_store_refuses_swaps() {
    let market = market();
    let store = swap_store(&market).await;
    store.dispose();

    assert_eq!(
        store.swap(ten_qube(&market), TransactionCallbacks::new()).await,
        Err(DexError::Disposed)
    );
}
