mod common;

use flatdex::application::stores::liquidity::{DepositRequest, LiquidityStore, WithdrawRequest};
use flatdex::application::stores::OperationCancelled;
use flatdex::application::TransactionCallbacks;
use flatdex::domain::correlation::{OperationFailure, OperationOutcome};
use flatdex::shared::errors::DexError;
use rust_decimal_macros::dec;

use common::{market, Counter, Market};

fn deposit_request(market: &Market) -> DepositRequest {
    DepositRequest {
        left: market.usdt.clone(),
        right: market.qube.clone(),
        left_amount: dec!(20),
        right_amount: dec!(10),
        auto_change: false,
    }
}

#[tokio::test]
async fn test_withdraw_share_of_loaded_pool() {
    let market = market();
    let lp_root = market.dex.lp_root(&market.pair).unwrap();
    market.dex.mint(&lp_root, &market.wallet, 100_000);
    market.dex.set_reserves(&market.pair, 500_000, 2_000_000, 1_000_000);

    let store = LiquidityStore::new(market.ctx.clone(), market.dex.dex_root().clone());
    let pool = store.load_pool(&market.qube, &market.usdt).await.unwrap();
    let share = store.withdraw_share(&pool, pool.lp_balance).unwrap();

    assert_eq!(share.left, 50_000);
    assert_eq!(share.right, 200_000);
    assert_eq!(share.percent, dec!(10));
    assert_eq!(pool.share, Some(share));
}

#[tokio::test]
async fn test_deposit_then_withdraw_round() {
    let market = market();
    market.dex.deploy_account(&market.wallet);
    market.dex.account_deposit(&market.wallet, &market.qube.root, 10_000_000_000);
    market.dex.account_deposit(&market.wallet, &market.usdt.root, 20_000_000_000);
    let store = LiquidityStore::new(market.ctx.clone(), market.dex.dex_root().clone());
    let lp_root = market.dex.lp_root(&market.pair).unwrap();
    let pool = store.load_pool(&market.qube, &market.usdt).await.unwrap();
    let estimate = store
        .estimate_lp_reward(&pool, 10_000_000_000, 20_000_000_000)
        .unwrap();

    let deposited = store
        .deposit(deposit_request(&market), TransactionCallbacks::new())
        .await
        .unwrap();
    let reward = match deposited {
        OperationOutcome::Succeeded(success) => {
            // Amounts come back in the pair's own order
            assert_eq!(success.result.left, 10_000_000_000);
            assert_eq!(success.result.right, 20_000_000_000);
            success.result.lp_reward
        }
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(reward, 20_000_000_000);
    assert_eq!(reward, estimate);
    assert_eq!(market.ctx.cached_balance(&lp_root), Some(reward));
    assert_eq!(store.state().pool.as_ref().map(|pool| pool.lp_balance), Some(reward));

    let withdrawn = store
        .withdraw(
            WithdrawRequest {
                left: market.qube.clone(),
                right: market.usdt.clone(),
                lp_amount: None,
                slippage: Some(dec!(0.5)),
            },
            TransactionCallbacks::new(),
        )
        .await
        .unwrap();
    match withdrawn {
        OperationOutcome::Succeeded(success) => {
            assert_eq!(success.result.lp, reward);
            assert_eq!(success.result.left, 10_000_000_000);
            assert_eq!(success.result.right, 20_000_000_000);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(market.dex.balance(&lp_root, &market.wallet), 0);
    assert_eq!(market.dex.balance(&market.usdt.root, &market.wallet), 20_000_000_000);
    assert_eq!(market.ctx.notifications.count(), 2);
    assert_eq!(market.provider.registry().active_count(), 0);
}

#[tokio::test]
async fn test_deposit_requires_deployed_account() {
    let market = market();
    let store = LiquidityStore::new(market.ctx.clone(), market.dex.dex_root().clone());

    let result = store.deposit(deposit_request(&market), TransactionCallbacks::new()).await;
    assert!(matches!(result, Err(DexError::DexAccountNotDeployed(_))));
    assert!(market.provider.sent_messages().is_empty());
}

#[tokio::test]
async fn test_deposit_checks_account_balances() {
    let market = market();
    market.dex.deploy_account(&market.wallet);
    market.dex.account_deposit(&market.wallet, &market.qube.root, 10_000_000_000);
    let store = LiquidityStore::new(market.ctx.clone(), market.dex.dex_root().clone());

    let result = store.deposit(deposit_request(&market), TransactionCallbacks::new()).await;
    assert_eq!(result, Err(DexError::InsufficientBalance));
}

#[tokio::test]
async fn test_withdraw_rejected_by_pair_reaches_failure_callback() {
    let market = market();
    let lp_root = market.dex.lp_root(&market.pair).unwrap();
    market.dex.mint(&lp_root, &market.wallet, 1_000_000_000);
    let store = LiquidityStore::new(market.ctx.clone(), market.dex.dex_root().clone());
    // Getter overstates what the pair pays out
    market
        .provider
        .on_contract_call(&market.pair, "expectedWithdrawLiquidity", |_, _| {
            Ok(serde_json::json!({
                "expected_left_amount": "999999999999",
                "expected_right_amount": "999999999999",
            }))
        });
    let failures = Counter::default();

    let outcome = {
        let failures = failures.clone();
        store
            .withdraw(
                WithdrawRequest {
                    left: market.qube.clone(),
                    right: market.usdt.clone(),
                    lp_amount: Some(dec!(1)),
                    slippage: None,
                },
                TransactionCallbacks::new().on_failure(move |_| failures.hit()),
            )
            .await
            .unwrap()
    };

    assert_eq!(outcome, OperationOutcome::Failed(OperationFailure::Rejected(OperationCancelled {})));
    assert_eq!(failures.get(), 1);
    assert_eq!(market.dex.balance(&lp_root, &market.wallet), 1_000_000_000);
}
