#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flatdex::application::{OperationSettings, StoreContext};
use flatdex::domain::math::Fee;
use flatdex::infrastructure::provider::{MemoryProvider, OutgoingMessage};
use flatdex::infrastructure::simulation::{synthetic_address, DexSimulator};
use flatdex::shared::types::{Address, Token};
use flatdex::domain::correlation::FunctionCall;
use serde_json::json;

pub const QUBE_RESERVE: u128 = 1_000_000_000_000;
pub const USDT_RESERVE: u128 = 2_000_000_000_000;

pub fn wallet() -> Address {
    synthetic_address(900)
}

pub fn settings() -> OperationSettings {
    OperationSettings {
        confirmation_timeout: Some(Duration::from_secs(5)),
        ..OperationSettings::default()
    }
}

/// In-memory DEX with a QUBE/USDT pair and a funded wallet
pub struct Market {
    pub provider: Arc<MemoryProvider>,
    pub dex: DexSimulator,
    pub qube: Token,
    pub usdt: Token,
    pub pair: Address,
    pub wallet: Address,
    pub ctx: StoreContext,
}

pub fn market() -> Market {
    let provider = Arc::new(MemoryProvider::new());
    let dex = DexSimulator::new(provider.clone());
    let qube = dex.add_token("QUBE", 9);
    let usdt = dex.add_token("USDT", 9);
    let pair = dex.add_pair(&qube, &usdt, QUBE_RESERVE, USDT_RESERVE, Fee::ZERO);
    let wallet = wallet();
    dex.mint(&qube.root, &wallet, 100_000_000_000);
    let ctx = StoreContext::new(provider.clone(), wallet.clone(), settings());
    Market {
        provider,
        dex,
        qube,
        usdt,
        pair,
        wallet,
        ctx,
    }
}

/// Plain message from the wallet calling `method` on `recipient`
pub fn message(sender: &Address, recipient: &Address, method: &str, id: u64) -> OutgoingMessage {
    OutgoingMessage {
        sender: sender.clone(),
        recipient: recipient.clone(),
        amount: 1_000_000_000,
        bounce: true,
        call: FunctionCall::new(method, json!({ "id": id.to_string() })),
    }
}

/// Counts how many times a callback fired
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
