//! Account transaction subscriptions shared by provider implementations

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::correlation::RawTransaction;
use crate::shared::types::Address;

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

struct Entry {
    account: Address,
    sender: mpsc::UnboundedSender<RawTransaction>,
}

/// Fan-out of account transactions to live subscriptions
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, account: &Address) -> TransactionSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.entries.insert(
                id,
                Entry {
                    account: account.clone(),
                    sender,
                },
            );
            id
        };
        debug!(subscription = id, account = %account, "subscribed");

        TransactionSubscription {
            handle: SubscriptionHandle {
                id,
                account: account.clone(),
                registry: Arc::downgrade(&self.state),
                active: AtomicBool::new(true),
            },
            receiver,
        }
    }

    /// Deliver a transaction to every subscription on its account.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn publish(&self, transaction: &RawTransaction) -> usize {
        let mut state = self.state.lock();
        let mut delivered = 0;
        state.entries.retain(|_, entry| {
            if entry.account != transaction.account {
                return true;
            }
            match entry.sender.send(transaction.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn active_for(&self, account: &Address) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| &entry.account == account)
            .count()
    }
}

/// Owning handle of one subscription. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    id: u64,
    account: Address,
    registry: Weak<Mutex<RegistryState>>,
    active: AtomicBool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Release the subscription. Safe to call any number of times; only the
    /// first call has an effect and only on this subscription.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(state) = self.registry.upgrade() {
            state.lock().entries.remove(&self.id);
        }
        debug!(subscription = self.id, account = %self.account, "unsubscribed");
        true
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Live subscription: the handle plus the stream of raw transactions
pub struct TransactionSubscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::UnboundedReceiver<RawTransaction>,
}
