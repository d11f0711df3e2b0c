//! Decoded, cursor-bounded view of one account's transaction stream

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tracing::debug;

use super::event::TransactionEvent;
use crate::infrastructure::provider::{TransactionSubscription, WalletProvider};
use crate::shared::errors::ProviderError;
use crate::shared::types::Address;

/// Stream of whitelisted callback transactions on one account.
///
/// The subscription is taken in [`EventStreamFilter::open`], so transactions
/// produced by anything sent afterwards are never missed. Delivered events
/// have strictly increasing logical time and are always newer than the cursor
/// passed at open.
pub struct EventStreamFilter {
    provider: Arc<dyn WalletProvider>,
    account: Address,
    methods: Vec<&'static str>,
    cursor: Option<u64>,
    subscription: Option<TransactionSubscription>,
}

impl EventStreamFilter {
    pub async fn open(
        provider: Arc<dyn WalletProvider>,
        account: &Address,
        methods: Vec<&'static str>,
        since_lt: Option<u64>,
    ) -> Result<Self, ProviderError> {
        let subscription = provider.subscribe(account).await?;
        debug!(account = %account, ?methods, ?since_lt, "opened event filter");
        Ok(Self {
            provider,
            account: account.clone(),
            methods,
            cursor: since_lt,
            subscription: Some(subscription),
        })
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Logical time of the last delivered event, or the initial bound
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    pub fn is_closed(&self) -> bool {
        self.subscription.is_none()
    }

    /// Release the subscription; the stream ends afterwards
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.handle.unsubscribe();
        }
    }
}

impl Stream for EventStreamFilter {
    type Item = TransactionEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let subscription = match this.subscription.as_mut() {
                Some(subscription) => subscription,
                None => return Poll::Ready(None),
            };
            let transaction = match subscription.receiver.poll_recv(cx) {
                Poll::Ready(Some(transaction)) => transaction,
                Poll::Ready(None) => {
                    this.subscription = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            };

            if this.cursor.is_some_and(|cursor| transaction.lt <= cursor) {
                debug!(lt = transaction.lt, cursor = ?this.cursor, "skipping already processed transaction");
                continue;
            }
            match this.provider.decode_transaction(&transaction, &this.methods) {
                Some(event) => {
                    this.cursor = Some(event.lt);
                    return Poll::Ready(Some(event));
                }
                None => {
                    debug!(lt = transaction.lt, account = %this.account, "discarding undecodable transaction");
                }
            }
        }
    }
}

impl Drop for EventStreamFilter {
    fn drop(&mut self) {
        self.close();
    }
}
