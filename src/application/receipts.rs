//! Receipts of messages accepted by the wallet, keyed by call id

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::correlation::CorrelationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiptStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: Uuid,
    pub call_id: CorrelationId,
    pub operation: &'static str,
    pub message_hash: String,
    pub summary: String,
    pub status: ReceiptStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Settled receipts kept before the oldest are dropped
pub const DEFAULT_SETTLED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Entries {
    receipts: HashMap<CorrelationId, Receipt>,
    settled: VecDeque<CorrelationId>,
}

/// Pending receipts are always kept; settled ones are bounded by `capacity`
pub struct ReceiptBook {
    entries: RwLock<Entries>,
    capacity: usize,
}

impl Default for ReceiptBook {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SETTLED_CAPACITY)
    }
}

impl ReceiptBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(
        &self,
        call_id: &CorrelationId,
        operation: &'static str,
        message_hash: &str,
        summary: &str,
    ) -> Receipt {
        let receipt = Receipt {
            id: Uuid::new_v4(),
            call_id: call_id.clone(),
            operation,
            message_hash: message_hash.to_string(),
            summary: summary.to_string(),
            status: ReceiptStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        };
        let mut entries = self.entries.write();
        let replaced = entries.receipts.insert(call_id.clone(), receipt.clone());
        if matches!(replaced, Some(ref old) if old.status != ReceiptStatus::Pending) {
            entries.settled.retain(|id| id != call_id);
        }
        receipt
    }

    /// Mark a pending receipt settled; settled receipts keep their status
    pub fn settle(&self, call_id: &CorrelationId, status: ReceiptStatus) -> bool {
        let mut entries = self.entries.write();
        match entries.receipts.get_mut(call_id) {
            Some(receipt) if receipt.status == ReceiptStatus::Pending => {
                receipt.status = status;
                receipt.settled_at = Some(Utc::now());
            }
            _ => return false,
        }
        entries.settled.push_back(call_id.clone());
        while entries.settled.len() > self.capacity {
            if let Some(oldest) = entries.settled.pop_front() {
                entries.receipts.remove(&oldest);
            }
        }
        true
    }

    pub fn get(&self, call_id: &CorrelationId) -> Option<Receipt> {
        self.entries.read().receipts.get(call_id).cloned()
    }

    /// All receipts, newest first
    pub fn list(&self) -> Vec<Receipt> {
        let mut receipts: Vec<Receipt> = self.entries.read().receipts.values().cloned().collect();
        receipts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        receipts
    }

    pub fn len(&self) -> usize {
        self.entries.read().receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().receipts.is_empty()
    }
}
