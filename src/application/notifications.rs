//! Outcome notifications published by the stores

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::correlation::CorrelationId;
use crate::shared::utils::generate_id;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub call_id: CorrelationId,
    pub operation: &'static str,
    pub kind: NotificationKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Broadcast of settled operations with a short history for late readers
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
    history: Arc<Mutex<VecDeque<Notification>>>,
    capacity: usize,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn publish(
        &self,
        call_id: &CorrelationId,
        operation: &'static str,
        kind: NotificationKind,
        message: impl Into<String>,
    ) -> Notification {
        let notification = Notification {
            id: generate_id(),
            call_id: call_id.clone(),
            operation,
            kind,
            message: message.into(),
            at: Utc::now(),
        };
        {
            let mut history = self.history.lock();
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }
        // No receivers is fine, the history keeps it
        let receivers = self.sender.send(notification.clone()).unwrap_or(0);
        debug!(operation, kind = ?kind, receivers, "notification published");
        notification
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Published notifications, oldest first
    pub fn recent(&self) -> Vec<Notification> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.history.lock().len()
    }
}
