//! Application layer - stores, orchestration and CLI commands

pub mod caches;
pub mod commands;
pub mod context;
pub mod notifications;
pub mod orchestrator;
pub mod receipts;
pub mod stores;

pub use commands::{Cli, CommandExecutor, Commands};
pub use context::{OperationSettings, StoreContext};
pub use notifications::{Notification, NotificationBus, NotificationKind};
pub use orchestrator::{FailureReport, OperationPhase, OperationStatus, Orchestrator, TransactionCallbacks};
pub use receipts::{Receipt, ReceiptBook, ReceiptStatus};
