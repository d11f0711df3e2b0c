//! Flatdex - DEX client stores over a correlated transaction protocol
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use application::{Orchestrator, StoreContext, TransactionCallbacks};
pub use domain::correlation::{CorrelatedOperation, CorrelationId, OperationOutcome, OperationSpec};
pub use infrastructure::{DexSimulator, MemoryProvider, WalletProvider};
pub use shared::errors::{AppError, DexError, ProviderError};
