//! Infrastructure layer - wallet provider, contract wrappers, HTTP data API and local storage

pub mod api_clients;
pub mod contracts;
pub mod preferences;
pub mod provider;
pub mod simulation;

pub use api_clients::{DataApi, DataApiClient};
pub use preferences::Preferences;
pub use provider::{MemoryProvider, WalletProvider};
pub use simulation::DexSimulator;
