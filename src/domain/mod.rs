//! Domain layer - correlation protocol, math and shared state primitives

pub mod cache;
pub mod correlation;
pub mod math;
pub mod state;

pub use cache::{Ticket, VersionedCache};
pub use state::StateContainer;
