//! Concrete stores: one orchestrator each, plus the reads that feed it

pub mod farming;
pub mod gauges;
pub mod limit_orders;
pub mod liquidity;
pub mod swap;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::correlation::CorrelationId;
use crate::shared::errors::DexError;
use crate::shared::utils::to_base_units;

pub use farming::FarmingStore;
pub use gauges::GaugeStore;
pub use limit_orders::{LimitOrderFilter, LimitOrderStore};
pub use liquidity::LiquidityStore;
pub use swap::SwapStore;

/// Failure callback that carries nothing but the echoed id
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationCancelled {}

/// Numeric form of a generated call id, for payloads typed as integers
pub(crate) fn numeric_id(call_id: &CorrelationId) -> Result<u64, DexError> {
    call_id
        .as_u64()
        .ok_or_else(|| DexError::UnexpectedResponse(format!("call id {} is not numeric", call_id)))
}

/// Base units of a strictly positive token amount
pub(crate) fn positive_amount(amount: Decimal, decimals: u8) -> Result<u128, DexError> {
    if amount <= Decimal::ZERO {
        return Err(DexError::InvalidAmount(amount.to_string()));
    }
    match to_base_units(amount, decimals)? {
        0 => Err(DexError::InvalidAmount(amount.to_string())),
        value => Ok(value),
    }
}
