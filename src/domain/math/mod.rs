//! Swap and liquidity math

pub mod constant_product;
pub mod liquidity;
pub mod route;

pub use constant_product::{min_expected_amount, validate_slippage, ConstantProductMath, Fee, PoolState};
pub use liquidity::{expected_lp_reward, mul_div, withdraw_share, WithdrawShare};
pub use route::{PairLiquidity, RouteHop, RouteQuote, SwapRoute, TokenGraph, DEFAULT_MAX_HOPS};
