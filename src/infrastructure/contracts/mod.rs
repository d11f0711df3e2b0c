//! Typed wrappers over contract getters and message builders

pub mod dex;
pub mod farming;
pub mod gauge;
pub mod order;
pub mod pair;
pub mod token;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::infrastructure::provider::WalletProvider;
use crate::shared::errors::DexError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

pub use dex::{DexAccountContract, DexRootContract, DepositLiquidityParams};
pub use farming::{FarmPoolContract, FarmPoolDetails, FarmUserDetails, FarmUserDataContract};
pub use gauge::{GaugeContract, GaugeDepositParams, GaugeDetails};
pub use order::{CreateOrderParams, OrderContract, OrderDetails, OrderFactoryContract, OrderRootContract, OrderState};
pub use pair::{
    CrossExchangePayloadParams, CrossExchangeStep, ExchangePayloadParams, ExpectedExchange, FeeParams, PairBalances,
    PairContract, PairSnapshot, TokenRoots, WithdrawPayloadParams,
};
pub use token::{TokenRootContract, TokenWalletContract, TransferParams};

/// Getters answer under a single `value0` output
#[derive(Debug, Clone, Deserialize)]
pub struct Value0<T> {
    pub value0: T,
}

/// uint128 value as the ABI encodes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uint128(#[serde(with = "u128_string")] pub u128);

/// Run `method` on `contract` and decode its outputs into `T`
pub(crate) async fn call_typed<T: DeserializeOwned>(
    provider: &dyn WalletProvider,
    contract: &Address,
    method: &str,
    input: Value,
) -> Result<T, DexError> {
    let output = provider.call(contract, method, input).await?;
    serde_json::from_value(output).map_err(|e| DexError::UnexpectedResponse(format!("{}: {}", method, e)))
}
