//! Read-only REST clients for indexed DEX data

pub mod data_api;

use async_trait::async_trait;

use crate::shared::errors::ApiError;

pub use data_api::{
    CurrenciesRequest, CurrenciesResponse, CurrencyInfo, DataApiClient, FarmingPoolInfo, FarmingPoolsRequest,
    FarmingPoolsResponse, LimitOrderInfo, LimitOrdersRequest, LimitOrdersResponse,
};

/// Indexer endpoints the stores read from
#[async_trait]
pub trait DataApi: Send + Sync {
    async fn currencies(&self, request: &CurrenciesRequest) -> Result<CurrenciesResponse, ApiError>;

    async fn farming_pools(&self, request: &FarmingPoolsRequest) -> Result<FarmingPoolsResponse, ApiError>;

    async fn limit_orders(&self, request: &LimitOrdersRequest) -> Result<LimitOrdersResponse, ApiError>;
}
