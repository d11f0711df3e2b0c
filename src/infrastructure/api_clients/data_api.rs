use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::DataApi;
use crate::infrastructure::contracts::OrderState;
use crate::shared::config::ApiConfig;
use crate::shared::errors::ApiError;
use crate::shared::serde_utils::u128_string;
use crate::shared::types::Address;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrenciesRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub currency_addresses: Vec<Address>,
    pub limit: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyInfo {
    pub address: Address,
    pub currency: String,
    pub price: Decimal,
    #[serde(default)]
    pub price_change: Decimal,
    #[serde(default)]
    pub tvl: Decimal,
    #[serde(default, rename = "volume24h")]
    pub volume_24h: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrenciesResponse {
    pub currencies: Vec<CurrencyInfo>,
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmingPoolsRequest {
    pub limit: u32,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_address: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmingPoolInfo {
    pub pool_address: Address,
    pub left_address: Option<Address>,
    pub right_address: Option<Address>,
    pub tvl: Decimal,
    pub apr: Decimal,
    #[serde(default)]
    pub share: Option<Decimal>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmingPoolsResponse {
    pub pools_info: Vec<FarmingPoolInfo>,
    pub total_count: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrdersRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Address>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<OrderState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spent_token_root: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_token_root: Option<Address>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderInfo {
    pub address: Address,
    pub owner: Address,
    pub state: OrderState,
    pub spent_token_root: Address,
    pub receive_token_root: Address,
    #[serde(with = "u128_string")]
    pub spent_amount: u128,
    #[serde(with = "u128_string")]
    pub expected_amount: u128,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrdersResponse {
    pub orders: Vec<LimitOrderInfo>,
    pub total_count: u64,
}

/// HTTP client of the DEX indexer
pub struct DataApiClient {
    http_client: Client,
    base_url: String,
}

impl DataApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidUrl(config.base_url.clone()));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { http_client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("🔍 POST {}", url);

        let response = self.http_client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("⚠️ {} returned status {}", url, status);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DataApi for DataApiClient {
    async fn currencies(&self, request: &CurrenciesRequest) -> Result<CurrenciesResponse, ApiError> {
        self.post("/currencies", request).await
    }

    async fn farming_pools(&self, request: &FarmingPoolsRequest) -> Result<FarmingPoolsResponse, ApiError> {
        self.post("/farming/pools", request).await
    }

    async fn limit_orders(&self, request: &LimitOrdersRequest) -> Result<LimitOrdersResponse, ApiError> {
        self.post("/limit-orders", request).await
    }
}
