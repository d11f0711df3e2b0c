//! Error handling for the application

use thiserror::Error;

/// Error reported by the wallet provider.
///
/// Every rejected provider request carries a numeric `code`. Code `3` is the
/// reserved "user rejected signing" sentinel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("provider error (code {code}): {message}")]
pub struct ProviderError {
    pub code: i32,
    pub message: String,
}

impl ProviderError {
    pub const USER_REJECTED: i32 = 3;
    pub const SUBSCRIPTION_FAILED: i32 = 1001;
    pub const METHOD_NOT_FOUND: i32 = 1002;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(Self::USER_REJECTED, "user rejected the request")
    }

    /// Abandonment is silent: no failure callback, no notification.
    pub fn is_user_rejected(&self) -> bool {
        self.code == Self::USER_REJECTED
    }
}

/// DEX-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DexError {
    #[error("Cannot compute expected amount: {0}")]
    CannotComputeExpectedAmount(String),

    #[error("Pool roots are not defined")]
    PoolRootsNotDefined,

    #[error("LP wallets not exist")]
    LpWalletsNotExist,

    #[error("DEX account is not deployed: {0}")]
    DexAccountNotDeployed(String),

    #[error("Tokens are not selected")]
    TokensNotSelected,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid slippage tolerance: {0}")]
    InvalidSlippage(String),

    #[error("Insufficient liquidity")]
    InsufficientLiquidity,

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Route not found")]
    RouteNotFound,

    #[error("Operation already in progress")]
    Busy,

    #[error("Store is disposed")]
    Disposed,

    #[error("Unexpected contract response: {0}")]
    UnexpectedResponse(String),

    #[error("Calculation failed: {0}")]
    Math(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// REST data API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid API base url: {0}")]
    InvalidUrl(String),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("DEX error: {0}")]
    Dex(#[from] DexError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Dex(DexError::Provider(err))
    }
}
