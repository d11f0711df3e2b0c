//! Common types used across the application

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::shared::errors::DexError;

/// Account address in `workchain:hex` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(workchain: i8, account: [u8; 32]) -> Self {
        Self(format!("{}:{}", workchain, hex::encode(account)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn workchain(&self) -> i8 {
        self.0
            .split_once(':')
            .and_then(|(wc, _)| wc.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Address {
    type Err = DexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DexError::InvalidAddress(s.to_string());
        let (workchain, account) = s.trim().split_once(':').ok_or_else(invalid)?;
        let workchain: i8 = workchain.parse().map_err(|_| invalid())?;
        let bytes = hex::decode(account).map_err(|_| invalid())?;
        if bytes.len() != 32 {
            return Err(invalid());
        }
        Ok(Self(format!("{}:{}", workchain, hex::encode(bytes))))
    }
}

impl TryFrom<String> for Address {
    type Error = DexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub root: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(root: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            root,
            symbol: symbol.into(),
            decimals,
        }
    }
}
