//! Raw account transactions and their decoded callback form

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::shared::types::Address;

/// Function invocation carried by a message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub method: String,
    pub input: Value,
}

impl FunctionCall {
    pub fn new(method: impl Into<String>, input: Value) -> Self {
        Self {
            method: method.into(),
            input,
        }
    }
}

/// Transaction as delivered by the account subscription, before decoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Logical time: the chain's total order for one account
    pub lt: u64,
    pub hash: String,
    pub account: Address,
    pub src: Option<Address>,
    pub body: Option<FunctionCall>,
    #[serde(default)]
    pub aborted: bool,
}

/// Decoded callback transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub lt: u64,
    pub hash: String,
    pub account: Address,
    pub method: String,
    pub input: Map<String, Value>,
}

impl TransactionEvent {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.input.get(name)
    }

    /// Deserialize the callback inputs into a typed payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.input.clone()))
    }
}

/// Which branch of an operation a callback method belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Success,
    Failure,
}

/// Whitelist of callback methods an operation waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackMethods {
    pub success: &'static [&'static str],
    pub failure: &'static [&'static str],
}

impl CallbackMethods {
    pub const fn new(success: &'static [&'static str], failure: &'static [&'static str]) -> Self {
        Self { success, failure }
    }

    pub fn all(&self) -> Vec<&'static str> {
        self.success.iter().chain(self.failure.iter()).copied().collect()
    }

    pub fn classify(&self, method: &str) -> Option<CallbackKind> {
        if self.success.contains(&method) {
            Some(CallbackKind::Success)
        } else if self.failure.contains(&method) {
            Some(CallbackKind::Failure)
        } else {
            None
        }
    }
}

/// Decode a transaction whose body is a plain function call.
///
/// Aborted transactions, bodiless transactions, methods outside `methods` and
/// non-object inputs all decode to `None`.
pub fn decode_function_call(transaction: &RawTransaction, methods: &[&str]) -> Option<TransactionEvent> {
    if transaction.aborted {
        return None;
    }
    let body = transaction.body.as_ref()?;
    if !methods.contains(&body.method.as_str()) {
        return None;
    }
    let input = match &body.input {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => return None,
    };
    Some(TransactionEvent {
        lt: transaction.lt,
        hash: transaction.hash.clone(),
        account: transaction.account.clone(),
        method: body.method.clone(),
        input,
    })
}
