//! Correlation ids embedded into outgoing payloads and echoed by callbacks

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Largest integer a callback id may take (contracts and JS clients share it)
const MAX_CALL_ID: u64 = (1 << 53) - 1;

/// Opaque id correlating one outgoing message with its on-chain callback
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Random id, practically unique within a session
    pub fn generate() -> Self {
        let value = rand::thread_rng().gen_range(1..=MAX_CALL_ID);
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form for payloads whose ABI declares the id as an integer
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Whether a decoded callback field carries this id.
    ///
    /// Contracts echo the id either as a decimal string or as a number.
    pub fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => s == &self.0,
            Value::Number(n) => n.to_string() == self.0,
            _ => false,
        }
    }
}

impl From<u64> for CorrelationId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_generated_ids_do_not_collide() {
        let ids: HashSet<_> = (0..10_000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_generated_ids_fit_safe_integer_range() {
        for _ in 0..1_000 {
            let value = CorrelationId::generate().as_u64().unwrap();
            assert!(value >= 1 && value <= MAX_CALL_ID);
        }
    }

    #[test]
    fn test_matches_string_and_number_encodings() {
        let id = CorrelationId::from(42);
        assert!(id.matches(&json!("42")));
        assert!(id.matches(&json!(42)));
        assert!(!id.matches(&json!("43")));
        assert!(!id.matches(&json!(null)));
    }
}
