//! User preferences persisted as JSON strings under fixed keys

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::math::validate_slippage;
use crate::shared::errors::AppError;

pub const SLIPPAGE_KEY: &str = "slippage";
pub const LIMIT_ORDER_FILTER_KEY: &str = "limit-order-filter";

/// Key-value file store; each value is itself a JSON document in a string
pub struct Preferences {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl Preferences {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("⚠️ Ignoring corrupt preferences file {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(e) => {
                debug!("No preferences at {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored value for `key`; corrupt entries read as absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.entries.lock().get(key).cloned()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("⚠️ Ignoring corrupt preference {}: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value).map_err(|e| AppError::StorageError(e.to_string()))?;
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), raw);
        self.flush(&entries)
    }

    pub fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    /// Saved slippage tolerance, or `default` when absent or out of range
    pub fn slippage(&self, default: Decimal) -> Decimal {
        self.get::<Decimal>(SLIPPAGE_KEY)
            .and_then(|value| validate_slippage(value).ok())
            .unwrap_or(default)
    }

    pub fn set_slippage(&self, slippage: Decimal) -> Result<(), AppError> {
        let slippage = validate_slippage(slippage)?;
        self.set(SLIPPAGE_KEY, &slippage)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(entries).map_err(|e| AppError::StorageError(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AppError::StorageError(e.to_string()))?;
        }
        fs::write(&self.path, content)
            .map_err(|e| AppError::StorageError(format!("Failed to write {}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slippage_persists_between_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("preferences.json");

        let preferences = Preferences::open(&path);
        assert_eq!(preferences.slippage(dec!(0.5)), dec!(0.5));
        preferences.set_slippage(dec!(1.5)).unwrap();

        let reopened = Preferences::open(&path);
        assert_eq!(reopened.slippage(dec!(0.5)), dec!(1.5));
    }

    #[test]
    fn test_invalid_slippage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let preferences = Preferences::open(dir.path().join("preferences.json"));
        assert!(preferences.set_slippage(dec!(100)).is_err());
    }

    #[test]
    fn test_corrupt_entries_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        fs::write(&path, r#"{"slippage": "not json", "other": "1"}"#).unwrap();

        let preferences = Preferences::open(&path);
        assert_eq!(preferences.slippage(dec!(0.5)), dec!(0.5));
        assert_eq!(preferences.get::<u32>("other"), Some(1));

        fs::write(&path, "garbage").unwrap();
        assert_eq!(Preferences::open(&path).get::<u32>("other"), None);
    }
}
