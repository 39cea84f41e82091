//! Cookie-consent flag.
//!
//! The flag is read once when the store is loaded and written only on an
//! explicit accept or decline.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::warn;

pub const CONSENT_KEY: &str = "infrajet.cookie-consent";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// String key/value persistence, the shape of browser local storage.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

// =============================================================================
// STORAGE BACKENDS
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// A JSON object on disk. A missing file reads as empty.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut values = self.read_all()?;
        values.insert(key.to_owned(), value.to_owned());
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&values)?)?;
        Ok(())
    }
}

// =============================================================================
// CONSENT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Accepted,
    Declined,
}

impl Consent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "true",
            Self::Declined => "false",
        }
    }

    /// Boolean-like stored value. Anything unrecognized reads as "not asked".
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "accepted" | "yes" => Some(Self::Accepted),
            "false" | "0" | "declined" | "no" => Some(Self::Declined),
            _ => None,
        }
    }
}

pub struct ConsentStore {
    storage: Arc<dyn KeyValueStorage>,
    consent: Option<Consent>,
}

impl ConsentStore {
    /// Read the persisted flag once. Unreadable storage counts as "not asked".
    #[must_use]
    pub fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let consent = match storage.get(CONSENT_KEY) {
            Ok(raw) => raw.as_deref().and_then(Consent::parse),
            Err(e) => {
                warn!(error = %e, "consent flag unreadable");
                None
            }
        };
        Self { storage, consent }
    }

    #[must_use]
    pub fn consent(&self) -> Option<Consent> {
        self.consent
    }

    /// Whether the consent banner should be shown.
    #[must_use]
    pub fn needs_prompt(&self) -> bool {
        self.consent.is_none()
    }

    /// # Errors
    ///
    /// Returns the storage error; the in-memory choice is kept regardless.
    pub fn accept(&mut self) -> Result<(), StorageError> {
        self.record(Consent::Accepted)
    }

    /// # Errors
    ///
    /// Returns the storage error; the in-memory choice is kept regardless.
    pub fn decline(&mut self) -> Result<(), StorageError> {
        self.record(Consent::Declined)
    }

    fn record(&mut self, consent: Consent) -> Result<(), StorageError> {
        self.consent = Some(consent);
        self.storage.set(CONSENT_KEY, consent.as_str()).inspect_err(|e| {
            warn!(error = %e, "consent flag not persisted");
        })
    }
}

#[cfg(test)]
#[path = "consent_test.rs"]
mod tests;
