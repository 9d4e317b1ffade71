//! Key-value storage tiers for session state.
//!
//! The session manager keeps its state in two tiers behind the same
//! [`KeyValueStore`] interface:
//!
//! - a short-lived tier that forgets everything when the session ends
//!   (`MemoryStore`, or a `FileStore` under the runtime directory)
//! - a durable tier that survives restarts (`FileStore` under the data
//!   directory, or `KeyringStore` backed by the OS keychain)
//!
//! Values are JSON documents. Entries may carry an absolute expiry which
//! every store enforces on read.

pub mod file;
pub mod keychain;
pub mod memory;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use self::file::FileStore;
pub use self::keychain::KeyringStore;
pub use self::memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// How long a stored entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Expiry {
    /// Lives as long as the store itself.
    #[default]
    Session,
    /// Reads as absent once this instant has passed.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Expiry `days` from now. Session semantics when that instant cannot
    /// be represented.
    pub fn in_days(days: u32) -> Self {
        TimeDelta::try_days(i64::from(days))
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .map(Expiry::At)
            .unwrap_or(Expiry::Session)
    }

    /// Expiry at a unix timestamp in milliseconds. Non-positive values mean
    /// session semantics, as do values that cannot be represented.
    pub fn at_millis(millis: i64) -> Self {
        if millis <= 0 {
            return Expiry::Session;
        }
        DateTime::from_timestamp_millis(millis)
            .map(Expiry::At)
            .unwrap_or(Expiry::Session)
    }

    pub fn is_expired(&self) -> bool {
        match self {
            Expiry::Session => false,
            Expiry::At(at) => Utc::now() >= *at,
        }
    }
}

/// On-disk / in-memory record wrapping a stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: Value,
    #[serde(default)]
    pub expiry: Expiry,
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(value: Value, expiry: Expiry) -> Self {
        Self {
            value,
            expiry,
            stored_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expiry.is_expired()
    }
}

/// A string-keyed JSON store.
///
/// Implementations use interior mutability so a store can be shared behind
/// an `Arc` by the session manager and the rest of the application.
pub trait KeyValueStore: Send + Sync {
    /// Get the value for a key. Expired entries are removed and read as `None`.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Set a value, replacing any previous entry and its expiry.
    fn set(&self, key: &str, value: Value, expiry: Expiry) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every entry owned by this store.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Typed convenience layer over [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expiry: Expiry,
    ) -> Result<(), StorageError> {
        self.set(key, serde_json::to_value(value)?, expiry)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
