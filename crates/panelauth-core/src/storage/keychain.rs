use keyring::Entry;
use serde_json::Value;

use super::{Expiry, KeyValueStore, StorageError, StoredEntry};

/// Keychain account holding the list of keys this store has written, so
/// `clear` can find them (keychains cannot be enumerated portably).
const INDEX_ACCOUNT: &str = "__index";

/// Durable store backed by the OS keychain.
///
/// Each key is one keychain entry under `service`, holding the JSON-encoded
/// [`StoredEntry`] as its secret.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(&self.service, key).map_err(|e| StorageError::Keyring(e.to_string()))
    }

    fn read_secret(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }

    fn delete_secret(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }

    fn index(&self) -> Result<Vec<String>, StorageError> {
        parse_index(self.read_secret(INDEX_ACCOUNT)?.as_deref())
    }

    fn write_index(&self, keys: &[String]) -> Result<(), StorageError> {
        if keys.is_empty() {
            return self.delete_secret(INDEX_ACCOUNT);
        }
        self.entry(INDEX_ACCOUNT)?
            .set_password(&serde_json::to_string(keys)?)
            .map_err(|e| StorageError::Keyring(e.to_string()))
    }
}

impl KeyValueStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let Some(raw) = self.read_secret(key)? else {
            return Ok(None);
        };
        match decode_entry(&raw)? {
            Some(value) => Ok(Some(value)),
            None => {
                self.remove(key)?;
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: Value, expiry: Expiry) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&StoredEntry::new(value, expiry))?;
        self.entry(key)?
            .set_password(&raw)
            .map_err(|e| StorageError::Keyring(e.to_string()))?;

        let mut keys = self.index()?;
        if insert_key(&mut keys, key) {
            self.write_index(&keys)?;
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.delete_secret(key)?;
        let mut keys = self.index()?;
        if remove_key(&mut keys, key) {
            self.write_index(&keys)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        for key in self.index()? {
            self.delete_secret(&key)?;
        }
        self.write_index(&[])
    }
}

/// Keys recorded in the index secret; no secret means no keys.
fn parse_index(raw: Option<&str>) -> Result<Vec<String>, StorageError> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(raw)?),
        None => Ok(Vec::new()),
    }
}

/// Returns true if the index changed.
fn insert_key(keys: &mut Vec<String>, key: &str) -> bool {
    if keys.iter().any(|k| k == key) {
        return false;
    }
    keys.push(key.to_string());
    true
}

/// Returns true if the index changed.
fn remove_key(keys: &mut Vec<String>, key: &str) -> bool {
    let before = keys.len();
    keys.retain(|k| k != key);
    keys.len() != before
}

/// The value inside a stored secret, or `None` once it has expired.
fn decode_entry(raw: &str) -> Result<Option<Value>, StorageError> {
    let entry: StoredEntry = serde_json::from_str(raw)?;
    if entry.is_expired() {
        return Ok(None);
    }
    Ok(Some(entry.value))
}
