//! The credential store: tier A of the two-tier credential cache.
//!
//! Tier A is an OS keyring keyed by step alias (the provider or identity
//! name); credentials serialize to JSON inside the entry. Tier B is
//! identity-local storage reached through `Identity::load_credentials`; the
//! manager triggers that fallback explicitly so expiry semantics stay uniform
//! across tiers. The store itself never interprets which tier answered.
//!
//! Keyring I/O is blocking; the async facade routes every backend call
//! through `spawn_blocking`.

use derivative::Derivative;
use dyn_clone::{clone_trait_object, DynClone};
use slog::{debug, o, Logger};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use crate::credentials::Credentials;

/// The service name under which entries are registered with the OS keyring.
const KEYRING_SERVICE: &str = "cloudauth";

/// The reserved alias under which the OS backend tracks which aliases exist,
/// since platform keychains cannot enumerate entries.
const INDEX_KEY: &str = "__index__";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no stored credentials for {0:?}")]
    NotFound(String),
    #[error("keyring backend failure for {key:?}: {message}")]
    Backend { key: String, message: String },
    #[error("failed to decode stored credentials for {alias:?}: {source}")]
    Decode {
        alias: String,
        source: serde_json::Error,
    },
    #[error("failed to encode credentials for {alias:?}: {source}")]
    Encode {
        alias: String,
        source: serde_json::Error,
    },
}

impl StoreError {
    /// True when the error means "nothing stored", as opposed to a backend
    /// failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// A keyring backend: a flat map of string keys to secret string values.
/// Implementations must tolerate concurrent use from blocking worker threads.
pub trait Keyring: Debug + DynClone + Send + Sync {
    fn get(&self, key: &str) -> Result<String, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<String>, StoreError>;
}

clone_trait_object!(Keyring);

/// The OS keyring backend.
#[derive(Clone, Debug)]
pub struct OsKeyring {
    service: String,
}

impl OsKeyring {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    /// Uses a custom service name; aliases from different services never
    /// collide.
    pub fn with_service(service: &str) -> Self {
        OsKeyring {
            service: service.to_owned(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, key).map_err(|e| StoreError::Backend {
            key: key.to_owned(),
            message: e.to_string(),
        })
    }

    fn read_index(&self) -> Result<Vec<String>, StoreError> {
        match self.entry(INDEX_KEY)?.get_password() {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Backend {
                key: INDEX_KEY.to_owned(),
                message: format!("corrupt alias index: {e}"),
            }),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(StoreError::Backend {
                key: INDEX_KEY.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    fn write_index(&self, index: &[String]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(index).map_err(|e| StoreError::Backend {
            key: INDEX_KEY.to_owned(),
            message: e.to_string(),
        })?;
        self.entry(INDEX_KEY)?
            .set_password(&raw)
            .map_err(|e| StoreError::Backend {
                key: INDEX_KEY.to_owned(),
                message: e.to_string(),
            })
    }

    fn index_insert(&self, key: &str) -> Result<(), StoreError> {
        let mut index = self.read_index()?;
        if !index.iter().any(|k| k == key) {
            index.push(key.to_owned());
            index.sort();
            self.write_index(&index)?;
        }
        Ok(())
    }

    fn index_remove(&self, key: &str) -> Result<(), StoreError> {
        let mut index = self.read_index()?;
        let before = index.len();
        index.retain(|k| k != key);
        if index.len() != before {
            self.write_index(&index)?;
        }
        Ok(())
    }
}

impl Default for OsKeyring {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyring for OsKeyring {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(value),
            Err(keyring::Error::NoEntry) => Err(StoreError::NotFound(key.to_owned())),
            Err(e) => Err(StoreError::Backend {
                key: key.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::Backend {
                key: key.to_owned(),
                message: e.to_string(),
            })?;
        self.index_insert(key)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => self.index_remove(key),
            Err(e) => Err(StoreError::Backend {
                key: key.to_owned(),
                message: e.to_string(),
            }),
        }
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        self.read_index()
    }
}

/// An in-memory backend for tests and headless environments without a
/// keyring service. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryKeyring {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keyring for MemoryKeyring {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}

fn any_key(alias: &str, key: &str) -> String {
    format!("{alias}/{key}")
}

/// The store facade the manager works against.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct CredentialStore {
    keyring: Box<dyn Keyring>,
    #[derivative(Debug = "ignore")]
    logger: Logger,
}

impl CredentialStore {
    pub fn new(keyring: Box<dyn Keyring>, parent_logger: &Logger) -> Self {
        CredentialStore {
            keyring,
            logger: parent_logger.new(o!("component" => "credential_store")),
        }
    }

    async fn run_blocking<T, F>(&self, key: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(Box<dyn Keyring>) -> Result<T, StoreError> + Send + 'static,
    {
        let keyring = self.keyring.clone();
        tokio::task::spawn_blocking(move || f(keyring))
            .await
            .map_err(|e| StoreError::Backend {
                key: key.to_owned(),
                message: format!("keyring worker failed: {e}"),
            })?
    }

    /// Persists the credential produced by the named step.
    pub async fn store(&self, alias: &str, credentials: &Credentials) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_string(credentials).map_err(|source| StoreError::Encode {
                alias: alias.to_owned(),
                source,
            })?;
        debug!(self.logger, "storing credentials"; "alias" => alias);
        let alias = alias.to_owned();
        self.run_blocking(&alias.clone(), move |keyring| keyring.set(&alias, &encoded))
            .await
    }

    /// Fetches the credential stored for the alias. `StoreError::NotFound`
    /// means no entry; expiry is the caller's check, on the credential
    /// itself.
    pub async fn retrieve(&self, alias: &str) -> Result<Credentials, StoreError> {
        let owned = alias.to_owned();
        let raw = self
            .run_blocking(alias, move |keyring| keyring.get(&owned))
            .await?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
            alias: alias.to_owned(),
            source,
        })
    }

    pub async fn delete(&self, alias: &str) -> Result<(), StoreError> {
        debug!(self.logger, "deleting credentials"; "alias" => alias);
        let owned = alias.to_owned();
        self.run_blocking(alias, move |keyring| keyring.delete(&owned))
            .await
    }

    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        self.run_blocking("", move |keyring| keyring.list()).await
    }

    /// Whether the stored credential for the alias reports itself expired.
    /// Missing entries are `StoreError::NotFound`.
    pub async fn is_expired(&self, alias: &str) -> Result<bool, StoreError> {
        Ok(self.retrieve(alias).await?.expired())
    }

    /// Reads a non-credential blob stored for the alias under the given key.
    pub async fn get_any(&self, alias: &str, key: &str) -> Result<String, StoreError> {
        let full = any_key(alias, key);
        self.run_blocking(&full.clone(), move |keyring| keyring.get(&full))
            .await
    }

    /// Stores a non-credential blob for the alias under the given key.
    pub async fn set_any(&self, alias: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let full = any_key(alias, key);
        let value = value.to_owned();
        self.run_blocking(&full.clone(), move |keyring| keyring.set(&full, &value))
            .await
    }
}
