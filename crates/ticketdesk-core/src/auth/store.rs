//! Persisted session store.
//!
//! The credential and the identity are kept under two independent keys so a
//! corrupt identity record never hides an expired credential. Reads that find
//! partial or unparseable state clear both entries before reporting "nothing
//! stored".

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, warn};

use super::session::{Identity, Session};

/// Key holding the raw credential string
pub const TOKEN_KEY: &str = "auth_token";

/// Key holding the JSON-encoded identity record
pub const USER_KEY: &str = "auth_user";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Failed to encode session record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Synchronous, durable string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a key that does not exist is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// File-backed store: one file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.entry_path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so readers never see a half-written entry
        let tmp = self.dir.join(format!(".{}.tmp", key));
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, self.entry_path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Durable mirror of the current `Session`.
///
/// Clone is cheap; all clones share the same backend.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Persist both halves of the session.
    ///
    /// The identity is written first; if either write fails both entries are
    /// cleared so the store never holds a credential without an identity.
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let result = serde_json::to_string(&session.identity)
            .map_err(StorageError::from)
            .and_then(|user| self.backend.set(USER_KEY, &user))
            .and_then(|()| self.backend.set(TOKEN_KEY, &session.credential));

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session, clearing partial state");
            self.clear_quietly();
            return Err(e);
        }
        Ok(())
    }

    /// Load the persisted session.
    ///
    /// Missing or unparseable entries (and backend read failures) yield
    /// `None`, and the store is cleared to heal any partial state.
    pub fn load(&self) -> Option<Session> {
        let token = self.read(TOKEN_KEY);
        let user = self.read(USER_KEY);

        let session = match (token, user) {
            (Some(token), Some(user)) if !token.is_empty() => {
                match serde_json::from_str::<Identity>(&user) {
                    Ok(identity) => Some(Session::new(token, identity)),
                    Err(e) => {
                        warn!(error = %e, "Stored identity record is corrupt");
                        None
                    }
                }
            }
            (None, None) => return None,
            _ => None,
        };

        if session.is_none() {
            debug!("Persisted session incomplete, clearing store");
            self.clear_quietly();
        }
        session
    }

    /// The persisted credential alone, without validating the identity entry
    pub fn credential(&self) -> Option<String> {
        self.read(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Remove both entries. Safe to call when nothing is stored.
    pub fn clear(&self) -> Result<(), StorageError> {
        let token = self.backend.remove(TOKEN_KEY);
        let user = self.backend.remove(USER_KEY);
        token.and(user)
    }

    /// Whether neither entry is present
    pub fn is_empty(&self) -> bool {
        self.read(TOKEN_KEY).is_none() && self.read(USER_KEY).is_none()
    }

    pub(crate) fn clear_quietly(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "Failed to clear session store");
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read session store entry");
                None
            }
        }
    }
}
