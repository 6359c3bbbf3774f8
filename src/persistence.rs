//! Durable mirroring of settings and conversation.
//!
//! [`Persistence`] writes a [`PersistedSnapshot`] under a single key after every store
//! mutation and reads it back once at startup.  Writes overwrite the previous value
//! wholesale.  Failures in either direction are logged and swallowed: a failed write
//! never touches in-memory state, and an unreadable snapshot loads as `None`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::observability::{PERSISTENCE_FAILURES, PERSISTENCE_WRITES};
use crate::store::{AppState, StoreListener};
use crate::types::PersistedSnapshot;

/// Key the snapshot is stored under.
pub const STATE_KEY: &str = "coding-agent-state";

/// A string key/value store.
pub trait Storage: Send {
    /// Reads the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites the value stored under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Deletes the value stored under `key`, if any.
    fn remove(&mut self, key: &str) -> Result<()>;
}

///////////////////////////////////////////// FileStorage /////////////////////////////////////////////

/// Storage that keeps each key in `<dir>/<key>.json`.
///
/// Writes go to a temporary file that is renamed into place, so a reader sees either the
/// previous value or the new one.  The file is not fsynced: `set` runs on every streamed
/// fragment while the store lock is held, and a lost final write after a power failure
/// only costs the last fragments.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Creates storage rooted at `dir`.  The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(format!("failed to read {key}"), err)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|err| Error::io("failed to create state directory", err))?;
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        let mut file =
            fs::File::create(&tmp).map_err(|err| Error::io("failed to create state file", err))?;
        file.write_all(value.as_bytes())
            .map_err(|err| Error::io("failed to write state file", err))?;
        fs::rename(&tmp, &path).map_err(|err| Error::io("failed to replace state file", err))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(format!("failed to remove {key}"), err)),
        }
    }
}

//////////////////////////////////////////// MemoryStorage ////////////////////////////////////////////

/// In-process storage.  Clones share the same entries.
///
/// An optional quota bounds the size of any single value, mimicking a browser's
/// storage limit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Creates empty, unbounded storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates empty storage that rejects values longer than `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota
            && value.len() > quota
        {
            return Err(Error::persistence(
                format!("quota exceeded: {} bytes > {quota} bytes", value.len()),
                None,
            ));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

///////////////////////////////////////////// Persistence /////////////////////////////////////////////

/// Writes snapshots to a [`Storage`] and reads them back.
#[derive(Debug)]
pub struct Persistence<S: Storage> {
    storage: S,
    key: String,
}

impl<S: Storage> Persistence<S> {
    /// Persists under [`STATE_KEY`].
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, STATE_KEY)
    }

    /// Persists under a custom key.
    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// The storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Writes the persisted projection of `state`, swallowing any failure.
    pub fn snapshot(&mut self, state: &AppState) {
        if let Err(err) = self.write(&state.snapshot()) {
            PERSISTENCE_FAILURES.click();
            tracing::warn!(key = %self.key, error = %err, "discarding snapshot write failure");
        }
    }

    /// Writes `snapshot`, reporting failures as [`Error::PersistenceFailure`].
    pub fn write(&mut self, snapshot: &PersistedSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot).map_err(|err| {
            Error::persistence("failed to serialize snapshot", Some(Box::new(err)))
        })?;
        self.storage
            .set(&self.key, &raw)
            .map_err(|err| match err {
                Error::PersistenceFailure { .. } => err,
                other => Error::persistence(
                    format!("failed to store snapshot: {other}"),
                    Some(Box::new(other)),
                ),
            })?;
        PERSISTENCE_WRITES.click();
        Ok(())
    }

    /// Reads the stored snapshot.
    ///
    /// A missing key, unreadable storage, malformed JSON, a shape mismatch, or invalid
    /// base URLs all yield `None`.
    pub fn load(&self) -> Option<PersistedSnapshot> {
        match self.try_load() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                PERSISTENCE_FAILURES.click();
                tracing::warn!(key = %self.key, error = %err, "ignoring unreadable snapshot");
                None
            }
        }
    }

    /// Reads the stored snapshot, reporting why it could not be used.
    pub fn try_load(&self) -> Result<Option<PersistedSnapshot>> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(None);
        };
        let snapshot: PersistedSnapshot = serde_json::from_str(&raw).map_err(|err| {
            Error::persistence("snapshot does not match the expected shape", Some(Box::new(err)))
        })?;
        snapshot.settings.validate()?;
        Ok(Some(snapshot))
    }

    /// Deletes the stored snapshot.
    pub fn forget(&mut self) -> Result<()> {
        self.storage.remove(&self.key)
    }
}

impl<S: Storage> StoreListener for Persistence<S> {
    fn on_change(&mut self, state: &AppState) {
        self.snapshot(state);
    }
}
