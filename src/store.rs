use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ViewerError;

pub mod keys {
    pub const DRIVE_LINK: &str = "driveLink";
    pub const EDITION_TITLE: &str = "editionTitle";
    pub const CUSTOM_WIDTH: &str = "customWidth";
    pub const CUSTOM_DOUBLE_WIDTH: &str = "customDoubleWidth";
    pub const CUSTOM_HEIGHT: &str = "customHeight";
    pub const TABLE_CONTENTS: &str = "tableContents";
    pub const LABELS: &str = "labels";
    pub const RETURN_URL: &str = "comicViewerReturnUrl";
    pub const LAST_PAGE: &str = "comicViewerLastPage";
    pub const LAST_SESSION: &str = "comicViewerLastSession";
}

/// Synchronous string key/value storage that survives restarts.
///
/// Writes are last-writer-wins. Callers in the session layer treat every error as
/// non-fatal and fall back to defaults.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ViewerError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ViewerError>;
    fn remove(&self, key: &str) -> Result<(), ViewerError>;
}

/// Reads a key, logging and swallowing storage failures.
pub fn get_or_log(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(key, %err, "storage read failed");
            None
        }
    }
}

pub fn set_or_log(store: &dyn KeyValueStore, key: &str, value: &str) {
    if let Err(err) = store.set(key, value) {
        tracing::warn!(key, %err, "storage write failed");
    }
}

pub fn remove_or_log(store: &dyn KeyValueStore, key: &str) {
    if let Err(err) = store.remove(key) {
        tracing::warn!(key, %err, "storage remove failed");
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ViewerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ViewerError::Storage("memory store lock poisoned".to_owned()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ViewerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ViewerError::Storage("memory store lock poisoned".to_owned()))?;
        entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ViewerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ViewerError::Storage("memory store lock poisoned".to_owned()))?;
        entries.remove(key);
        Ok(())
    }
}

/// A single JSON object on disk, rewritten atomically on every mutation.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store, starting empty when the file is missing or unreadable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring unreadable store file");
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

    fn mutate(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), ViewerError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ViewerError::Storage("file store lock poisoned".to_owned()))?;
        apply(&mut entries);
        write_entries_atomic(&self.path, &entries)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ViewerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ViewerError::Storage("file store lock poisoned".to_owned()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ViewerError> {
        self.mutate(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), ViewerError> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, String>, ViewerError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_entries_atomic(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), ViewerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(entries)?;
    std::fs::write(&tmp_path, &data)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// A typed, JSON-encoded value under a fixed key.
///
/// `load` never fails: a missing key, a corrupt value or the literal `undefined`
/// all yield the default.
#[derive(Debug, Clone)]
pub struct Persisted<T> {
    key: &'static str,
    default: T,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub fn new(key: &'static str, default: T) -> Self {
        Self {
            key,
            default,
            _marker: PhantomData,
        }
    }

    pub fn load(&self, store: &dyn KeyValueStore) -> T {
        self.try_load(store).unwrap_or_else(|| self.default.clone())
    }

    /// Like `load`, but distinguishes "nothing usable stored" from the default.
    pub fn try_load(&self, store: &dyn KeyValueStore) -> Option<T> {
        let raw = get_or_log(store, self.key)?;
        if raw == "undefined" {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key = self.key, %err, "ignoring corrupt stored value");
                None
            }
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => set_or_log(store, self.key, &raw),
            Err(err) => tracing::warn!(key = self.key, %err, "serialize stored value"),
        }
    }
}
