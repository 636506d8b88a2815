use crate::error::StoreError;
use crate::observable::{Readable, Subscription, Writable};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub const SETTINGS_SLOT: &str = "settingsStore";
pub const CHAT_SLOT: &str = "chatStore";

/// Text slots addressed by a fixed key, the persistence layer behind the
/// persisted stores.
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// One `<key>.json` file per slot under `root`.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        fs::create_dir_all(&root).ok();
        Self { root }
    }

    pub fn temporary() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("parlor-{}", Uuid::new_v4()));
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        if !self.root.exists() {
            return Ok(keys);
        }
        for entry in walkdir::WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Process-local slots. Nothing survives the process.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.slots.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.slots.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Writes committed values to a slot until the first failure, after which the
/// store keeps working in memory only.
struct SlotWriter {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    available: AtomicBool,
}

impl SlotWriter {
    fn persist<T: Serialize>(&self, value: &T) -> Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.backend.write(&self.key, &serialized)
    }

    fn persist_or_degrade<T: Serialize>(&self, value: &T) {
        if !self.available.load(Ordering::Acquire) {
            return;
        }
        match self.persist(value) {
            Ok(()) => tracing::debug!(key = %self.key, "persisted slot"),
            Err(err) => {
                self.available.store(false, Ordering::Release);
                tracing::warn!(
                    key = %self.key,
                    error = ?err,
                    "persistence unavailable, continuing in memory for this session"
                );
            }
        }
    }
}

/// A [`Writable`] bound to one key-value slot.
pub struct PersistedStore<T> {
    inner: Writable<T>,
    writer: Arc<SlotWriter>,
    _sync: Subscription,
}

impl<T> PersistedStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Loads `key` from `backend`, falling back to `initial` when the slot is
    /// absent, unreadable or corrupt. An unreadable slot is never overwritten:
    /// the store starts in memory only until [`PersistedStore::sync`] succeeds.
    pub fn open(backend: Arc<dyn KeyValueStore>, key: impl Into<String>, initial: T) -> Self {
        let key = key.into();
        let (value, available) = match load_slot(backend.as_ref(), &key) {
            SlotLoad::Loaded(value) => (value, true),
            SlotLoad::Empty => (initial, true),
            SlotLoad::Unreadable => (initial, false),
        };
        let writer = Arc::new(SlotWriter {
            backend,
            key,
            available: AtomicBool::new(available),
        });
        let inner = Writable::new(value);
        let sink = writer.clone();
        let sync = inner.subscribe(move |value: &T| sink.persist_or_degrade(value));
        Self {
            inner,
            writer,
            _sync: sync,
        }
    }

    pub fn key(&self) -> &str {
        &self.writer.key
    }

    /// False when the slot could not be read or a write has failed; the store
    /// then lives in memory only.
    pub fn is_persistent(&self) -> bool {
        self.writer.available.load(Ordering::Acquire)
    }

    /// Writes the current value now, reporting failures instead of degrading.
    pub fn sync(&self) -> Result<(), StoreError> {
        let value = self.inner.get();
        self.writer.persist(&value).map_err(|err| {
            self.writer.available.store(false, Ordering::Release);
            StoreError::PersistenceUnavailable(format!("{}: {err:#}", self.writer.key))
        })?;
        self.writer.available.store(true, Ordering::Release);
        Ok(())
    }

    /// Drops the persisted slot. The in-memory value is untouched.
    pub fn clear_slot(&self) -> Result<()> {
        self.writer.backend.remove(&self.writer.key)
    }

    pub fn writable(&self) -> &Writable<T> {
        &self.inner
    }

    pub fn readonly(&self) -> Readable<T> {
        self.inner.readonly()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.subscribe(observer)
    }

    pub fn set(&self, value: T) {
        self.inner.set(value);
    }

    pub fn update<F>(&self, transform: F)
    where
        F: FnOnce(T) -> T,
    {
        self.inner.update(transform);
    }

    pub fn try_update<R, E, F>(&self, mutate: F) -> Result<R, E>
    where
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        self.inner.try_update(mutate)
    }

    pub fn get(&self) -> T {
        self.inner.get()
    }

    pub fn with<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        self.inner.with(read)
    }
}

enum SlotLoad<T> {
    Loaded(T),
    /// Absent or corrupt; safe to overwrite.
    Empty,
    Unreadable,
}

fn load_slot<T: DeserializeOwned>(backend: &dyn KeyValueStore, key: &str) -> SlotLoad<T> {
    let contents = match backend.read(key) {
        Ok(Some(contents)) => contents,
        Ok(None) => return SlotLoad::Empty,
        Err(err) => {
            tracing::warn!(
                key,
                error = ?err,
                "failed to read slot, continuing in memory for this session"
            );
            return SlotLoad::Unreadable;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => {
            tracing::debug!(key, "loaded slot");
            SlotLoad::Loaded(value)
        }
        Err(err) => {
            tracing::warn!(key, %err, "slot is corrupt, using defaults");
            SlotLoad::Empty
        }
    }
}
