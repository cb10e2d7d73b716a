//! Small persistence port for launcher state.
//!
//! Queue and config logic only see [`Store`], so tests can swap the JSON file
//! for [`MemoryStore`].

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

pub trait Store<T>: Send {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<T>>;
    fn save(&self, value: &T) -> Result<()>;
}

/// Load a value, falling back to `T::default()` when it is missing or unreadable.
pub fn load_or_default<T: Default>(store: &dyn Store<T>, what: &str) -> T {
    match store.load() {
        Ok(Some(v)) => v,
        Ok(None) => T::default(),
        Err(e) => {
            log::error!("failed to load {what}, using defaults: {e}");
            T::default()
        }
    }
}

/// Pretty-printed JSON file, replaced whole on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Store<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn save(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;

        // Write next to the target and rename over it so a crash mid-write
        // leaves the previous file intact.
        let file_name = self
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Io(std::io::Error::other("store path has no file name")))?;
        let tmp = self.path.with_file_name(format!("{file_name}.tmp"));
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory store. Clones share the same slot.
#[derive(Debug)]
pub struct MemoryStore<T> {
    slot: Arc<Mutex<Option<T>>>,
    fail_saves: Arc<Mutex<bool>>,
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            fail_saves: Arc::clone(&self.fail_saves),
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            fail_saves: Arc::new(Mutex::new(false)),
        }
    }
}

impl<T: Clone> MemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(value: T) -> Self {
        let store = Self::default();
        if let Ok(mut slot) = store.slot.lock() {
            *slot = Some(value);
        }
        store
    }

    /// Last saved value.
    pub fn get(&self) -> Option<T> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    /// Make subsequent saves fail, to exercise error paths.
    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut f) = self.fail_saves.lock() {
            *f = fail;
        }
    }
}

impl<T: Clone + Send> Store<T> for MemoryStore<T> {
    fn load(&self) -> Result<Option<T>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| std::io::Error::other("memory store lock poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&self, value: &T) -> Result<()> {
        let fail = self.fail_saves.lock().map(|f| *f).unwrap_or(false);
        if fail {
            return Err(std::io::Error::other("memory store rejects saves").into());
        }
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| std::io::Error::other("memory store lock poisoned"))?;
        *slot = Some(value.clone());
        Ok(())
    }
}
