//! The persisted side: one text blob, replaced whole.
//!
//! [`DocumentController`] is the only writer inside the process. It remembers
//! the last text it read or wrote, which is what lets it tell its own writes
//! apart from saves made by someone else.

use crate::error::{FlatError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Backing stores
// ---------------------------------------------------------------------------

/// Opaque read/replace access to the underlying text.
pub trait TextStore: Send {
    fn read(&self) -> Result<String>;
    fn write(&mut self, text: &str) -> Result<()>;

    /// Filesystem location, if the text lives in a file.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// A document on disk. A missing file reads as empty text.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TextStore for FileStore {
    fn read(&self) -> Result<String> {
        crate::io::read_or_empty(&self.path)
    }

    fn write(&mut self, text: &str) -> Result<()> {
        crate::io::atomic_write(&self.path, text.as_bytes())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    text: String,
    writes: usize,
    fail_writes: bool,
}

/// An in-memory document. Clones share the same buffer, so a test (or an
/// embedding host) can keep one clone to make "external" edits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryInner {
                text: text.into(),
                ..MemoryInner::default()
            })),
        }
    }

    pub fn text(&self) -> String {
        lock(&self.inner).text.clone()
    }

    /// Number of writes that reached the buffer through [`TextStore::write`].
    pub fn writes(&self) -> usize {
        lock(&self.inner).writes
    }

    /// Replace the text as an outside editor would, bypassing the controller.
    pub fn save_externally(&self, text: impl Into<String>) {
        lock(&self.inner).text = text.into();
    }

    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.inner).fail_writes = fail;
    }
}

impl TextStore for MemoryStore {
    fn read(&self) -> Result<String> {
        Ok(self.text())
    }

    fn write(&mut self, text: &str) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.fail_writes {
            return Err(FlatError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "document is read-only",
            )));
        }
        inner.text = text.to_string();
        inner.writes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// External change listeners
// ---------------------------------------------------------------------------

type Callback = Box<dyn FnMut(&str) + Send>;

#[derive(Default)]
struct ListenerSet {
    next_id: u64,
    entries: Vec<(u64, Callback)>,
}

/// Registration handle returned by [`DocumentController::on_external_change`].
/// Dropping it unregisters the callback.
#[must_use = "dropping the subscription unregisters the callback"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<ListenerSet>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.listeners.upgrade() {
            lock(&set).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceOutcome {
    /// The text differed and was written.
    Replaced,
    /// The text already matched; nothing was written.
    Unchanged,
}

pub struct DocumentController {
    store: Box<dyn TextStore>,
    current: String,
    listeners: Arc<Mutex<ListenerSet>>,
}

impl DocumentController {
    pub fn open(store: impl TextStore + 'static) -> Result<Self> {
        let current = store.read()?;
        Ok(Self {
            store: Box::new(store),
            current,
            listeners: Arc::default(),
        })
    }

    /// The persisted text as last read or written.
    pub fn read(&self) -> &str {
        &self.current
    }

    pub fn path(&self) -> Option<&Path> {
        self.store.path()
    }

    /// Replace the whole document. Equal text is a no-op and never reaches
    /// the backing store, which is what keeps a refresh from echoing back as
    /// a write.
    pub fn apply_replace(&mut self, text: &str) -> Result<ReplaceOutcome> {
        if text == self.current {
            return Ok(ReplaceOutcome::Unchanged);
        }
        self.store.write(text)?;
        self.current = text.to_string();
        Ok(ReplaceOutcome::Replaced)
    }

    /// Register a callback for changes made outside [`Self::apply_replace`].
    /// Callbacks run synchronously inside [`Self::poll_external`] and must
    /// not register further callbacks.
    pub fn on_external_change(
        &self,
        callback: impl FnMut(&str) + Send + 'static,
    ) -> Subscription {
        let mut set = lock(&self.listeners);
        let id = set.next_id;
        set.next_id += 1;
        set.entries.push((id, Box::new(callback)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Re-read the backing store. If the text changed since the controller
    /// last saw it, record it, notify listeners and return it.
    pub fn poll_external(&mut self) -> Result<Option<String>> {
        let text = self.store.read()?;
        if text == self.current {
            return Ok(None);
        }
        self.current = text.clone();
        tracing::info!(bytes = text.len(), "document changed outside the editor");
        for (_, callback) in lock(&self.listeners).entries.iter_mut() {
            callback(&text);
        }
        Ok(Some(text))
    }
}
