//! Client-side persistent storage.
//!
//! SYSTEM CONTEXT
//! ==============
//! Mirrors what a browser gives the session layer: a string key/value store
//! that survives restarts, plus a cookie jar. Storage is best-effort; when it
//! is unavailable reads return `None` and writes are dropped with a warning,
//! so callers never handle storage errors.
//!
//! TRADE-OFFS
//! ==========
//! `FileStore` re-reads the file on every access and writes it whole. Two
//! processes sharing one file can race (logout in one, refresh in another);
//! there is no cross-process locking.

pub mod token_store;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

pub use token_store::{CookieMirror, TokenStore};

/// String key/value storage with browser `localStorage` semantics.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

// =============================================================================
// MEMORY
// =============================================================================

/// Process-local storage. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_owned(), value.to_owned());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON-file-backed storage, one flat object of string values.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_all(&self) -> Option<HashMap<String, String>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Some(HashMap::new()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session store unreadable");
                return None;
            }
        };
        if raw.trim().is_empty() {
            return Some(HashMap::new());
        }
        match serde_json::from_str(&raw) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "session store corrupt; ignoring");
                None
            }
        }
    }

    fn write_all(&self, entries: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "cannot create session store directory");
                return;
            }
        }
        let body = match serde_json::to_string_pretty(entries) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "session store serialization failed");
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, body) {
            tracing::warn!(path = %self.path.display(), error = %e, "session store write failed");
        }
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) {
        let Ok(_guard) = self.lock.lock() else {
            return;
        };
        // A corrupt file is replaced rather than preserved.
        let mut entries = self.read_all().unwrap_or_default();
        apply(&mut entries);
        self.write_all(&entries);
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().ok()?;
        self.read_all()?.remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        self.update(|entries| {
            entries.insert(key.to_owned(), value.to_owned());
        });
    }

    fn remove(&self, key: &str) {
        self.update(|entries| {
            entries.remove(key);
        });
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
