//! Memoized per-path file state.
//!
//! The lock is scoped to the cache alone so hashing workers on unrelated
//! paths never serialize against each other.

use crate::models::{Fingerprint, SaveFileState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

#[derive(Default)]
pub struct HashCache {
    entries: RwLock<HashMap<PathBuf, SaveFileState>>,
}

impl HashCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached state only if it is still valid for the observed
    /// size and mtime.
    pub fn get_valid(&self, path: &Path, size: u64, modified: SystemTime) -> Option<SaveFileState> {
        let entries = self.entries.read().unwrap();
        entries
            .get(path)
            .filter(|state| state.matches(size, modified))
            .cloned()
    }

    /// Returns whatever is recorded for the path, valid or not.
    pub fn get(&self, path: &Path) -> Option<SaveFileState> {
        self.entries.read().unwrap().get(path).cloned()
    }

    pub fn insert(&self, path: &Path, fingerprint: Fingerprint, size: u64, modified: SystemTime) {
        let state = SaveFileState {
            path: path.to_path_buf(),
            fingerprint,
            size,
            modified,
            cached_at: SystemTime::now(),
        };
        self.entries
            .write()
            .unwrap()
            .insert(path.to_path_buf(), state);
    }

    pub fn remove(&self, path: &Path) -> Option<SaveFileState> {
        self.entries.write().unwrap().remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
