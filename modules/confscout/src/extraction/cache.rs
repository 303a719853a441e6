//! Extraction result cache, keyed by a fingerprint of the extraction input.
//!
//! Tasks only touch the in-memory map during a run; the file is written once by
//! [`ExtractionCache::flush`]. Losing the file only costs repeat service calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use confscout_common::{ExtractedFields, PersistenceError};

use crate::store::{read_json, write_json_atomic};

/// Only this much of the description participates in the fingerprint.
pub const FINGERPRINT_DESCRIPTION_CHARS: usize = 500;

pub fn fingerprint(title: &str, location: &str, description: &str) -> String {
    let prefix = ai_client::truncate_chars(description, FINGERPRINT_DESCRIPTION_CHARS);
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"|");
    hasher.update(location.as_bytes());
    hasher.update(b"|");
    hasher.update(prefix.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct ExtractionCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, ExtractedFields>>,
    dirty: AtomicBool,
}

impl ExtractionCache {
    /// Missing or corrupt cache files start an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries: HashMap<String, ExtractedFields> = match read_json(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable extraction cache, starting empty");
                HashMap::new()
            }
        };
        info!(path = %path.display(), entries = entries.len(), "Extraction cache loaded");
        Self {
            path,
            entries: RwLock::new(entries),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<ExtractedFields> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: String, fields: ExtractedFields) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, fields);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the cache if anything was added since load. Returns whether a write happened.
    pub fn flush(&self) -> Result<bool, PersistenceError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = write_json_atomic(&self.path, &*entries) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        info!(path = %self.path.display(), entries = entries.len(), "Extraction cache flushed");
        Ok(true)
    }
}
