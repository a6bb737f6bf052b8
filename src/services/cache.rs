use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::AnalysisResult;

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, AnalysisResult>,
    // Bumped by every clear; writes started under an older epoch are dropped.
    epoch: u64,
}

/// Content-addressed store of finished reports, keyed by the SHA-256 of the
/// mime type and the base64 payload that was sent to the model.
#[derive(Debug, Default)]
pub struct ReportCache {
    state: Mutex<CacheState>,
}

/// Result of a cache lookup. A miss carries the epoch the caller must hand
/// back to [`ReportCache::insert`].
#[derive(Debug)]
pub enum Lookup {
    Hit(AnalysisResult),
    Miss { epoch: u64 },
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mime type is part of the key: the same bytes sent with a different
    /// declared type are a different request to the model.
    pub fn key_for(mime_type: &str, encoded_payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(mime_type.as_bytes());
        hasher.update(b"\n");
        hasher.update(encoded_payload.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave a map half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        let state = self.state();
        match state.entries.get(key) {
            Some(result) => Lookup::Hit(result.clone()),
            None => Lookup::Miss { epoch: state.epoch },
        }
    }

    /// Stores `result` unless the cache was cleared since `epoch` was read.
    /// Returns whether the entry was kept.
    pub fn insert(&self, key: String, result: AnalysisResult, epoch: u64) -> bool {
        let mut state = self.state();
        if state.epoch != epoch {
            log::debug!("🧹 Cache cleared while the request ran, not storing result");
            return false;
        }
        state.entries.insert(key, result);
        true
    }

    pub fn clear(&self) {
        let mut state = self.state();
        if !state.entries.is_empty() {
            log::debug!("🧹 Dropping {} cached report(s)", state.entries.len());
        }
        state.entries.clear();
        state.epoch += 1;
    }
}
