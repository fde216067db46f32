//! Content-addressed translation caches.
//!
//! Keys are always `(language pair, content hash)`, never positions, so the
//! same text anywhere in any document reuses a prior translation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Source/target language pair, rendered as `source:target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pair: LanguagePair,
    pub hash: String,
}

impl CacheKey {
    pub fn new(pair: &LanguagePair, hash: impl Into<String>) -> Self {
        Self {
            pair: pair.clone(),
            hash: hash.into(),
        }
    }
}

/// Job-scoped cache tier. Owned by exactly one job and dropped with it.
#[derive(Debug, Default)]
pub struct EphemeralCache {
    entries: HashMap<CacheKey, String>,
}

impl EphemeralCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &LanguagePair, hash: &str) -> Option<&str> {
        self.entries
            .get(&CacheKey::new(pair, hash))
            .map(String::as_str)
    }

    pub fn put(&mut self, pair: &LanguagePair, hash: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(CacheKey::new(pair, hash), text.into());
    }

    /// Seed from a persisted paragraph map.
    pub fn extend<I>(&mut self, pair: &LanguagePair, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (hash, text) in entries {
            self.put(pair, hash, text);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: usize,
}

/// Cross-job memoization tier, safe to share between concurrently running jobs.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    entries: Arc<RwLock<HashMap<CacheKey, String>>>,
}

impl SharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &LanguagePair, hash: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&CacheKey::new(pair, hash)).cloned()
    }

    pub fn put(&self, pair: &LanguagePair, hash: impl Into<String>, text: impl Into<String>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(CacheKey::new(pair, hash), text.into());
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: entries.len(),
            total_bytes: entries.values().map(String::len).sum(),
        }
    }
}
