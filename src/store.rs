//! Persistent paragraph-map tier.
//!
//! A paragraph map holds `block hash -> translated text` for one document and
//! language pair. Writers never overwrite blindly: they reload the latest map,
//! union their entries in and write back under an optimistic revision check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::LanguagePair;
use crate::error::{ParatransError, Result};

pub type ParagraphMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredParagraphMap {
    pub revision: u64,
    pub entries: ParagraphMap,
}

/// Storage collaborator for paragraph maps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ParagraphStore: Send + Sync {
    async fn load_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
    ) -> Result<Option<StoredParagraphMap>>;

    /// Write `entries` if the stored revision still equals `expected_revision`
    /// (`None` meaning "no map yet"). Returns the new revision, or
    /// `PersistenceConflict` when another writer got there first.
    async fn save_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
        entries: &ParagraphMap,
        expected_revision: Option<u64>,
    ) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved { revision: u64, entries: usize },
    Unchanged,
    Dropped,
}

/// Reload, union and write back. A conflict is retried once; anything that
/// still fails is logged and dropped, costing only a future re-translation.
pub async fn persist_merged(
    store: &dyn ParagraphStore,
    document_id: &str,
    pair: &LanguagePair,
    new_entries: &ParagraphMap,
) -> PersistOutcome {
    if new_entries.is_empty() {
        return PersistOutcome::Unchanged;
    }

    for attempt in 1..=2 {
        let latest = match store.load_paragraph_map(document_id, pair).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("Failed to reload paragraph map for {} ({}): {}", document_id, pair, e);
                return PersistOutcome::Dropped;
            }
        };

        let (expected, mut merged) = match latest {
            Some(stored) => (Some(stored.revision), stored.entries),
            None => (None, ParagraphMap::new()),
        };
        merged.extend(new_entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        match store.save_paragraph_map(document_id, pair, &merged, expected).await {
            Ok(revision) => {
                debug!(
                    "Saved paragraph map for {} ({}) at revision {} with {} entries",
                    document_id,
                    pair,
                    revision,
                    merged.len()
                );
                return PersistOutcome::Saved {
                    revision,
                    entries: merged.len(),
                };
            }
            Err(ParatransError::PersistenceConflict(reason)) => {
                debug!("Paragraph map conflict on attempt {}: {}", attempt, reason);
            }
            Err(e) => {
                warn!("Failed to save paragraph map for {} ({}): {}", document_id, pair, e);
                return PersistOutcome::Dropped;
            }
        }
    }

    warn!(
        "Dropping paragraph map update for {} ({}) after a repeated conflict",
        document_id, pair
    );
    PersistOutcome::Dropped
}

/// In-process store, mainly for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryParagraphStore {
    maps: Mutex<HashMap<(String, LanguagePair), StoredParagraphMap>>,
}

impl MemoryParagraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a map directly, bumping its revision.
    pub fn insert(&self, document_id: &str, pair: &LanguagePair, entries: ParagraphMap) {
        let mut maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        let key = (document_id.to_string(), pair.clone());
        let revision = maps.get(&key).map(|m| m.revision).unwrap_or(0) + 1;
        maps.insert(key, StoredParagraphMap { revision, entries });
    }

    pub fn snapshot(&self, document_id: &str, pair: &LanguagePair) -> Option<StoredParagraphMap> {
        let maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        maps.get(&(document_id.to_string(), pair.clone())).cloned()
    }
}

#[async_trait]
impl ParagraphStore for MemoryParagraphStore {
    async fn load_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
    ) -> Result<Option<StoredParagraphMap>> {
        Ok(self.snapshot(document_id, pair))
    }

    async fn save_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
        entries: &ParagraphMap,
        expected_revision: Option<u64>,
    ) -> Result<u64> {
        let mut maps = self.maps.lock().unwrap_or_else(|e| e.into_inner());
        let key = (document_id.to_string(), pair.clone());
        let current = maps.get(&key).map(|m| m.revision);
        if current != expected_revision {
            return Err(ParatransError::PersistenceConflict(format!(
                "expected revision {:?}, found {:?}",
                expected_revision, current
            )));
        }
        let revision = current.unwrap_or(0) + 1;
        maps.insert(
            key,
            StoredParagraphMap {
                revision,
                entries: entries.clone(),
            },
        );
        Ok(revision)
    }
}

/// On-disk representation of one paragraph map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphRecord {
    pub document_id: String,
    pub language_pair: String,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    pub entries: ParagraphMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParagraphRecordSummary {
    pub document_id: String,
    pub language_pair: String,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    pub entries: usize,
    pub size_bytes: u64,
}

/// JSON files under one directory, one file per document and language pair.
pub struct FileParagraphStore {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileParagraphStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, document_id: &str, pair: &LanguagePair) -> PathBuf {
        let sanitize = |s: &str| -> String {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
                .collect()
        };
        self.root.join(format!(
            "{:x}-{}-{}.json",
            md5::compute(document_id.as_bytes()),
            sanitize(&pair.source),
            sanitize(&pair.target)
        ))
    }

    async fn read_record(path: &Path) -> Result<Option<ParagraphRecord>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<ParagraphRecord>(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring unreadable paragraph map {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Enumerate every stored map.
    pub fn list(&self) -> Result<Vec<ParagraphRecordSummary>> {
        let mut summaries = Vec::new();
        if !self.root.exists() {
            return Ok(summaries);
        }

        for entry in WalkDir::new(&self.root).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };
            if let Ok(record) = serde_json::from_str::<ParagraphRecord>(&content) {
                summaries.push(ParagraphRecordSummary {
                    document_id: record.document_id,
                    language_pair: record.language_pair,
                    revision: record.revision,
                    updated_at: record.updated_at,
                    entries: record.entries.len(),
                    size_bytes: content.len() as u64,
                });
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Remove every stored map, returning how many files were deleted.
    pub fn clear(&self) -> Result<usize> {
        let mut count = 0;
        if !self.root.exists() {
            return Ok(count);
        }
        for entry in WalkDir::new(&self.root).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().map_or(false, |ext| ext == "json") {
                std::fs::remove_file(path)?;
                count += 1;
            }
        }
        info!("Cleared {} paragraph maps from {}", count, self.root.display());
        Ok(count)
    }
}

#[async_trait]
impl ParagraphStore for FileParagraphStore {
    async fn load_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
    ) -> Result<Option<StoredParagraphMap>> {
        let path = self.path_for(document_id, pair);
        Ok(Self::read_record(&path).await?.map(|record| StoredParagraphMap {
            revision: record.revision,
            entries: record.entries,
        }))
    }

    async fn save_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
        entries: &ParagraphMap,
        expected_revision: Option<u64>,
    ) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let path = self.path_for(document_id, pair);

        let current = Self::read_record(&path).await?.map(|record| record.revision);
        if current != expected_revision {
            return Err(ParatransError::PersistenceConflict(format!(
                "{} is at revision {:?}, expected {:?}",
                path.display(),
                current,
                expected_revision
            )));
        }

        let record = ParagraphRecord {
            document_id: document_id.to_string(),
            language_pair: pair.to_string(),
            revision: current.unwrap_or(0) + 1,
            updated_at: Utc::now(),
            entries: entries.clone(),
        };
        let content = serde_json::to_string_pretty(&record)?;

        tokio::fs::create_dir_all(&self.root).await?;
        let root = self.root.clone();
        let target = path.clone();
        // Write to a temp file in the same directory and rename into place.
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.persist(&target).map_err(|e| ParatransError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| ParatransError::Store(format!("Paragraph map write task failed: {}", e)))??;

        Ok(record.revision)
    }
}
