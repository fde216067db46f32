//! Scripted collaborators shared by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::cache::LanguagePair;
use crate::error::{ParatransError, Result};
use crate::store::{MemoryParagraphStore, ParagraphMap, ParagraphStore, StoredParagraphMap};
use crate::translate::{Block, Translator};

/// Translator whose replies, failures and latencies are fixed per input text.
///
/// Unscripted texts are upper-cased. Batch calls drop blocks whose text is
/// scripted to fail and return the rest.
#[derive(Default)]
pub struct ScriptedTranslator {
    replies: HashMap<String, String>,
    failures: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Option<Duration>,
    fail_batches: bool,
    unconfigured: bool,
    calls: Mutex<Vec<(String, Option<String>)>>,
    batches: Mutex<Vec<Vec<String>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTranslator {
    pub fn uppercase() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, text: &str, reply: &str) -> Self {
        self.replies.insert(text.to_string(), reply.to_string());
        self
    }

    pub fn failing(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = Some(delay);
        self
    }

    pub fn failing_batches(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.unconfigured = true;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, text: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(t, _)| t == text).count()
    }

    pub fn context_for(&self, text: &str) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| t == text)
            .and_then(|(_, context)| context.clone())
    }

    /// Block ids of every batch call, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, text: &str) -> String {
        self.replies
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_uppercase())
    }

    async fn simulate_latency(&self, text: &str) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(text).copied().or(self.default_delay) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Translator for ScriptedTranslator {
    fn check_configured(&self) -> Result<()> {
        if self.unconfigured {
            Err(ParatransError::Configuration("missing api_key".to_string()))
        } else {
            Ok(())
        }
    }

    async fn translate(
        &self,
        text: &str,
        _target_language: &str,
        context: Option<&str>,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), context.map(str::to_string)));
        self.simulate_latency(text).await;

        if self.failures.contains(text) {
            return Err(ParatransError::Translation(format!("scripted failure for {:?}", text)));
        }
        Ok(self.reply_for(text))
    }

    async fn translate_batch(
        &self,
        blocks: &[Block],
        _target_language: &str,
    ) -> Result<HashMap<String, String>> {
        self.batches
            .lock()
            .unwrap()
            .push(blocks.iter().map(|b| b.id.clone()).collect());
        let key = blocks.first().map(|b| b.text.as_str()).unwrap_or_default();
        self.simulate_latency(key).await;

        if self.fail_batches {
            return Err(ParatransError::Translation("scripted batch failure".to_string()));
        }
        Ok(blocks
            .iter()
            .filter(|block| !self.failures.contains(&block.text))
            .map(|block| (block.id.clone(), self.reply_for(&block.text)))
            .collect())
    }
}

/// Store that reports a conflict for the first `n` saves, then behaves.
pub struct ConflictingStore {
    inner: MemoryParagraphStore,
    conflicts_left: AtomicUsize,
    save_attempts: AtomicUsize,
}

impl ConflictingStore {
    pub fn new(conflicts: usize) -> Self {
        Self {
            inner: MemoryParagraphStore::new(),
            conflicts_left: AtomicUsize::new(conflicts),
            save_attempts: AtomicUsize::new(0),
        }
    }

    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ParagraphStore for ConflictingStore {
    async fn load_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
    ) -> Result<Option<StoredParagraphMap>> {
        self.inner.load_paragraph_map(document_id, pair).await
    }

    async fn save_paragraph_map(
        &self,
        document_id: &str,
        pair: &LanguagePair,
        entries: &ParagraphMap,
        expected_revision: Option<u64>,
    ) -> Result<u64> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts_left.store(remaining - 1, Ordering::SeqCst);
            return Err(ParatransError::PersistenceConflict("scripted conflict".to_string()));
        }
        self.inner
            .save_paragraph_map(document_id, pair, entries, expected_revision)
            .await
    }
}

/// Store whose every operation fails.
pub struct BrokenStore;

#[async_trait]
impl ParagraphStore for BrokenStore {
    async fn load_paragraph_map(
        &self,
        _document_id: &str,
        _pair: &LanguagePair,
    ) -> Result<Option<StoredParagraphMap>> {
        Err(ParatransError::Store("store unavailable".to_string()))
    }

    async fn save_paragraph_map(
        &self,
        _document_id: &str,
        _pair: &LanguagePair,
        _entries: &ParagraphMap,
        _expected_revision: Option<u64>,
    ) -> Result<u64> {
        Err(ParatransError::Store("store unavailable".to_string()))
    }
}
