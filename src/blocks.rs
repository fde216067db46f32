//! Cache-backed batch flow over caller-identified blocks.
//!
//! Hits from the persisted paragraph map are replayed immediately; misses are
//! multiplexed into `translate_batch` calls of `batch_size` blocks each. Every
//! run ends with a `done` event, however many blocks failed.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::LanguagePair;
use crate::config::BlocksConfig;
use crate::error::Result;
use crate::store::{persist_merged, ParagraphMap, ParagraphStore};
use crate::translate::{Block, Translator};

/// Incremental progress of one batch flow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TranslationEvent {
    Progress {
        total: usize,
        completed: usize,
        cached: usize,
    },
    Translation {
        id: String,
        text: String,
    },
    Error {
        id: String,
        error: String,
    },
    Done {
        total: usize,
        success: usize,
        failed: usize,
        cached: usize,
    },
}

impl TranslationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TranslationEvent::Progress { .. } => "progress",
            TranslationEvent::Translation { .. } => "translation",
            TranslationEvent::Error { .. } => "error",
            TranslationEvent::Done { .. } => "done",
        }
    }

    /// JSON payload without the event tag.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            TranslationEvent::Progress {
                total,
                completed,
                cached,
            } => serde_json::json!({ "total": total, "completed": completed, "cached": cached }),
            TranslationEvent::Translation { id, text } => serde_json::json!({ "id": id, "text": text }),
            TranslationEvent::Error { id, error } => serde_json::json!({ "id": id, "error": error }),
            TranslationEvent::Done {
                total,
                success,
                failed,
                cached,
            } => serde_json::json!({
                "total": total,
                "success": success,
                "failed": failed,
                "cached": cached,
            }),
        }
    }

    /// Server-sent-events frame: `event: <name>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name(), self.payload())
    }
}

/// Counters reported by the terminal `done` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub cached: usize,
}

pub struct BlockFlow {
    translator: Arc<dyn Translator>,
    store: Arc<dyn ParagraphStore>,
    config: BlocksConfig,
    max_concurrent: usize,
}

impl BlockFlow {
    pub fn new(
        translator: Arc<dyn Translator>,
        store: Arc<dyn ParagraphStore>,
        config: BlocksConfig,
        max_concurrent: usize,
    ) -> Self {
        Self {
            translator,
            store,
            config,
            max_concurrent,
        }
    }

    /// Run the flow, reporting through `events`.
    ///
    /// The only error is a `Configuration` failure, raised before any event
    /// when there is at least one miss to translate. A dropped receiver does
    /// not stop the run.
    pub async fn run(
        &self,
        document_id: &str,
        pair: &LanguagePair,
        blocks: Vec<Block>,
        events: mpsc::UnboundedSender<TranslationEvent>,
    ) -> Result<BlockSummary> {
        let span = info_span!("blocks", id = %Uuid::new_v4(), document = document_id, pair = %pair);
        self.run_inner(document_id, pair, blocks, events)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        document_id: &str,
        pair: &LanguagePair,
        blocks: Vec<Block>,
        events: mpsc::UnboundedSender<TranslationEvent>,
    ) -> Result<BlockSummary> {
        let emit = |event: TranslationEvent| {
            let _ = events.send(event);
        };

        let existing = match self.store.load_paragraph_map(document_id, pair).await {
            Ok(stored) => stored.map(|s| s.entries).unwrap_or_default(),
            Err(e) => {
                warn!("Could not load paragraph map for {}, treating as empty: {}", document_id, e);
                ParagraphMap::new()
            }
        };

        // One outcome per id; the first occurrence wins.
        let requested = blocks.len();
        let mut seen = HashSet::new();
        let blocks: Vec<Block> = blocks
            .into_iter()
            .filter(|block| seen.insert(block.id.clone()))
            .collect();
        if blocks.len() < requested {
            debug!("Collapsed {} repeated block ids", requested - blocks.len());
        }

        let total = blocks.len();
        let (hits, misses): (Vec<Block>, Vec<Block>) = blocks
            .into_iter()
            .partition(|block| existing.get(&block.id).map_or(false, |t| !t.is_empty()));

        if !misses.is_empty() {
            self.translator.check_configured()?;
        }

        let mut summary = BlockSummary {
            total,
            cached: hits.len(),
            success: hits.len(),
            failed: 0,
        };
        info!(
            "Translating {} blocks for {}: {} cached, {} to translate",
            total,
            document_id,
            hits.len(),
            misses.len()
        );

        emit(TranslationEvent::Progress {
            total,
            completed: 0,
            cached: hits.len(),
        });
        for hit in &hits {
            if let Some(text) = existing.get(&hit.id) {
                emit(TranslationEvent::Translation {
                    id: hit.id.clone(),
                    text: text.clone(),
                });
            }
        }

        let batch_size = self.config.batch_size.max(1);
        let target = pair.target.as_str();
        let mut outcomes = stream::iter(misses.chunks(batch_size))
            .map(|batch| async move {
                let result = self.translator.translate_batch(batch, target).await;
                (batch, result)
            })
            .buffer_unordered(self.max_concurrent.max(1));

        let mut staged = ParagraphMap::new();
        while let Some((batch, result)) = outcomes.next().await {
            match result {
                Ok(mut translated) => {
                    debug!("Batch of {} returned {} translations", batch.len(), translated.len());
                    for block in batch {
                        match translated.remove(&block.id) {
                            Some(text) => {
                                staged.insert(block.id.clone(), text.clone());
                                summary.success += 1;
                                emit(TranslationEvent::Translation {
                                    id: block.id.clone(),
                                    text,
                                });
                            }
                            None => {
                                summary.failed += 1;
                                emit(TranslationEvent::Error {
                                    id: block.id.clone(),
                                    error: "Missing from translation response".to_string(),
                                });
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Batch of {} blocks failed: {}", batch.len(), e);
                    let message = e.to_string();
                    for block in batch {
                        summary.failed += 1;
                        emit(TranslationEvent::Error {
                            id: block.id.clone(),
                            error: message.clone(),
                        });
                    }
                }
            }
        }
        drop(outcomes);

        let outcome = persist_merged(self.store.as_ref(), document_id, pair, &staged).await;
        debug!("Paragraph map persistence: {:?}", outcome);

        emit(TranslationEvent::Done {
            total: summary.total,
            success: summary.success,
            failed: summary.failed,
            cached: summary.cached,
        });
        info!(
            "Blocks finished: {} success, {} failed, {} cached",
            summary.success, summary.failed, summary.cached
        );
        Ok(summary)
    }
}

/// Collect every event of a finished run.
pub fn drain_events(receiver: &mut mpsc::UnboundedReceiver<TranslationEvent>) -> Vec<TranslationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParatransError;
    use crate::store::MemoryParagraphStore;
    use crate::test_util::{BrokenStore, ScriptedTranslator};

    fn pair() -> LanguagePair {
        LanguagePair::new("en", "zh")
    }

    fn blocks(n: usize) -> Vec<Block> {
        (1..=n).map(|i| Block::new(format!("b{}", i), format!("text {}", i))).collect()
    }

    fn flow(translator: Arc<ScriptedTranslator>, store: Arc<dyn ParagraphStore>) -> BlockFlow {
        BlockFlow::new(translator, store, BlocksConfig { batch_size: 2 }, 2)
    }

    async fn run(flow: &BlockFlow, blocks: Vec<Block>) -> (Result<BlockSummary>, Vec<TranslationEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = flow.run("doc", &pair(), blocks, tx).await;
        (result, drain_events(&mut rx))
    }

    #[test]
    fn test_sse_framing() {
        let event = TranslationEvent::Translation {
            id: "a".to_string(),
            text: "你好".to_string(),
        };
        assert_eq!(event.to_sse(), "event: translation\ndata: {\"id\":\"a\",\"text\":\"你好\"}\n\n");

        let done = TranslationEvent::Done {
            total: 2,
            success: 1,
            failed: 1,
            cached: 0,
        };
        assert_eq!(done.name(), "done");
        assert_eq!(
            done.payload(),
            serde_json::json!({ "total": 2, "success": 1, "failed": 1, "cached": 0 })
        );
    }

    #[tokio::test]
    async fn test_hits_are_emitted_before_any_translation_call() {
        let store = Arc::new(MemoryParagraphStore::new());
        store.insert("doc", &pair(), [("b1".to_string(), "一".to_string())].into_iter().collect());
        let translator = Arc::new(ScriptedTranslator::uppercase());

        let (result, events) = run(&flow(translator.clone(), store.clone()), blocks(3)).await;
        let summary = result.unwrap();

        assert_eq!(
            events[0],
            TranslationEvent::Progress {
                total: 3,
                completed: 0,
                cached: 1
            }
        );
        assert_eq!(
            events[1],
            TranslationEvent::Translation {
                id: "b1".to_string(),
                text: "一".to_string()
            }
        );
        assert_eq!(summary, BlockSummary { total: 3, success: 3, failed: 0, cached: 1 });
        assert_eq!(translator.batches(), vec![vec!["b2".to_string(), "b3".to_string()]]);

        let stored = store.snapshot("doc", &pair()).unwrap();
        assert_eq!(stored.entries.len(), 3);
        assert_eq!(stored.entries["b2"], "TEXT 2");
    }

    #[tokio::test]
    async fn test_total_provider_failure_still_reaches_done() {
        let store = Arc::new(MemoryParagraphStore::new());
        let translator = Arc::new(ScriptedTranslator::uppercase().failing_batches());

        let (result, events) = run(&flow(translator, store.clone()), blocks(5)).await;
        let summary = result.unwrap();

        let errors = events
            .iter()
            .filter(|e| matches!(e, TranslationEvent::Error { .. }))
            .count();
        assert_eq!(errors, 5);
        assert_eq!(
            events.last(),
            Some(&TranslationEvent::Done {
                total: 5,
                success: 0,
                failed: 5,
                cached: 0
            })
        );
        assert_eq!(summary.failed, 5);
        assert!(store.snapshot("doc", &pair()).is_none());
    }

    #[tokio::test]
    async fn test_missing_ids_fail_individually() {
        let store = Arc::new(MemoryParagraphStore::new());
        let translator = Arc::new(ScriptedTranslator::uppercase().failing("text 2").failing("text 4"));

        let (result, events) = run(&flow(translator, store.clone()), blocks(5)).await;
        let summary = result.unwrap();

        assert_eq!(summary, BlockSummary { total: 5, success: 3, failed: 2, cached: 0 });
        let mut failed_ids: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                TranslationEvent::Error { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        failed_ids.sort();
        assert_eq!(failed_ids, vec!["b2", "b4"]);

        let stored = store.snapshot("doc", &pair()).unwrap();
        assert_eq!(stored.entries.keys().collect::<Vec<_>>(), vec!["b1", "b3", "b5"]);
    }

    #[tokio::test]
    async fn test_existing_entries_survive_persistence() {
        let store = Arc::new(MemoryParagraphStore::new());
        store.insert("doc", &pair(), [("other".to_string(), "旧".to_string())].into_iter().collect());
        let translator = Arc::new(ScriptedTranslator::uppercase());

        run(&flow(translator, store.clone()), blocks(1)).await.0.unwrap();

        let stored = store.snapshot("doc", &pair()).unwrap();
        assert_eq!(stored.entries["other"], "旧");
        assert_eq!(stored.entries["b1"], "TEXT 1");
    }

    #[tokio::test]
    async fn test_unconfigured_translator_fails_before_events() {
        let store = Arc::new(MemoryParagraphStore::new());
        let translator = Arc::new(ScriptedTranslator::uppercase().unconfigured());

        let (result, events) = run(&flow(translator, store), blocks(2)).await;
        assert!(matches!(result, Err(ParatransError::Configuration(_))));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_all_hits_need_no_configuration() {
        let store = Arc::new(MemoryParagraphStore::new());
        store.insert("doc", &pair(), [("b1".to_string(), "一".to_string())].into_iter().collect());
        let translator = Arc::new(ScriptedTranslator::uppercase().unconfigured());

        let (result, events) = run(&flow(translator, store), blocks(1)).await;
        assert_eq!(result.unwrap().cached, 1);
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_repeated_ids_are_reported_once() {
        let store = Arc::new(MemoryParagraphStore::new());
        let translator = Arc::new(ScriptedTranslator::uppercase());
        let input = vec![
            Block::new("h", "same para"),
            Block::new("h", "same para"),
            Block::new("x", "other"),
        ];

        let (result, events) = run(&flow(translator.clone(), store.clone()), input).await;

        assert_eq!(result.unwrap(), BlockSummary { total: 2, success: 2, failed: 0, cached: 0 });
        assert!(!events.iter().any(|e| matches!(e, TranslationEvent::Error { .. })));
        let translated: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                TranslationEvent::Translation { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(translated, vec!["h", "x"]);
        assert_eq!(translator.batches(), vec![vec!["h".to_string(), "x".to_string()]]);
    }

    #[tokio::test]
    async fn test_repeated_hits_are_replayed_once() {
        let store = Arc::new(MemoryParagraphStore::new());
        store.insert("doc", &pair(), [("h".to_string(), "同".to_string())].into_iter().collect());
        let translator = Arc::new(ScriptedTranslator::uppercase().unconfigured());
        let input = vec![Block::new("h", "same para"), Block::new("h", "same para")];

        let (result, events) = run(&flow(translator, store), input).await;

        assert_eq!(result.unwrap(), BlockSummary { total: 1, success: 1, failed: 0, cached: 1 });
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_misses() {
        let translator = Arc::new(ScriptedTranslator::uppercase());
        let (result, events) = run(&flow(translator, Arc::new(BrokenStore)), blocks(2)).await;
        assert_eq!(result.unwrap().success, 2);
        assert!(matches!(events.last(), Some(TranslationEvent::Done { .. })));
    }
}
