use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::LanguagePair;
use crate::config::{Config, SegmenterConfig};
use crate::error::Result;
use crate::merge::{merge, merge_bilingual};
use crate::orchestrator::{Job, Orchestrator, TranslatedSegment};
use crate::segment;
use crate::store::{persist_merged, FileParagraphStore, ParagraphMap, ParagraphStore, PersistOutcome};
use crate::translate::{Translator, TranslatorFactory};

/// How translated segments are put back together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Replace,
    Bilingual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub text: String,
    pub segments: usize,
    pub translated: usize,
    pub cached: usize,
    pub failed: usize,
    pub persisted: PersistOutcome,
}

/// Segment, translate, persist and render whole documents.
pub struct DocumentWorkflow {
    orchestrator: Orchestrator,
    store: Arc<dyn ParagraphStore>,
    segmenter: SegmenterConfig,
}

impl DocumentWorkflow {
    pub fn new(config: Config) -> Result<Self> {
        let translator = TranslatorFactory::create_translator(config.translator.clone())?;
        let store = Arc::new(FileParagraphStore::new(&config.store.path));
        Ok(Self::with_components(translator, store, &config))
    }

    pub fn with_components(
        translator: Arc<dyn Translator>,
        store: Arc<dyn ParagraphStore>,
        config: &Config,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(translator, config.orchestrator.clone()),
            store,
            segmenter: config.segmenter.clone(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Translate one document.
    ///
    /// `on_segment` is called with each result as it completes, plus the number
    /// of completed segments and the total. Completion order is arbitrary; the
    /// rendered text always follows segment order.
    pub async fn translate_document<F>(
        &self,
        document_id: &str,
        text: &str,
        pair: &LanguagePair,
        mode: RenderMode,
        mut on_segment: F,
    ) -> Result<DocumentOutcome>
    where
        F: FnMut(&TranslatedSegment, usize, usize),
    {
        if text.trim().is_empty() {
            return Ok(DocumentOutcome {
                text: text.to_string(),
                segments: 0,
                translated: 0,
                cached: 0,
                failed: 0,
                persisted: PersistOutcome::Unchanged,
            });
        }

        let segments = segment::split(
            text,
            self.segmenter.max_length,
            self.segmenter.preserve_structure,
        );
        info!("Document {} split into {} segments", document_id, segments.len());

        let mut job = Job::new(segments, pair.clone());
        match self.store.load_paragraph_map(document_id, pair).await {
            Ok(Some(stored)) => job.seed(stored.entries),
            Ok(None) => {}
            Err(e) => warn!("Could not load paragraph map for {}: {}", document_id, e),
        }

        let mut stream = self.orchestrator.stream(job)?;
        let total = stream.total();
        let mut results = Vec::with_capacity(total);
        while let Some(result) = stream.next().await {
            on_segment(&result, results.len() + 1, total);
            results.push(result);
        }
        stream.finish().await;
        results.sort_by_key(TranslatedSegment::index);

        let fresh: ParagraphMap = results
            .iter()
            .filter(|r| r.is_fresh())
            .map(|r| (r.segment.hash.clone(), r.translated.clone()))
            .collect();
        let persisted = persist_merged(self.store.as_ref(), document_id, pair, &fresh).await;

        let rendered = match mode {
            RenderMode::Replace => merge(&results),
            RenderMode::Bilingual => merge_bilingual(&results),
        };

        let outcome = DocumentOutcome {
            text: rendered,
            segments: results.len(),
            translated: results.iter().filter(|r| r.is_fresh()).count(),
            cached: results.iter().filter(|r| r.from_cache).count(),
            failed: results.iter().filter(|r| r.error.is_some()).count(),
            persisted,
        };
        info!(
            "Document {} translated: {} new, {} cached, {} failed",
            document_id, outcome.translated, outcome.cached, outcome.failed
        );
        Ok(outcome)
    }
}
