//! Bounded-concurrency translation of segment lists.
//!
//! A `Job` is the arena for one run: its segments, its ephemeral cache tier and
//! the rolling array of translated-context slots. Jobs are consumed by
//! `Orchestrator::run` / `Orchestrator::stream`, so two runs can never share
//! one arena. Cross-job memoization goes through the orchestrator's
//! `SharedCache` instead.
//!
//! Context hints are best-effort: a unit reads whatever preceding slots are
//! filled when it starts, and a predecessor still in flight simply contributes
//! nothing. Units never wait on each other.

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{CacheStats, EphemeralCache, LanguagePair, SharedCache};
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::segment::Segment;
use crate::translate::Translator;

/// Outcome for one segment. Exactly one is produced per input segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub translated: String,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranslatedSegment {
    fn passthrough(segment: Segment) -> Self {
        Self {
            translated: segment.content.clone(),
            segment,
            from_cache: false,
            error: None,
        }
    }

    fn cached(segment: Segment, translated: String) -> Self {
        Self {
            segment,
            translated,
            from_cache: true,
            error: None,
        }
    }

    fn fresh(segment: Segment, translated: String) -> Self {
        Self {
            segment,
            translated,
            from_cache: false,
            error: None,
        }
    }

    /// Degrade to the original content and keep the failure description.
    fn failed(segment: Segment, error: String) -> Self {
        Self {
            translated: segment.content.clone(),
            segment,
            from_cache: false,
            error: Some(error),
        }
    }

    pub fn index(&self) -> usize {
        self.segment.index
    }

    /// Translated by the provider during this run (not cached, not code, no error).
    pub fn is_fresh(&self) -> bool {
        !self.from_cache && !self.segment.is_code && self.error.is_none()
    }
}

/// One run's worth of segments plus its private cache tier.
#[derive(Debug)]
pub struct Job {
    segments: Vec<Segment>,
    pair: LanguagePair,
    cache: EphemeralCache,
}

impl Job {
    pub fn new(segments: Vec<Segment>, pair: LanguagePair) -> Self {
        Self {
            segments,
            pair,
            cache: EphemeralCache::new(),
        }
    }

    /// Pre-seed the ephemeral tier, e.g. from a persisted paragraph map.
    pub fn seed<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let pair = self.pair.clone();
        self.cache.extend(&pair, entries);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

struct JobState {
    cache: EphemeralCache,
    contexts: Vec<String>,
}

struct RunningJob {
    id: Uuid,
    pair: LanguagePair,
    state: Mutex<JobState>,
}

impl RunningJob {
    fn with_state<R>(&self, f: impl FnOnce(&mut JobState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

/// Streaming results in completion order.
///
/// The channel closes only after every dispatched unit has finished, so
/// `None` from `next` means the job is complete. Dropping the stream early does
/// not cancel in-flight units.
pub struct SegmentStream {
    receiver: mpsc::UnboundedReceiver<TranslatedSegment>,
    driver: JoinHandle<()>,
    total: usize,
}

impl SegmentStream {
    pub fn total(&self) -> usize {
        self.total
    }

    pub async fn next(&mut self) -> Option<TranslatedSegment> {
        self.receiver.recv().await
    }

    /// Drain the stream and restore index order.
    pub async fn collect_sorted(mut self) -> Vec<TranslatedSegment> {
        let mut results = Vec::with_capacity(self.total);
        while let Some(result) = self.receiver.recv().await {
            results.push(result);
        }
        if let Err(e) = self.driver.await {
            warn!("Segment stream driver ended abnormally: {}", e);
        }
        results.sort_by_key(TranslatedSegment::index);
        results
    }

    /// Stop reading but wait until every dispatched unit has completed.
    pub async fn finish(self) {
        drop(self.receiver);
        if let Err(e) = self.driver.await {
            warn!("Segment stream driver ended abnormally: {}", e);
        }
    }
}

impl Stream for SegmentStream {
    type Item = TranslatedSegment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Coordinates cache lookups, bounded dispatch and context propagation.
#[derive(Clone)]
pub struct Orchestrator {
    translator: Arc<dyn Translator>,
    config: OrchestratorConfig,
    shared: SharedCache,
}

impl Orchestrator {
    pub fn new(translator: Arc<dyn Translator>, config: OrchestratorConfig) -> Self {
        Self::with_shared_cache(translator, config, SharedCache::new())
    }

    pub fn with_shared_cache(
        translator: Arc<dyn Translator>,
        config: OrchestratorConfig,
        shared: SharedCache,
    ) -> Self {
        Self {
            translator,
            config,
            shared,
        }
    }

    pub fn shared_cache(&self) -> &SharedCache {
        &self.shared
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.stats()
    }

    pub fn clear_cache(&self) {
        self.shared.clear();
    }

    /// Translate and return results in index order.
    pub async fn translate_segments(
        &self,
        segments: Vec<Segment>,
        pair: &LanguagePair,
    ) -> Result<Vec<TranslatedSegment>> {
        self.run(Job::new(segments, pair.clone())).await
    }

    /// Translate, yielding each result as it completes.
    pub async fn translate_segments_stream(
        &self,
        segments: Vec<Segment>,
        pair: &LanguagePair,
    ) -> Result<SegmentStream> {
        self.stream(Job::new(segments, pair.clone()))
    }

    /// Batch form: awaits every unit, results pre-slotted by position.
    pub async fn run(&self, job: Job) -> Result<Vec<TranslatedSegment>> {
        let (running, segments) = self.prepare(job)?;
        let span = info_span!("job", id = %running.id, pair = %running.pair, segments = segments.len());

        let mut results: Vec<Option<TranslatedSegment>> = (0..segments.len()).map(|_| None).collect();
        self.drive(&running, segments, |slot, result| results[slot] = Some(result))
            .instrument(span)
            .await;

        Ok(results.into_iter().flatten().collect())
    }

    /// Streaming form: units run on a spawned driver that outlives the consumer.
    pub fn stream(&self, job: Job) -> Result<SegmentStream> {
        let (running, segments) = self.prepare(job)?;
        let total = segments.len();
        let span = info_span!("job", id = %running.id, pair = %running.pair, segments = total);

        let (sender, receiver) = mpsc::unbounded_channel();
        let this = self.clone();
        let driver = tokio::spawn(
            async move {
                this.drive(&running, segments, move |_, result| {
                    // The consumer may have gone away; units still run to completion.
                    let _ = sender.send(result);
                })
                .await;
            }
            .instrument(span),
        );

        Ok(SegmentStream {
            receiver,
            driver,
            total,
        })
    }

    fn prepare(&self, job: Job) -> Result<(RunningJob, Vec<Segment>)> {
        let Job {
            segments,
            pair,
            cache,
        } = job;

        let needs_translator = segments.iter().any(|segment| {
            !segment.is_code
                && cache.get(&pair, &segment.hash).is_none()
                && self.shared.get(&pair, &segment.hash).is_none()
        });
        if needs_translator {
            self.translator.check_configured()?;
        }

        let running = RunningJob {
            id: Uuid::new_v4(),
            pair,
            state: Mutex::new(JobState {
                cache,
                contexts: vec![String::new(); segments.len()],
            }),
        };
        Ok((running, segments))
    }

    async fn drive<F>(&self, job: &RunningJob, segments: Vec<Segment>, mut emit: F)
    where
        F: FnMut(usize, TranslatedSegment),
    {
        let total = segments.len();
        info!("Translating {} segments to {}", total, job.pair.target);

        let gate = Semaphore::new(self.config.max_concurrent.max(1));
        let mut units: FuturesUnordered<_> = segments
            .into_iter()
            .enumerate()
            .map(|(slot, segment)| {
                let gate = &gate;
                async move { (slot, self.translate_unit(job, gate, slot, segment).await) }
            })
            .collect();

        let mut failed = 0;
        let mut cached = 0;
        while let Some((slot, result)) = units.next().await {
            if result.error.is_some() {
                failed += 1;
            }
            if result.from_cache {
                cached += 1;
            }
            emit(slot, result);
        }

        info!(
            "Job finished: {} segments, {} from cache, {} failed",
            total, cached, failed
        );
    }

    async fn translate_unit(
        &self,
        job: &RunningJob,
        gate: &Semaphore,
        slot: usize,
        segment: Segment,
    ) -> TranslatedSegment {
        // The gate is never closed, so acquisition cannot fail.
        let _permit = gate.acquire().await.ok();

        if segment.is_code {
            return TranslatedSegment::passthrough(segment);
        }

        if let Some(hit) = self.lookup(job, &segment.hash) {
            job.with_state(|state| state.contexts[slot] = hit.clone());
            debug!("Segment {} served from cache", segment.index);
            return TranslatedSegment::cached(segment, hit);
        }

        let context = job.with_state(|state| {
            build_context(
                &state.contexts,
                slot,
                self.config.context_window,
                self.config.context_chars,
            )
        });

        match self
            .translator
            .translate(&segment.content, &job.pair.target, context.as_deref())
            .await
        {
            Ok(translated) => {
                job.with_state(|state| {
                    state.cache.put(&job.pair, segment.hash.clone(), translated.clone());
                    state.contexts[slot] = translated.clone();
                });
                self.shared.put(&job.pair, segment.hash.clone(), translated.clone());
                TranslatedSegment::fresh(segment, translated)
            }
            Err(e) => {
                warn!("Segment {} failed, keeping original: {}", segment.index, e);
                TranslatedSegment::failed(segment, e.to_string())
            }
        }
    }

    fn lookup(&self, job: &RunningJob, hash: &str) -> Option<String> {
        if let Some(hit) = job.with_state(|state| state.cache.get(&job.pair, hash).map(str::to_string)) {
            return Some(hit);
        }
        let hit = self.shared.get(&job.pair, hash)?;
        job.with_state(|state| state.cache.put(&job.pair, hash, hit.clone()));
        Some(hit)
    }
}

/// Up to `window` preceding filled slots, each cut to `max_chars` characters.
fn build_context(contexts: &[String], slot: usize, window: usize, max_chars: usize) -> Option<String> {
    if window == 0 {
        return None;
    }
    let parts: Vec<String> = contexts[slot.saturating_sub(window)..slot]
        .iter()
        .filter(|text| !text.is_empty())
        .map(|text| {
            let mut truncated: String = text.chars().take(max_chars).collect();
            if text.chars().count() > max_chars {
                truncated.push_str("...");
            }
            format!("[Previous]: {}", truncated)
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}
