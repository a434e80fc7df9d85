//! Batch enrichment orchestration.
//!
//! Dispatches already-filtered documents to the reasoning client and merges
//! the verdicts into records ready for the store. Documents whose analysis
//! degrades to a sentinel are dropped here so they never pollute analytics.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::analyst::ReasoningClient;
use crate::error::AnalysisError;
use crate::types::{Document, EnrichedRecord};

/// How enrichment requests are dispatched.
#[derive(Debug, Clone, Copy)]
pub enum ConcurrencyMode {
    /// Up to N requests in flight at once.
    Bounded(usize),
    /// One request at a time with a fixed delay between them, for strict
    /// rate-limit regimes.
    Sequential(Duration),
}

/// Progress notifications during a batch run.
pub trait PipelineCallback: Send + Sync {
    /// Called after each document finishes (enriched or dropped).
    fn on_progress(&self, processed: usize, total: usize);
}

/// Callback that does nothing.
pub struct NoOpCallback;

impl PipelineCallback for NoOpCallback {
    fn on_progress(&self, _processed: usize, _total: usize) {}
}

/// Orchestrates analyze -> merge for a batch of documents.
///
/// Callers are expected to run candidates through [`RelevanceFilter`]
/// first; the pipeline dispatches whatever it is handed.
///
/// [`RelevanceFilter`]: crate::filter::RelevanceFilter
pub struct EnrichmentPipeline {
    analyst: Arc<dyn ReasoningClient>,
    mode: ConcurrencyMode,
}

impl EnrichmentPipeline {
    pub fn new(analyst: Arc<dyn ReasoningClient>, mode: ConcurrencyMode) -> Self {
        Self { analyst, mode }
    }

    /// Run the batch. Returns only successfully enriched records.
    ///
    /// Sentinel results and per-document transient failures are logged and
    /// dropped. The only error that aborts the whole batch is a
    /// non-transient one (authentication), since retrying the remaining
    /// documents would fail identically.
    pub async fn enrich_batch(
        &self,
        docs: Vec<Document>,
        topic: &str,
        callback: &dyn PipelineCallback,
    ) -> Result<Vec<EnrichedRecord>, AnalysisError> {
        let total = docs.len();
        if total == 0 {
            info!(topic, "No documents eligible for enrichment");
            return Ok(Vec::new());
        }

        info!(
            topic,
            total,
            model = self.analyst.model_name(),
            "Starting enrichment batch"
        );

        let processed = AtomicUsize::new(0);
        let outcomes: Vec<Result<Option<EnrichedRecord>, AnalysisError>> = match self.mode {
            ConcurrencyMode::Bounded(limit) => {
                stream::iter(docs)
                    .map(|doc| self.enrich_one(doc, &processed, total, callback))
                    .buffer_unordered(limit.max(1))
                    .collect()
                    .await
            }
            ConcurrencyMode::Sequential(delay) => {
                let mut results = Vec::with_capacity(total);
                for (i, doc) in docs.into_iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(delay).await;
                    }
                    results.push(self.enrich_one(doc, &processed, total, callback).await);
                }
                results
            }
        };

        let mut records = Vec::new();
        for outcome in outcomes {
            if let Some(record) = outcome? {
                records.push(record);
            }
        }

        info!(
            topic,
            enriched = records.len(),
            dropped = total - records.len(),
            "Enrichment batch finished"
        );
        Ok(records)
    }

    async fn enrich_one(
        &self,
        doc: Document,
        processed: &AtomicUsize,
        total: usize,
        callback: &dyn PipelineCallback,
    ) -> Result<Option<EnrichedRecord>, AnalysisError> {
        let outcome = match self.analyst.analyze(&doc.summary).await {
            Ok(insight) if insight.is_sentinel() => {
                warn!(id = %doc.id, reason = %insight.strategic_summary, "Dropping unanalyzed document");
                Ok(None)
            }
            Ok(insight) => {
                debug!(id = %doc.id, trl = insight.technology_readiness_level, "Document enriched");
                Ok(Some(EnrichedRecord::from_parts(doc, insight)))
            }
            Err(e) if e.is_transient() => {
                // The client already retried; one stubborn document does not
                // sink the batch.
                warn!(id = %doc.id, error = %e, "Dropping document after analysis failure");
                Ok(None)
            }
            Err(e) => Err(e),
        };

        let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
        callback.on_progress(done, total);
        outcome
    }
}
