//! The intelligence engine: fetch -> filter -> enrich -> persist, plus
//! analytics over the stored collection.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analyst::{GeminiAnalyst, ReasoningClient};
use crate::analytics::{self, AnalyticsPayload};
use crate::config::AetosConfig;
use crate::error::Result;
use crate::filter::RelevanceFilter;
use crate::ingest::{ArxivSource, DocumentSource, PatentSource};
use crate::pipeline::{ConcurrencyMode, EnrichmentPipeline, NoOpCallback, PipelineCallback};
use crate::store::{DocumentStore, UpsertStats};
use crate::types::Document;

/// Cap on records pulled for topic-scoped analytics.
const ANALYTICS_SEARCH_LIMIT: usize = 500;

/// Summary of one batch run, suitable for direct display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub topic: String,
    pub fetched: usize,
    pub eligible: usize,
    pub enriched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub status: String,
}

/// Owns the collaborators for a full ingestion-to-analytics run.
pub struct IntelligenceEngine {
    pipeline: EnrichmentPipeline,
    filter: RelevanceFilter,
    store: DocumentStore,
    sources: Vec<Box<dyn DocumentSource>>,
}

impl IntelligenceEngine {
    /// Wire up the default collaborators: Gemini analyst, SQLite store,
    /// arXiv and Google Patents sources.
    pub fn from_config(config: &AetosConfig, sequential: bool) -> Result<Self> {
        let analyst: Arc<dyn ReasoningClient> = Arc::new(GeminiAnalyst::from_config(&config.llm)?);
        let store = DocumentStore::open(&config.store.resolve_path()?)?;
        let sources: Vec<Box<dyn DocumentSource>> = vec![
            Box::new(ArxivSource::new(&config.ingest)?),
            Box::new(PatentSource::new(&config.ingest)?),
        ];
        Ok(Self::new(config, analyst, store, sources, sequential))
    }

    /// Assemble an engine from explicit collaborators.
    pub fn new(
        config: &AetosConfig,
        analyst: Arc<dyn ReasoningClient>,
        store: DocumentStore,
        sources: Vec<Box<dyn DocumentSource>>,
        sequential: bool,
    ) -> Self {
        let mode = if sequential {
            ConcurrencyMode::Sequential(Duration::from_secs(config.pipeline.pacing_delay_secs))
        } else {
            ConcurrencyMode::Bounded(config.pipeline.max_concurrency)
        };
        let filter = RelevanceFilter::from_config(&config.pipeline);
        let pipeline = EnrichmentPipeline::new(analyst, mode);
        Self {
            pipeline,
            filter,
            store,
            sources,
        }
    }

    /// Run a full batch for a topic: fetch up to `num_documents` candidates
    /// across all sources, enrich the eligible ones, and upsert the results.
    ///
    /// A source that fails to deliver is logged and skipped; an empty
    /// candidate set is a normal "no candidates" outcome, not an error.
    pub async fn run_batch(
        &self,
        topic: &str,
        num_documents: usize,
        callback: &dyn PipelineCallback,
    ) -> Result<BatchReport> {
        let per_source = (num_documents / self.sources.len().max(1)).max(1);
        let mut candidates: Vec<Document> = Vec::new();

        for source in &self.sources {
            match source.fetch(topic, per_source).await {
                Ok(docs) => {
                    info!(source = source.name(), count = docs.len(), "Source fetch complete");
                    candidates.extend(docs);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "Source fetch failed, continuing");
                }
            }
        }

        let fetched = candidates.len();
        if fetched == 0 {
            return Ok(BatchReport {
                topic: topic.to_string(),
                fetched: 0,
                eligible: 0,
                enriched: 0,
                inserted: 0,
                updated: 0,
                failed: 0,
                status: "no candidates found".to_string(),
            });
        }

        let eligible_docs = self.filter.filter_batch(candidates, topic);
        let eligible = eligible_docs.len();

        let records = self.pipeline.enrich_batch(eligible_docs, topic, callback).await?;
        let enriched = records.len();
        let stats = self.store.upsert_batch(&records)?;

        let status = batch_status(eligible, enriched, &stats);

        Ok(BatchReport {
            topic: topic.to_string(),
            fetched,
            eligible,
            enriched,
            inserted: stats.inserted,
            updated: stats.updated,
            failed: stats.failed,
            status,
        })
    }

    /// Convenience wrapper without progress reporting.
    pub async fn run_batch_silent(&self, topic: &str, num_documents: usize) -> Result<BatchReport> {
        self.run_batch(topic, num_documents, &NoOpCallback).await
    }

    /// Compute the analytics payload over the stored collection, optionally
    /// scoped to records matching a topic.
    pub fn analytics(&self, topic: Option<&str>) -> Result<AnalyticsPayload> {
        let records = match topic {
            Some(topic) => self.store.search(topic, ANALYTICS_SEARCH_LIMIT)?,
            None => self.store.all_records()?,
        };
        Ok(analytics::full_payload(&records))
    }

    /// Number of records currently stored.
    pub fn stored_count(&self) -> Result<usize> {
        Ok(self.store.count()?)
    }
}

fn batch_status(eligible: usize, enriched: usize, stats: &UpsertStats) -> String {
    if enriched == 0 {
        return "no documents could be enriched".to_string();
    }
    let mut status = format!(
        "enriched {enriched} of {eligible} eligible documents ({} new, {} updated)",
        stats.inserted, stats.updated
    );
    if stats.failed > 0 {
        status.push_str(&format!(", {} failed to store", stats.failed));
    }
    status
}
