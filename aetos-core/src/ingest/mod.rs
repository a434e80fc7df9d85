//! Document ingestion sources.
//!
//! Each source fetches raw candidate documents for a topic. Sources share
//! the `DocumentSource` trait so the engine can treat arXiv and Google
//! Patents uniformly and tests can substitute a scripted source.

pub mod arxiv;
pub mod patents;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::types::Document;

pub use arxiv::ArxivSource;
pub use patents::PatentSource;

/// A provider of raw documents for a topic.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Source name, for logging and error messages.
    fn name(&self) -> &str;

    /// Fetch up to `max_results` documents about `topic`.
    async fn fetch(&self, topic: &str, max_results: usize) -> Result<Vec<Document>, IngestError>;
}
