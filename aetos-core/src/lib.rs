//! # AETOS Core
//!
//! Core library for the AETOS technology-intelligence engine.
//! Provides document ingestion (arXiv, Google Patents), LLM-backed
//! enrichment, the embedded document store, and aggregate analytics
//! (adoption S-curve, technology convergence, TRL trend).

pub mod analyst;
pub mod analytics;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root.
pub use analyst::{GeminiAnalyst, MockAnalyst, ReasoningClient};
pub use analytics::{
    AnalyticsPayload, ConvergencePair, SCurvePoint, TrlPoint, TrlTrend,
};
pub use config::{load_config, AetosConfig, IngestConfig, LlmConfig, PipelineConfig, StoreConfig};
pub use engine::{BatchReport, IntelligenceEngine};
pub use error::{AetosError, AnalysisError, ConfigError, IngestError, Result, StoreError};
pub use filter::{RejectReason, RelevanceFilter};
pub use ingest::{ArxivSource, DocumentSource, PatentSource};
pub use pipeline::{ConcurrencyMode, EnrichmentPipeline, NoOpCallback, PipelineCallback};
pub use store::{DocumentStore, UpsertStats};
pub use types::{Document, EnrichedRecord, EnrichmentResult, KeyRelationship, SourceType};
