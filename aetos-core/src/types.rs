//! Core data model: documents, enrichment results, and merged records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Where a document was ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Academic paper (arXiv).
    AcademicPaper,
    /// Patent filing (Google Patents).
    Patent,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::AcademicPaper => "academic_paper",
            SourceType::Patent => "patent",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "patent" | "google_patents" => SourceType::Patent,
            _ => SourceType::AcademicPaper,
        }
    }
}

/// A unit of raw evidence: one paper or patent as fetched from a source.
///
/// `id` is the canonical source URL and serves as the upsert key; source
/// adapters are responsible for making it collision-free across sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    /// The analysis substrate. Must meet the minimum-length threshold to be
    /// eligible for enrichment.
    pub summary: String,
    /// Publication date; `None` when the source date was unparseable.
    pub published: Option<NaiveDate>,
    pub authors: Vec<String>,
    pub source: SourceType,
}

/// A (subject, relationship, object) triple extracted by the reasoning
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRelationship {
    pub subject: String,
    pub relationship: String,
    pub object: String,
}

/// The reasoning service's verdict on one document.
///
/// A technology readiness level of 0 is a sentinel for "not analyzed /
/// analysis failed", never a genuine score. Optional contextual fields are
/// absent when not inferable from the text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub technology_readiness_level: u8,
    pub strategic_summary: String,
    pub technologies: Vec<String>,
    pub key_relationships: Vec<KeyRelationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_details: Option<String>,
}

impl EnrichmentResult {
    /// Build a sentinel "analysis did not succeed" result.
    pub fn sentinel(reason: impl Into<String>) -> Self {
        Self {
            technology_readiness_level: 0,
            strategic_summary: reason.into(),
            technologies: Vec::new(),
            key_relationships: Vec::new(),
            country: None,
            provider_company: None,
            funding_details: None,
        }
    }

    /// Whether this result marks a failed/skipped analysis.
    pub fn is_sentinel(&self) -> bool {
        self.technology_readiness_level == 0
    }
}

/// A document merged with its enrichment verdict, keyed by `Document::id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: Option<NaiveDate>,
    pub authors: Vec<String>,
    pub source: SourceType,
    pub technology_readiness_level: u8,
    pub strategic_summary: String,
    pub technologies: Vec<String>,
    pub key_relationships: Vec<KeyRelationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_details: Option<String>,
}

impl EnrichedRecord {
    /// Merge a document with its enrichment result.
    pub fn from_parts(doc: Document, insight: EnrichmentResult) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            summary: doc.summary,
            published: doc.published,
            authors: doc.authors,
            source: doc.source,
            technology_readiness_level: insight.technology_readiness_level,
            strategic_summary: insight.strategic_summary,
            technologies: insight.technologies,
            key_relationships: insight.key_relationships,
            country: insight.country,
            provider_company: insight.provider_company,
            funding_details: insight.funding_details,
        }
    }

    /// Publication year, if the date parsed.
    pub fn year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.published.map(|d| d.year())
    }
}
