//! Relevance filtering for candidate documents.
//!
//! Two independent gates run before any reasoning call is made: a quality
//! gate on summary length, and an optional topical gate that requires a
//! keyword from the query topic to appear in the title or summary.

use tracing::debug;

use crate::config::PipelineConfig;
use crate::types::Document;

/// Why a document was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Summary shorter than the configured minimum.
    SummaryTooShort,
    /// No topic keyword found in the title or summary.
    OffTopic,
}

/// Pure pre-enrichment filter. Construction is cheap; the filter holds no
/// I/O handles and can be cloned freely.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    min_summary_chars: usize,
    topic_gate: bool,
}

impl RelevanceFilter {
    pub fn new(min_summary_chars: usize, topic_gate: bool) -> Self {
        Self {
            min_summary_chars,
            topic_gate,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_summary_chars, config.topic_gate)
    }

    /// Check one document against the gates. `Ok(())` means eligible.
    ///
    /// The quality gate always runs first; the topical gate only applies
    /// when enabled and when the topic yields at least one keyword.
    pub fn check(&self, doc: &Document, topic: &str) -> Result<(), RejectReason> {
        if doc.summary.trim().chars().count() < self.min_summary_chars {
            return Err(RejectReason::SummaryTooShort);
        }

        if self.topic_gate && !self.matches_topic(doc, topic) {
            return Err(RejectReason::OffTopic);
        }

        Ok(())
    }

    /// Whether the document passes both gates.
    pub fn is_eligible(&self, doc: &Document, topic: &str) -> bool {
        self.check(doc, topic).is_ok()
    }

    /// Partition a batch into eligible documents, logging each rejection.
    pub fn filter_batch(&self, docs: Vec<Document>, topic: &str) -> Vec<Document> {
        let total = docs.len();
        let eligible: Vec<Document> = docs
            .into_iter()
            .filter(|doc| match self.check(doc, topic) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(id = %doc.id, ?reason, "Skipping document");
                    false
                }
            })
            .collect();
        debug!(total, eligible = eligible.len(), "Relevance filter applied");
        eligible
    }

    fn matches_topic(&self, doc: &Document, topic: &str) -> bool {
        let keywords: Vec<String> = topic
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        // A blank topic cannot gate anything.
        if keywords.is_empty() {
            return true;
        }
        let haystack = format!("{} {}", doc.title, doc.summary).to_lowercase();
        keywords.iter().any(|k| haystack.contains(k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;

    fn doc(title: &str, summary: &str) -> Document {
        Document {
            id: "https://example.org/1".to_string(),
            title: title.to_string(),
            summary: summary.to_string(),
            published: None,
            authors: vec![],
            source: SourceType::AcademicPaper,
        }
    }

    fn long_summary(lead: &str) -> String {
        format!("{lead} {}", "filler text ".repeat(20))
    }

    #[test]
    fn test_short_summary_rejected() {
        let filter = RelevanceFilter::new(150, true);
        let d = doc("Quantum sensing advances", "Too short.");
        assert_eq!(
            filter.check(&d, "quantum sensing"),
            Err(RejectReason::SummaryTooShort)
        );
    }

    #[test]
    fn test_length_gate_runs_before_topic_gate() {
        let filter = RelevanceFilter::new(150, true);
        // Off-topic AND short: the length rejection wins.
        let d = doc("Unrelated", "Short and unrelated.");
        assert_eq!(
            filter.check(&d, "quantum sensing"),
            Err(RejectReason::SummaryTooShort)
        );
    }

    #[test]
    fn test_topic_match_in_title() {
        let filter = RelevanceFilter::new(150, true);
        let d = doc("A survey of quantum error correction", &long_summary("Nothing topical here."));
        assert!(filter.check(&d, "quantum computing").is_ok());
    }

    #[test]
    fn test_topic_match_case_insensitive() {
        let filter = RelevanceFilter::new(150, true);
        let d = doc("Untitled", &long_summary("Advances in QUANTUM hardware."));
        assert!(filter.check(&d, "quantum computing").is_ok());
    }

    #[test]
    fn test_off_topic_rejected() {
        let filter = RelevanceFilter::new(150, true);
        let d = doc("Culinary techniques", &long_summary("Bread and pastry methods."));
        assert_eq!(
            filter.check(&d, "quantum computing"),
            Err(RejectReason::OffTopic)
        );
    }

    #[test]
    fn test_topic_gate_disabled() {
        let filter = RelevanceFilter::new(150, false);
        let d = doc("Culinary techniques", &long_summary("Bread and pastry methods."));
        assert!(filter.check(&d, "quantum computing").is_ok());
    }

    #[test]
    fn test_short_keywords_count() {
        let filter = RelevanceFilter::new(150, true);
        // Every whitespace-split token gates, including short ones like
        // "ai" or "5g".
        let d = doc("Scaling ai systems", &long_summary("Large models in production."));
        assert!(filter.is_eligible(&d, "ai alignment"));

        let e = doc("5g base stations", &long_summary("Radio access hardware."));
        assert!(filter.is_eligible(&e, "5g networks"));

        let f = doc("Untitled", &long_summary("No matching token anywhere."));
        assert_eq!(filter.check(&f, "ai alignment"), Err(RejectReason::OffTopic));
    }

    #[test]
    fn test_blank_topic_does_not_gate() {
        let filter = RelevanceFilter::new(150, true);
        let d = doc("Untitled", &long_summary("Anything at all."));
        assert!(filter.check(&d, "   ").is_ok());
    }

    #[test]
    fn test_filter_batch_partitions() {
        let filter = RelevanceFilter::new(150, true);
        let docs = vec![
            doc("Quantum networks", &long_summary("Entanglement distribution at scale.")),
            doc("Too short", "tiny"),
            doc("Gardening", &long_summary("Soil and seeds.")),
        ];
        let kept = filter.filter_batch(docs, "quantum networking");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].title, "Quantum networks");
    }
}
