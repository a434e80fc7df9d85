//! arXiv ingestion source: HTTP client and Atom XML parsing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ingest::DocumentSource;
use crate::types::{Document, SourceType};

const ARXIV_API_BASE: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = "aetos/0.3 (https://github.com/aetos-intel/aetos)";
const SOURCE_NAME: &str = "arxiv";

/// arXiv Atom API client.
///
/// Queries `all:<topic>` sorted by submission date descending and enforces
/// a courtesy delay between requests, per the arXiv API usage policy.
pub struct ArxivSource {
    client: reqwest::Client,
    courtesy_delay: Duration,
    last_request: std::sync::Mutex<Option<Instant>>,
}

impl ArxivSource {
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::RequestFailed {
                source_name: SOURCE_NAME.to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            courtesy_delay: Duration::from_secs(config.arxiv_courtesy_secs),
            last_request: std::sync::Mutex::new(None),
        })
    }

    /// Enforce the minimum delay between consecutive arXiv requests.
    async fn rate_limit(&self) {
        let wait_duration = {
            let last = match self.last_request.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match *last {
                Some(instant) if instant.elapsed() < self.courtesy_delay => {
                    Some(self.courtesy_delay - instant.elapsed())
                }
                _ => None,
            }
        }; // MutexGuard is dropped here before any .await

        if let Some(wait) = wait_duration {
            tokio::time::sleep(wait).await;
        }

        let mut last = match self.last_request.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl DocumentSource for ArxivSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, topic: &str, max_results: usize) -> Result<Vec<Document>, IngestError> {
        self.rate_limit().await;
        let url = build_query_url(topic, max_results);
        debug!(url, "arXiv query");

        let response =
            self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| IngestError::RequestFailed {
                    source_name: SOURCE_NAME.to_string(),
                    message: e.to_string(),
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::BadStatus {
                source_name: SOURCE_NAME.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| IngestError::ParseFailed {
            source_name: SOURCE_NAME.to_string(),
            message: format!("Failed to read response body: {}", e),
        })?;

        Ok(parse_feed(&body))
    }
}

/// Build the Atom query URL for a topic.
fn build_query_url(topic: &str, max_results: usize) -> String {
    format!(
        "{}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
        ARXIV_API_BASE,
        urlencoding::encode(&format!("all:{topic}")),
        max_results,
    )
}

/// Parse an Atom feed into documents, skipping entries missing any of the
/// required fields.
fn parse_feed(xml: &str) -> Vec<Document> {
    extract_entries(xml)
        .iter()
        .filter_map(|entry| parse_entry(entry))
        .collect()
}

/// Extract all <entry>...</entry> blocks from the XML.
fn extract_entries(xml: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut search_from = 0;

    loop {
        let start_tag = "<entry>";
        let end_tag = "</entry>";

        let start = match xml[search_from..].find(start_tag) {
            Some(pos) => search_from + pos,
            None => break,
        };

        let end = match xml[start..].find(end_tag) {
            Some(pos) => start + pos + end_tag.len(),
            None => break,
        };

        entries.push(xml[start..end].to_string());
        search_from = end;
    }

    entries
}

/// Parse a single <entry> block. Returns `None` when the id, title, or
/// summary is missing, since such entries cannot be enriched or stored.
fn parse_entry(entry: &str) -> Option<Document> {
    let id = extract_tag_text(entry, "id")?;
    let title = normalize_whitespace(&extract_tag_text(entry, "title")?);
    let summary = normalize_whitespace(&extract_tag_text(entry, "summary")?);
    if title.is_empty() || summary.is_empty() {
        return None;
    }

    // Timestamps look like "2017-06-12T17:57:34Z"; the date prefix is all
    // the analytics need.
    let published = extract_tag_text(entry, "published")
        .and_then(|ts| NaiveDate::parse_from_str(ts.get(..10)?, "%Y-%m-%d").ok());

    let mut authors = Vec::new();
    let mut author_search = 0;
    while let Some(pos) = entry[author_search..].find("<author>") {
        let author_start = author_search + pos;
        let Some(end_pos) = entry[author_start..].find("</author>") else {
            break;
        };
        let author_end = author_start + end_pos + "</author>".len();
        let author_block = &entry[author_start..author_end];
        if let Some(name) = extract_tag_text(author_block, "name") {
            authors.push(name);
        }
        author_search = author_end;
    }

    Some(Document {
        id,
        title,
        summary,
        published,
        authors,
        source: SourceType::AcademicPaper,
    })
}

/// Extract the text content of the first occurrence of <tag>text</tag>.
fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let start_pos = xml.find(&open)?;
    // Find the end of the opening tag (could have attributes)
    let content_start = xml[start_pos..].find('>')? + start_pos + 1;
    let content_end = xml[content_start..].find(&close)? + content_start;

    Some(xml[content_start..content_end].trim().to_string())
}

/// Normalize whitespace: collapse runs of whitespace into single spaces.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <updated>2023-08-02T01:09:28Z</updated>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All You Need</title>
    <summary>  The dominant sequence transduction models are based on complex recurrent or
convolutional neural networks.  </summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1810.04805v2</id>
    <published>2018-10-11T00:00:00Z</published>
    <title>BERT: Pre-training of Deep Bidirectional Transformers</title>
    <summary>We introduce a new language representation model.</summary>
    <author><name>Jacob Devlin</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_fields() {
        let docs = parse_feed(SAMPLE_FEED);
        assert_eq!(docs.len(), 2);

        let first = &docs[0];
        assert_eq!(first.id, "http://arxiv.org/abs/1706.03762v7");
        assert_eq!(first.title, "Attention Is All You Need");
        assert!(first.summary.starts_with("The dominant sequence"));
        // multi-line summary collapsed to single spaces
        assert!(!first.summary.contains('\n'));
        assert_eq!(first.published, NaiveDate::from_ymd_opt(2017, 6, 12));
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(first.source, SourceType::AcademicPaper);
    }

    #[test]
    fn test_parse_feed_empty() {
        assert!(parse_feed("<feed></feed>").is_empty());
    }

    #[test]
    fn test_entry_missing_summary_is_skipped() {
        let feed = r#"<feed><entry>
            <id>http://arxiv.org/abs/2301.00001v1</id>
            <published>2023-01-01T00:00:00Z</published>
            <title>No Abstract</title>
        </entry></feed>"#;
        assert!(parse_feed(feed).is_empty());
    }

    #[test]
    fn test_entry_bad_date_becomes_none() {
        let feed = r#"<feed><entry>
            <id>http://arxiv.org/abs/2301.00001v1</id>
            <published>sometime</published>
            <title>Odd Date</title>
            <summary>Still a usable abstract.</summary>
        </entry></feed>"#;
        let docs = parse_feed(feed);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].published.is_none());
    }

    #[test]
    fn test_build_query_url() {
        let url = build_query_url("quantum computing", 10);
        assert!(url.starts_with(ARXIV_API_BASE));
        assert!(url.contains("all%3Aquantum%20computing"));
        assert!(url.contains("max_results=10"));
        assert!(url.contains("sortBy=submittedDate"));
        assert!(url.contains("sortOrder=descending"));
    }

    #[test]
    fn test_extract_tag_text_with_attributes() {
        let xml = r#"<title type="html">Hello</title>"#;
        assert_eq!(extract_tag_text(xml, "title").as_deref(), Some("Hello"));
        assert_eq!(extract_tag_text(xml, "missing"), None);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  Hello   World\n  Test  "),
            "Hello World Test"
        );
        assert_eq!(normalize_whitespace("single"), "single");
    }

    // Requires network access.
    #[tokio::test]
    #[ignore]
    async fn test_real_arxiv_fetch() {
        let source = ArxivSource::new(&IngestConfig::default()).unwrap();
        let docs = source.fetch("transformer attention", 3).await.unwrap();
        assert!(!docs.is_empty());
        assert!(docs.iter().all(|d| d.id.contains("arxiv.org")));
    }
}
