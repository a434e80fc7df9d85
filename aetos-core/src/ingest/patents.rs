//! Google Patents ingestion source.
//!
//! Uses the public XHR search endpoint, which returns JSON clusters of
//! patent hits. Titles and snippets arrive with embedded HTML markup and
//! are stripped to plain text before they become documents.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ingest::DocumentSource;
use crate::types::{Document, SourceType};

const PATENTS_BASE: &str = "https://patents.google.com";
const SOURCE_NAME: &str = "google_patents";
// The XHR endpoint rejects non-browser user agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Google Patents search client.
pub struct PatentSource {
    client: reqwest::Client,
}

impl PatentSource {
    pub fn new(config: &IngestConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .map_err(|e| IngestError::RequestFailed {
                source_name: SOURCE_NAME.to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentSource for PatentSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, topic: &str, max_results: usize) -> Result<Vec<Document>, IngestError> {
        let url = build_query_url(topic, max_results);
        debug!(url, "Google Patents query");

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

        let body: Value = response.json().await.map_err(|e| IngestError::ParseFailed {
            source_name: SOURCE_NAME.to_string(),
            message: format!("Response was not JSON: {}", e),
        })?;

        Ok(parse_results(&body))
    }
}

/// The inner query string is itself URL-encoded inside the `url` parameter.
fn build_query_url(topic: &str, max_results: usize) -> String {
    format!(
        "{}/xhr/query?url=q%3D{}&num={}",
        PATENTS_BASE,
        urlencoding::encode(topic).replace("%20", "+"),
        max_results,
    )
}

/// Walk the `results.cluster[0].result[]` structure into documents.
/// Entries without a publication number are dropped.
fn parse_results(body: &Value) -> Vec<Document> {
    let results = body
        .get("results")
        .and_then(|r| r.get("cluster"))
        .and_then(Value::as_array)
        .and_then(|clusters| clusters.first())
        .and_then(|c| c.get("result"))
        .and_then(Value::as_array);

    let Some(results) = results else {
        return Vec::new();
    };

    results
        .iter()
        .filter_map(|entry| parse_patent(entry.get("patent")?))
        .collect()
}

fn parse_patent(patent: &Value) -> Option<Document> {
    let number = patent.get("publication_number").and_then(Value::as_str)?;

    let title = strip_html(
        patent
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("No title available"),
    );
    let summary = strip_html(
        patent
            .get("snippet")
            .and_then(Value::as_str)
            .unwrap_or_default(),
    );

    let published = patent
        .get("filing_date_str")
        .and_then(Value::as_str)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

    let authors: Vec<String> = patent
        .get("inventor_harmonized")
        .and_then(Value::as_array)
        .map(|inventors| {
            inventors
                .iter()
                .filter_map(|inv| inv.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(Document {
        id: format!("{}/patent/{}", PATENTS_BASE, number),
        title,
        summary,
        published,
        authors,
        source: SourceType::Patent,
    })
}

/// Remove HTML tags and decode the handful of entities the snippet fields
/// actually contain.
fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    let out = out
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
