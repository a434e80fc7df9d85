//! Reasoning service adapter.
//!
//! Implements the `ReasoningClient` trait for the Google Gemini API.
//!
//! Notable API details:
//! - Auth via `?key=API_KEY` query parameter (not header-based)
//! - `generationConfig.responseMimeType = "application/json"` forces the
//!   model to emit raw JSON
//! - The verdict text is scattered over candidate content parts and must be
//!   concatenated before parsing

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::AnalysisError;
use crate::types::{EnrichmentResult, KeyRelationship};

/// The default Google Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Summaries with fewer words than this are not worth a reasoning call.
const MIN_ANALYZABLE_WORDS: usize = 25;

/// Analysis instructions sent ahead of each document summary.
const ANALYSIS_PROMPT: &str = r#"You are a technology intelligence analyst. Analyze the following research abstract and respond with a single JSON object containing exactly these fields:
- "TRL": integer 1-9, the technology readiness level of the work described
- "strategic_summary": one or two sentences on the strategic significance
- "technologies": array of canonical technology-domain names mentioned
- "key_relationships": array of {"subject", "relationship", "object"} triples between named entities
- "country": country most associated with the work, or null
- "provider_company": company or institution behind the work, or null
- "funding_details": funding sources if stated, or null

Abstract:
"#;

/// A client able to turn raw document text into a structured verdict.
///
/// The trait seam exists so the pipeline and engine can be exercised with a
/// mock instead of a live API.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Analyze one document's text. Returns a sentinel result (TRL 0) when
    /// the text is too short to analyze or when all attempts fail on
    /// transient errors; returns `Err` only for non-recoverable failures.
    async fn analyze(&self, text: &str) -> Result<EnrichmentResult, AnalysisError>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}

/// Gemini-backed reasoning client.
pub struct GeminiAnalyst {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_attempts: u32,
    rate_limit_backoff: Duration,
    short_backoff: Duration,
    timeout_secs: u64,
}

impl GeminiAnalyst {
    /// Create a new analyst from configuration.
    ///
    /// Resolves the API key from the inline `config.api_key` override or
    /// the environment variable named in `config.api_key_env`. Returns
    /// `AnalysisError::AuthFailed` if neither is set, so misconfiguration
    /// surfaces before any batch starts.
    pub fn from_config(config: &LlmConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .ok_or_else(|| AnalysisError::AuthFailed {
                message: format!("environment variable '{}' not set", config.api_key_env),
            })?;
        Self::with_key(config, api_key)
    }

    /// Create a new analyst with an explicitly provided API key.
    pub fn with_key(config: &LlmConfig, api_key: String) -> Result<Self, AnalysisError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            max_attempts: config.max_attempts,
            rate_limit_backoff: Duration::from_secs(config.rate_limit_backoff_secs),
            short_backoff: Duration::from_secs(config.short_backoff_secs),
            timeout_secs: config.timeout_secs,
        })
    }

    /// One request/parse round trip, no retries.
    async fn analyze_once(&self, text: &str) -> Result<EnrichmentResult, AnalysisError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{ANALYSIS_PROMPT}{text}") }],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.2,
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| AnalysisError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(map_http_error(status, &body_text));
        }

        let verdict_text = extract_candidate_text(&body_text)?;
        parse_verdict(&verdict_text)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> AnalysisError {
        if e.is_timeout() {
            AnalysisError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if e.is_connect() {
            AnalysisError::Connection {
                message: e.to_string(),
            }
        } else {
            AnalysisError::ApiRequest {
                message: e.to_string(),
            }
        }
    }

    fn backoff_for(&self, err: &AnalysisError) -> Duration {
        match err {
            AnalysisError::RateLimited { retry_after_secs } if *retry_after_secs > 0 => {
                Duration::from_secs(*retry_after_secs)
            }
            AnalysisError::RateLimited { .. } => self.rate_limit_backoff,
            _ => self.short_backoff,
        }
    }
}

#[async_trait]
impl ReasoningClient for GeminiAnalyst {
    async fn analyze(&self, text: &str) -> Result<EnrichmentResult, AnalysisError> {
        if text.split_whitespace().count() < MIN_ANALYZABLE_WORDS {
            debug!("Text below analyzable length, returning sentinel without API call");
            return Ok(EnrichmentResult::sentinel(
                "Not analyzed: abstract too short.",
            ));
        }

        for attempt in 1..=self.max_attempts {
            match self.analyze_once(text).await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Analysis attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.backoff_for(&e)).await;
                    }
                }
            }
        }

        Ok(EnrichmentResult::sentinel(format!(
            "Analysis failed after {} attempts.",
            self.max_attempts
        )))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Map an HTTP status code to the appropriate `AnalysisError`.
fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> AnalysisError {
    match status.as_u16() {
        401 | 403 => AnalysisError::AuthFailed {
            message: format!("HTTP {} from Gemini API", status.as_u16()),
        },
        429 => AnalysisError::RateLimited {
            retry_after_secs: parse_retry_delay(body_text).unwrap_or(0),
        },
        _ => AnalysisError::ApiRequest {
            message: format!("HTTP {} from Gemini API: {}", status, body_text),
        },
    }
}

/// Pull a `retryDelay` hint (e.g. "42s") out of a 429 error body, if present.
fn parse_retry_delay(body_text: &str) -> Option<u64> {
    let json: Value = serde_json::from_str(body_text).ok()?;
    let details = json.get("error")?.get("details")?.as_array()?;
    for detail in details {
        if let Some(delay) = detail.get("retryDelay").and_then(Value::as_str) {
            return delay.trim_end_matches('s').parse().ok();
        }
    }
    None
}

/// Concatenate the text parts of the first candidate.
fn extract_candidate_text(body_text: &str) -> Result<String, AnalysisError> {
    let json: Value =
        serde_json::from_str(body_text).map_err(|e| AnalysisError::ResponseParse {
            message: format!("Response was not JSON: {}", e),
        })?;

    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or(AnalysisError::EmptyResponse)?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }
    Ok(text)
}

/// Lenient schema for the model's verdict. Unknown keys are dropped; missing
/// collections default to empty so a partial verdict still yields a record.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(alias = "TRL", alias = "trl", default)]
    technology_readiness_level: i64,
    #[serde(default)]
    strategic_summary: String,
    #[serde(default)]
    technologies: Vec<String>,
    #[serde(default)]
    key_relationships: Vec<KeyRelationship>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    provider_company: Option<String>,
    #[serde(default)]
    funding_details: Option<String>,
}

/// Parse the model's output into an `EnrichmentResult`.
///
/// Models occasionally wrap the JSON in prose or code fences despite the
/// mime-type instruction, so the outermost `{...}` span is recovered before
/// parsing. The TRL is clamped into 0..=9.
fn parse_verdict(text: &str) -> Result<EnrichmentResult, AnalysisError> {
    let json_span = extract_json_object(text).ok_or_else(|| AnalysisError::ResponseParse {
        message: "No JSON object found in model output".to_string(),
    })?;

    let raw: RawVerdict =
        serde_json::from_str(json_span).map_err(|e| AnalysisError::ResponseParse {
            message: format!("Verdict JSON did not match schema: {}", e),
        })?;

    Ok(EnrichmentResult {
        technology_readiness_level: raw.technology_readiness_level.clamp(0, 9) as u8,
        strategic_summary: raw.strategic_summary,
        technologies: raw.technologies,
        key_relationships: raw.key_relationships,
        country: raw.country,
        provider_company: raw.provider_company,
        funding_details: raw.funding_details,
    })
}

/// The span from the first `{` to the last `}`, inclusive.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Scripted reasoning client for tests. Returns queued responses in order,
/// then repeats the last one.
pub struct MockAnalyst {
    responses: std::sync::Mutex<Vec<Result<EnrichmentResult, AnalysisError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockAnalyst {
    pub fn new(responses: Vec<Result<EnrichmentResult, AnalysisError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A mock that always returns the same verdict.
    pub fn always(result: EnrichmentResult) -> Self {
        Self::new(vec![Ok(result)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningClient for MockAnalyst {
    async fn analyze(&self, _text: &str) -> Result<EnrichmentResult, AnalysisError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = match self.responses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if responses.len() > 1 {
            let next = responses.remove(0);
            return clone_response(&next);
        }
        match responses.first() {
            Some(r) => clone_response(r),
            None => Ok(EnrichmentResult::sentinel("mock exhausted")),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

fn clone_response(
    r: &Result<EnrichmentResult, AnalysisError>,
) -> Result<EnrichmentResult, AnalysisError> {
    match r {
        Ok(v) => Ok(v.clone()),
        Err(AnalysisError::AuthFailed { message }) => Err(AnalysisError::AuthFailed {
            message: message.clone(),
        }),
        Err(AnalysisError::RateLimited { retry_after_secs }) => Err(AnalysisError::RateLimited {
            retry_after_secs: *retry_after_secs,
        }),
        Err(e) => Err(AnalysisError::ApiRequest {
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RESPONSE: &str = r#"{
        "candidates": [{
            "content": {
                "parts": [
                    {"text": "{\"TRL\": 4, \"strategic_summary\": \"Lab-validated photonic interconnects.\","},
                    {"text": " \"technologies\": [\"photonics\", \"quantum networking\"], \"key_relationships\": []}"}
                ],
                "role": "model"
            }
        }]
    }"#;

    fn long_text() -> String {
        "word ".repeat(30)
    }

    fn config_with(base_url: Option<String>) -> LlmConfig {
        LlmConfig {
            base_url,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_extract_candidate_text_concatenates_parts() {
        let text = extract_candidate_text(SAMPLE_RESPONSE).unwrap();
        assert!(text.starts_with("{\"TRL\": 4"));
        assert!(text.ends_with("\"key_relationships\": []}"));
    }

    #[test]
    fn test_extract_candidate_text_empty() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "  "}]}}]}"#;
        assert!(matches!(
            extract_candidate_text(body),
            Err(AnalysisError::EmptyResponse)
        ));
        assert!(matches!(
            extract_candidate_text(r#"{"candidates": []}"#),
            Err(AnalysisError::EmptyResponse)
        ));
    }

    #[test]
    fn test_parse_verdict_plain() {
        let verdict = parse_verdict(
            r#"{"TRL": 6, "strategic_summary": "Pilot deployments.", "technologies": ["solid-state batteries"], "key_relationships": [{"subject": "QuantumScape", "relationship": "supplies", "object": "Volkswagen"}], "country": "US"}"#,
        )
        .unwrap();
        assert_eq!(verdict.technology_readiness_level, 6);
        assert_eq!(verdict.technologies, vec!["solid-state batteries"]);
        assert_eq!(verdict.key_relationships[0].subject, "QuantumScape");
        assert_eq!(verdict.country.as_deref(), Some("US"));
        assert!(verdict.provider_company.is_none());
    }

    #[test]
    fn test_parse_verdict_recovers_from_code_fence() {
        let verdict = parse_verdict(
            "```json\n{\"TRL\": 3, \"strategic_summary\": \"Early research.\"}\n```",
        )
        .unwrap();
        assert_eq!(verdict.technology_readiness_level, 3);
        assert!(verdict.technologies.is_empty());
    }

    #[test]
    fn test_parse_verdict_clamps_trl() {
        let high = parse_verdict(r#"{"TRL": 15, "strategic_summary": "x"}"#).unwrap();
        assert_eq!(high.technology_readiness_level, 9);
        let low = parse_verdict(r#"{"TRL": -2, "strategic_summary": "x"}"#).unwrap();
        assert_eq!(low.technology_readiness_level, 0);
        assert!(low.is_sentinel());
    }

    #[test]
    fn test_parse_verdict_lowercase_alias() {
        let verdict = parse_verdict(r#"{"trl": 7, "strategic_summary": "x"}"#).unwrap();
        assert_eq!(verdict.technology_readiness_level, 7);
    }

    #[test]
    fn test_parse_verdict_no_json() {
        assert!(matches!(
            parse_verdict("I could not analyze this."),
            Err(AnalysisError::ResponseParse { .. })
        ));
    }

    #[test]
    fn test_parse_verdict_drops_unknown_keys() {
        let verdict = parse_verdict(
            r#"{"TRL": 2, "strategic_summary": "x", "confidence": 0.9, "extra": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(verdict.technology_readiness_level, 2);
    }

    #[test]
    fn test_map_http_error() {
        assert!(matches!(
            map_http_error(reqwest::StatusCode::UNAUTHORIZED, ""),
            AnalysisError::AuthFailed { .. }
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::FORBIDDEN, ""),
            AnalysisError::AuthFailed { .. }
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "{}"),
            AnalysisError::RateLimited {
                retry_after_secs: 0
            }
        ));
        assert!(matches!(
            map_http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            AnalysisError::ApiRequest { .. }
        ));
    }

    #[test]
    fn test_parse_retry_delay() {
        let body = r#"{"error": {"details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "42s"}]}}"#;
        assert_eq!(parse_retry_delay(body), Some(42));
        assert_eq!(parse_retry_delay("{}"), None);
        assert_eq!(parse_retry_delay("not json"), None);
    }

    #[test]
    fn test_missing_api_key_is_auth_failure() {
        let config = LlmConfig {
            api_key_env: "AETOS_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            ..LlmConfig::default()
        };
        match GeminiAnalyst::from_config(&config) {
            Err(AnalysisError::AuthFailed { message }) => {
                assert!(message.contains("AETOS_TEST_KEY_THAT_DOES_NOT_EXIST"));
            }
            other => panic!("Expected AuthFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_short_text_skips_network() {
        // base_url points nowhere; a network attempt would error, proving
        // the short-circuit if this returns a sentinel.
        let config = config_with(Some("http://127.0.0.1:1".to_string()));
        let analyst = GeminiAnalyst::with_key(&config, "test-key".to_string()).unwrap();
        let result = analyst.analyze("only a few words here").await.unwrap();
        assert!(result.is_sentinel());
        assert!(result.strategic_summary.contains("too short"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_degrade_to_sentinel() {
        let config = LlmConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            max_attempts: 2,
            short_backoff_secs: 0,
            rate_limit_backoff_secs: 0,
            ..LlmConfig::default()
        };
        let analyst = GeminiAnalyst::with_key(&config, "test-key".to_string()).unwrap();
        let result = analyst.analyze(&long_text()).await.unwrap();
        assert!(result.is_sentinel());
        assert!(result.strategic_summary.contains("after 2 attempts"));
    }

    #[tokio::test]
    async fn test_mock_analyst_sequences_responses() {
        let mock = MockAnalyst::new(vec![
            Ok(EnrichmentResult::sentinel("first")),
            Ok(EnrichmentResult {
                technology_readiness_level: 5,
                ..EnrichmentResult::sentinel("")
            }),
        ]);
        let first = mock.analyze("a").await.unwrap();
        assert_eq!(first.strategic_summary, "first");
        let second = mock.analyze("b").await.unwrap();
        assert_eq!(second.technology_readiness_level, 5);
        // last response repeats
        let third = mock.analyze("c").await.unwrap();
        assert_eq!(third.technology_readiness_level, 5);
        assert_eq!(mock.call_count(), 3);
    }

    // Requires GEMINI_API_KEY and network access.
    #[tokio::test]
    #[ignore]
    async fn test_live_gemini_analysis() {
        let config = LlmConfig::default();
        let analyst = GeminiAnalyst::from_config(&config).unwrap();
        let abstract_text = "We demonstrate a room-temperature quantum memory based on \
            rare-earth-doped crystals, achieving storage times exceeding one second with \
            high fidelity. The approach integrates with existing telecom fiber infrastructure \
            and represents a practical step toward metropolitan-scale quantum networks.";
        let result = analyst.analyze(abstract_text).await.unwrap();
        assert!(!result.is_sentinel());
        assert!(!result.technologies.is_empty());
    }
}
