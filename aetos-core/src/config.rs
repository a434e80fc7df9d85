//! Configuration for the AETOS engine.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Environment variables are prefixed with `AETOS_` and nested
//! with `__` (e.g. `AETOS_LLM__MODEL`, `AETOS_PIPELINE__MAX_CONCURRENCY`).

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AetosConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Reasoning service (LLM) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier (e.g. "gemini-2.0-flash").
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable name containing the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Inline API key override. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts per document before degrading to a sentinel result.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff after a rate-limit response with no server hint, in seconds.
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    /// Backoff after other transient failures, in seconds.
    #[serde(default = "default_short_backoff_secs")]
    pub short_backoff_secs: u64,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_rate_limit_backoff_secs() -> u64 {
    60
}

fn default_short_backoff_secs() -> u64 {
    5
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key_env: default_api_key_env(),
            api_key: None,
            base_url: None,
            timeout_secs: default_llm_timeout_secs(),
            max_attempts: default_max_attempts(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            short_backoff_secs: default_short_backoff_secs(),
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    ///
    /// Returns human-readable warning messages for problematic values;
    /// an empty Vec means the config is fine.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_attempts == 0 {
            warnings.push(
                "llm.max_attempts is 0; every document will be stored as a sentinel".to_string(),
            );
        }
        if self.timeout_secs < 10 {
            warnings.push(format!(
                "llm.timeout_secs ({}) is very low; reasoning calls routinely take longer",
                self.timeout_secs
            ));
        }
        warnings
    }
}

/// Batch enrichment pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum in-flight reasoning requests in bounded mode.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Minimum summary length in characters for a document to qualify.
    #[serde(default = "default_min_summary_chars")]
    pub min_summary_chars: usize,
    /// Whether to require a topic keyword in the title or summary.
    #[serde(default = "default_topic_gate")]
    pub topic_gate: bool,
    /// Delay between requests in sequential (paced) mode, in seconds.
    #[serde(default = "default_pacing_delay_secs")]
    pub pacing_delay_secs: u64,
}

fn default_max_concurrency() -> usize {
    5
}

fn default_min_summary_chars() -> usize {
    150
}

fn default_topic_gate() -> bool {
    true
}

fn default_pacing_delay_secs() -> u64 {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            min_summary_chars: default_min_summary_chars(),
            topic_gate: default_topic_gate(),
            pacing_delay_secs: default_pacing_delay_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.max_concurrency == 0 {
            warnings.push("pipeline.max_concurrency is 0; no documents can be enriched".to_string());
        }
        if self.max_concurrency > 50 {
            warnings.push(format!(
                "pipeline.max_concurrency ({}) is unusually high and will likely trip rate limits",
                self.max_concurrency
            ));
        }
        warnings
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `None` resolves to the platform
    /// data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

impl StoreConfig {
    /// Resolve the database path, falling back to the platform data dir.
    pub fn resolve_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("dev", "aetos", "aetos").ok_or_else(|| {
            ConfigError::Invalid {
                message: "could not determine a platform data directory for the store".to_string(),
            }
        })?;
        Ok(dirs.data_dir().join("documents.db"))
    }
}

/// Ingestion source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Per-request timeout in seconds for source fetches.
    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,
    /// Minimum gap between consecutive arXiv requests, in seconds.
    #[serde(default = "default_arxiv_courtesy_secs")]
    pub arxiv_courtesy_secs: u64,
}

fn default_ingest_timeout_secs() -> u64 {
    30
}

fn default_arxiv_courtesy_secs() -> u64 {
    3
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_ingest_timeout_secs(),
            arxiv_courtesy_secs: default_arxiv_courtesy_secs(),
        }
    }
}

impl AetosConfig {
    /// Validate the whole config, returning accumulated warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        warnings.extend(self.pipeline.validate());
        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `AETOS_`)
/// 2. Explicit config file (passed as argument)
/// 3. User config (`~/.config/aetos/config.toml`)
/// 4. Built-in defaults
pub fn load_config(config_file: Option<&Path>) -> Result<AetosConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AetosConfig::default()));

    // User-level config
    if let Some(dirs) = directories::ProjectDirs::from("dev", "aetos", "aetos") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Explicit config file
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    // Environment variables (AETOS_LLM__MODEL, AETOS_PIPELINE__TOPIC_GATE, etc.)
    figment = figment.merge(Env::prefixed("AETOS_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write a commented default config file at `path`, creating parent
/// directories as needed. Refuses to overwrite an existing file.
pub fn write_default(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("config file already exists at {}", path.display()),
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("could not create {}: {e}", parent.display()),
        })?;
    }
    let body = toml::to_string_pretty(&AetosConfig::default()).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
        }
    })?;
    let content = format!(
        "# AETOS configuration.\n# Environment variables prefixed with AETOS_ override these values,\n# e.g. AETOS_LLM__MODEL=gemini-2.5-pro\n\n{body}"
    );
    std::fs::write(path, content).map_err(|e| ConfigError::Invalid {
        message: format!("could not write {}: {e}", path.display()),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AetosConfig::default();
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.llm.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.llm.max_attempts, 3);
        assert_eq!(config.pipeline.max_concurrency, 5);
        assert_eq!(config.pipeline.min_summary_chars, 150);
        assert!(config.pipeline.topic_gate);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_defaults_pass_validation() {
        assert!(AetosConfig::default().validate().is_empty());
    }

    #[test]
    fn test_validation_warnings() {
        let mut config = AetosConfig::default();
        config.llm.max_attempts = 0;
        config.pipeline.max_concurrency = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("max_attempts"));
        assert!(warnings[1].contains("max_concurrency"));
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[llm]\nmodel = \"gemini-2.5-pro\"\n\n[pipeline]\nmax_concurrency = 2\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.llm.model, "gemini-2.5-pro");
        assert_eq!(config.pipeline.max_concurrency, 2);
        // untouched sections keep their defaults
        assert_eq!(config.pipeline.min_summary_chars, 150);
    }

    #[test]
    fn test_partial_toml_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ingest]\ntimeout_secs = 10\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.ingest.timeout_secs, 10);
        assert_eq!(config.ingest.arxiv_courtesy_secs, 3);
    }

    #[test]
    fn test_write_default_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        write_default(&path).unwrap();
        assert!(path.exists());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[llm]"));
        assert!(write_default(&path).is_err());
    }

    #[test]
    fn test_store_path_override() {
        let config = StoreConfig {
            path: Some(PathBuf::from("/tmp/aetos-test.db")),
        };
        assert_eq!(
            config.resolve_path().unwrap(),
            PathBuf::from("/tmp/aetos-test.db")
        );
    }
}
