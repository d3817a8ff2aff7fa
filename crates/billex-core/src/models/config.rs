//! Configuration structures for extraction, batching, storage and serving.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::bill::MAX_METERS;

/// Main configuration for billex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillexConfig {
    /// Field extraction configuration.
    pub extraction: ExtractionConfig,

    /// Batch orchestration configuration.
    pub batch: BatchConfig,

    /// Task store configuration.
    pub store: StoreConfig,

    /// HTTP server configuration.
    pub server: ServerConfig,

    /// LLM collaborator configuration.
    pub llm: LlmConfig,
}

/// Which extractor turns document text into a bill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Deterministic pattern engine.
    #[default]
    Pattern,
    /// LLM collaborator.
    Llm,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extractor used by batch jobs.
    pub method: ExtractionMethod,

    /// Maximum meters kept per bill.
    pub max_meters: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            method: ExtractionMethod::Pattern,
            max_meters: MAX_METERS,
        }
    }
}

/// Batch orchestration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum documents extracted at the same time across all jobs.
    pub max_concurrency: usize,

    /// Directory where uploaded documents are staged while processed.
    pub staging_dir: PathBuf,

    /// Interval used when waiting for a job to finish.
    pub poll_interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            staging_dir: std::env::temp_dir().join("billex-uploads"),
            poll_interval_ms: 250,
        }
    }
}

/// Task store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Jobs live only as long as the process.
    Memory,
    /// Jobs are persisted in a SQLite database.
    #[default]
    Sqlite,
}

/// Task store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// SQLite database file.
    pub database_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: PathBuf::from("extraction.db"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,

    /// Accept `.txt` uploads in addition to PDFs.
    pub accept_text: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            accept_text: false,
        }
    }
}

/// LLM collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,

    /// Model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            timeout_secs: 120,
        }
    }
}

impl BillexConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
