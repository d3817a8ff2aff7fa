//! Document extractors: file on disk in, bill record out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bill::{join_pages, BillParser, PatternBillParser};
use crate::error::{ExtractionError, Result};
use crate::models::bill::BillRecord;
use crate::models::config::{BillexConfig, ExtractionMethod};
use crate::pdf::read_pages;

/// Trait for turning a staged document into a [`BillRecord`].
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Extract bill data from the document at `path`.
    async fn extract(&self, path: &Path) -> Result<BillRecord>;
}

/// Read a document's text off the async runtime, failing if it has none.
pub async fn read_document_text(path: &Path) -> Result<String> {
    let owned: PathBuf = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || read_pages(&owned))
        .await
        .map_err(|e| ExtractionError::Engine(format!("text extraction task failed: {}", e)))??;

    let text = join_pages(&pages);
    if text.trim().is_empty() {
        return Err(ExtractionError::NoText.into());
    }

    debug!("Read {} characters from {}", text.len(), path.display());
    Ok(text)
}

/// Text extraction followed by the pattern engine.
#[derive(Debug, Clone, Default)]
pub struct PatternExtractor {
    parser: PatternBillParser,
}

impl PatternExtractor {
    pub fn new(parser: PatternBillParser) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl DocumentExtractor for PatternExtractor {
    async fn extract(&self, path: &Path) -> Result<BillRecord> {
        let text = read_document_text(path).await?;
        Ok(self.parser.parse(&text)?)
    }
}

/// Text extraction followed by the LLM collaborator.
#[cfg(feature = "llm")]
pub struct LlmExtractor {
    client: crate::llm::LlmBillExtractor,
}

#[cfg(feature = "llm")]
impl LlmExtractor {
    pub fn new(client: crate::llm::LlmBillExtractor) -> Self {
        Self { client }
    }
}

#[cfg(feature = "llm")]
#[async_trait]
impl DocumentExtractor for LlmExtractor {
    async fn extract(&self, path: &Path) -> Result<BillRecord> {
        let text = read_document_text(path).await?;
        Ok(self.client.extract_text(&text).await?)
    }
}

/// Build the pattern extractor from configuration.
pub fn pattern_extractor(config: &BillexConfig) -> PatternExtractor {
    PatternExtractor::new(PatternBillParser::new().with_max_meters(config.extraction.max_meters))
}

/// Build the LLM extractor from configuration.
#[cfg(feature = "llm")]
pub fn llm_extractor(config: &BillexConfig) -> Result<LlmExtractor> {
    Ok(LlmExtractor::new(crate::llm::LlmBillExtractor::from_config(&config.llm)?))
}

/// Build the extractor selected by `method`.
pub fn extractor_for(
    config: &BillexConfig,
    method: ExtractionMethod,
) -> Result<Arc<dyn DocumentExtractor>> {
    match method {
        ExtractionMethod::Pattern => Ok(Arc::new(pattern_extractor(config))),
        #[cfg(feature = "llm")]
        ExtractionMethod::Llm => Ok(Arc::new(llm_extractor(config)?)),
        #[cfg(not(feature = "llm"))]
        ExtractionMethod::Llm => Err(crate::error::BillexError::Config(
            "LLM extraction requires the `llm` feature".to_string(),
        )),
    }
}
