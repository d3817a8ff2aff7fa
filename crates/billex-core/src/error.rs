//! Error types for the billex-core library.

use thiserror::Error;

/// Main error type for the billex library.
#[derive(Error, Debug)]
pub enum BillexError {
    /// Document text extraction error.
    #[error("document error: {0}")]
    Pdf(#[from] PdfError),

    /// Bill field extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// LLM collaborator error.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Task store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Rejected input (empty batch, unsupported document).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BillexError {
    /// Whether the error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillexError::InvalidInput(_) | BillexError::Store(StoreError::NotFound(_))
        )
    }
}

/// Errors related to turning a document into page texts.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The file type is not a supported document.
    #[error("unsupported document type: {0}")]
    UnsupportedType(String),
}

/// Errors related to bill field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The document yielded no text at all.
    #[error("No text could be extracted from the document")]
    NoText,

    /// Unexpected failure while applying the extraction rules.
    #[error("extraction failed: {0}")]
    Engine(String),

    /// The extracted record could not be converted to its stored form.
    #[error("data serialization failed: {0}")]
    Serialization(String),
}

/// Errors returned by the LLM extraction collaborator.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The API key environment variable is not set.
    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    /// Transport or HTTP status failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The model answered with no content.
    #[error("empty response from model")]
    EmptyResponse,

    /// The model answered with something that is not a usable bill object.
    #[error("invalid response from model: {0}")]
    InvalidResponse(String),
}

/// Errors from the task store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No job with this id exists.
    #[error("task not found: {0}")]
    NotFound(String),

    /// SQLite error from rusqlite.
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A migration failed to apply.
    #[error("migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored value could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A blocking store task was cancelled or panicked.
    #[error("store task failed: {0}")]
    Task(String),

    /// IO error when creating the database directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the billex library.
pub type Result<T> = std::result::Result<T, BillexError>;
