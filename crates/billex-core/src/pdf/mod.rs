//! Document text extraction module.

mod extractor;

pub use extractor::{PdfTextSource, PlainTextSource};

use std::path::Path;

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Kind of uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// PDF with a text layer.
    Pdf,
    /// Plain UTF-8 text, pages separated by form feeds.
    Text,
}

impl DocumentKind {
    /// Detect the kind from a file name's extension (case-insensitive).
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    /// Text source that handles this kind.
    pub fn source(&self) -> Box<dyn TextSource> {
        match self {
            DocumentKind::Pdf => Box::new(PdfTextSource::new()),
            DocumentKind::Text => Box::new(PlainTextSource),
        }
    }
}

/// Trait for turning raw document bytes into per-page text.
pub trait TextSource: Send + Sync {
    /// Extract text for each page, in page order. Pages may be empty.
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>>;
}

/// Read a document from disk and return its page texts.
pub fn read_pages(path: &Path) -> Result<Vec<String>> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let kind = DocumentKind::from_filename(name)
        .ok_or_else(|| PdfError::UnsupportedType(name.to_string()))?;

    let data = std::fs::read(path).map_err(|e| PdfError::Parse(format!("{}: {}", path.display(), e)))?;
    kind.source().page_texts(&data)
}
