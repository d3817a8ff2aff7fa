//! PDF and plain-text page extraction using lopdf and pdf-extract.

use lopdf::Document;
use tracing::{debug, warn};

use super::{Result, TextSource};
use crate::error::PdfError;

/// Page-by-page PDF text extractor.
///
/// Text is pulled from each page with lopdf. If that yields nothing at all,
/// the whole document is handed to pdf-extract, which copes better with
/// unusual font encodings but cannot split pages.
#[derive(Debug, Default)]
pub struct PdfTextSource;

impl PdfTextSource {
    pub fn new() -> Self {
        Self
    }

    fn load(&self, data: &[u8]) -> Result<(Document, Vec<u8>)> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        let raw_data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        Ok((doc, raw_data))
    }
}

impl TextSource for PdfTextSource {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>> {
        let (doc, raw_data) = self.load(data)?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        if page_numbers.is_empty() {
            return Err(PdfError::NoPages);
        }
        debug!("Loaded PDF with {} pages", page_numbers.len());

        let pages: Vec<String> = page_numbers
            .iter()
            .map(|&n| match doc.extract_text(&[n]) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", n, e);
                    String::new()
                }
            })
            .collect();

        if pages.iter().any(|p| !p.trim().is_empty()) {
            return Ok(pages);
        }

        debug!("Per-page extraction found no text, falling back to pdf-extract");
        let text = pdf_extract::extract_text_from_mem(&raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;
        Ok(vec![text])
    }
}

/// UTF-8 text documents; form feeds separate pages.
#[derive(Debug, Default)]
pub struct PlainTextSource;

impl TextSource for PlainTextSource {
    fn page_texts(&self, data: &[u8]) -> Result<Vec<String>> {
        let text = std::str::from_utf8(data)
            .map_err(|e| PdfError::TextExtraction(format!("document is not valid UTF-8: {}", e)))?;
        Ok(text.split('\x0c').map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_pages() {
        let pages = PlainTextSource.page_texts(b"Account: 1\x0c\x0cAmount Due: $5.00").unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], "");
    }

    #[test]
    fn test_plain_text_rejects_binary() {
        let result = PlainTextSource.page_texts(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(PdfError::TextExtraction(_))));
    }

    #[test]
    fn test_pdf_rejects_garbage() {
        let result = PdfTextSource::new().page_texts(b"definitely not a pdf");
        assert!(matches!(result, Err(PdfError::Parse(_))));
    }
}
