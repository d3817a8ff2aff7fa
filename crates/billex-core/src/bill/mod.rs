//! Utility bill field extraction module.

mod parser;
pub mod rules;

pub use parser::{BillParser, PatternBillParser};

use tracing::warn;

use crate::error::ExtractionError;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Join per-page text into one document, skipping blank pages.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut kept = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let page = page.as_ref();
        if page.trim().is_empty() {
            warn!("No text extracted from page {}", i + 1);
            continue;
        }
        kept.push(page);
    }
    kept.join("\n")
}
