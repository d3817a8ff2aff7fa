//! Amount parsing for utility bills.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, warn};

use super::patterns::FieldPatterns;
use super::{ExtractionMatch, FieldExtractor};

/// Parse a monetary or numeric value.
///
/// Everything except digits, `.` and `-` is dropped first, so currency
/// symbols and thousands separators are ignored. Values that do not fit a
/// [`Decimal`] are rejected here rather than at serialization time.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    match Decimal::from_str(&cleaned) {
        Ok(value) => {
            debug!("Parsed amount {:?} as {}", s, value);
            Some(value)
        }
        Err(e) => {
            warn!("Failed to parse amount {:?}: {}", s, e);
            None
        }
    }
}

/// Labeled amount field extractor.
pub struct AmountExtractor<'p> {
    patterns: &'p FieldPatterns,
}

impl<'p> AmountExtractor<'p> {
    pub fn new(patterns: &'p FieldPatterns) -> Self {
        Self { patterns }
    }
}

impl FieldExtractor for AmountExtractor<'_> {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        let found = self.patterns.extract(text)?;
        let amount = parse_amount(&found.value)?;
        Some(found.map(|_| amount))
    }
}
