//! Date parsing for utility bills.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::patterns::FieldPatterns;
use super::{ExtractionMatch, FieldExtractor};

/// Accepted date layouts, tried in order.
pub const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d-%m-%Y"];

/// Parse a date using the first format in [`DATE_FORMATS`] that fits.
///
/// Returns `None` for anything else, e.g. "Upon Receipt".
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            debug!("Parsed date {:?} with format {}", s, fmt);
            return Some(date);
        }
    }
    warn!("Failed to parse date string: {:?}", s);
    None
}

/// Build the bounds of a "MM/DD - MM/DD" service period in the given year.
pub fn parse_service_period(start: &str, end: &str, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let from = NaiveDate::parse_from_str(&format!("{}/{}", start.trim(), year), "%m/%d/%Y").ok();
    let to = NaiveDate::parse_from_str(&format!("{}/{}", end.trim(), year), "%m/%d/%Y").ok();

    match (from, to) {
        (Some(from), Some(to)) => Some((from, to)),
        _ => {
            warn!("Could not parse service period dates: {} - {}", start, end);
            None
        }
    }
}

/// Labeled date field extractor.
///
/// Only the first labeled value is considered; if it does not parse the
/// field stays empty.
pub struct DateExtractor<'p> {
    patterns: &'p FieldPatterns,
}

impl<'p> DateExtractor<'p> {
    pub fn new(patterns: &'p FieldPatterns) -> Self {
        Self { patterns }
    }
}

impl FieldExtractor for DateExtractor<'_> {
    type Output = ExtractionMatch<NaiveDate>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        let found = self.patterns.extract(text)?;
        let date = parse_date(&found.value)?;
        Some(found.map(|_| date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::rules::patterns::{BILL_DATE, DUE_DATE};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("01/24/2025"), Some(ymd(2025, 1, 24)));
        assert_eq!(parse_date("2025-01-24"), Some(ymd(2025, 1, 24)));
        assert_eq!(parse_date("Jan 24, 2025"), Some(ymd(2025, 1, 24)));
        assert_eq!(parse_date("January 24, 2025"), Some(ymd(2025, 1, 24)));
        assert_eq!(parse_date("24-01-2025"), Some(ymd(2025, 1, 24)));
        assert_eq!(parse_date("  02/12/2025 "), Some(ymd(2025, 2, 12)));
    }

    #[test]
    fn test_parse_date_rejects_text() {
        assert_eq!(parse_date("Upon Receipt"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("13/45/2025"), None);
    }

    #[test]
    fn test_service_period() {
        assert_eq!(
            parse_service_period("12/20", "01/24", 2025),
            Some((ymd(2025, 12, 20), ymd(2025, 1, 24)))
        );
        assert_eq!(parse_service_period("02/30", "03/01", 2025), None);
    }

    #[test]
    fn test_labeled_dates() {
        let text = "Bill Date: 01/24/2025\nDue Date: Feb 12, 2025\n";
        let bill = DateExtractor::new(&BILL_DATE).extract(text).unwrap();
        let due = DateExtractor::new(&DUE_DATE).extract(text).unwrap();
        assert_eq!(bill.value, ymd(2025, 1, 24));
        assert_eq!(due.value, ymd(2025, 2, 12));
    }

    #[test]
    fn test_first_label_decides() {
        let text = "Due Date: Upon Receipt\nAmount due on or before 02/12/2025\n";
        assert!(DateExtractor::new(&DUE_DATE).extract(text).is_none());

        let fallback = "Amount due on or before 02/12/2025\n";
        let due = DateExtractor::new(&DUE_DATE).extract(fallback).unwrap();
        assert_eq!(due.value, ymd(2025, 2, 12));
        assert!(due.precedence > 0);
    }
}
