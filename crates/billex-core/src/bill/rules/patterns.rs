//! Regex patterns for utility bill extraction.
//!
//! Top-level fields are matched with an ordered list of candidate patterns:
//! the first pattern is the common layout, later ones are fallbacks for less
//! common bill formats.

use lazy_static::lazy_static;
use regex::Regex;

use super::{ExtractionMatch, FieldExtractor};

/// Literal marker that opens each meter section.
pub const METER_SECTION_MARKER: &str = "Meter Read Details:";

/// A compiled candidate pattern and its rank (0 = tried first).
#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub regex: Regex,
    pub precedence: usize,
}

/// Ordered candidate patterns for one logical field.
///
/// Every pattern must have a capture group 1 holding the value.
#[derive(Debug, Clone)]
pub struct FieldPatterns {
    field: &'static str,
    patterns: Vec<FieldPattern>,
}

impl FieldPatterns {
    /// Compile the candidates case-insensitive and multi-line, keeping their order.
    pub fn new(field: &'static str, sources: &[&str]) -> Result<Self, regex::Error> {
        let patterns = sources
            .iter()
            .enumerate()
            .map(|(precedence, src)| {
                Regex::new(&format!("(?im){}", src)).map(|regex| FieldPattern { regex, precedence })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { field, patterns })
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn patterns(&self) -> &[FieldPattern] {
        &self.patterns
    }

    fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = ExtractionMatch<String>> + 'a {
        self.patterns.iter().flat_map(move |pattern| {
            pattern.regex.captures_iter(text).filter_map(move |caps| {
                let group = caps.get(1)?;
                let value = group.as_str().trim();
                if value.is_empty() {
                    return None;
                }
                Some(ExtractionMatch::new(value.to_string(), pattern.precedence))
            })
        })
    }
}

impl FieldExtractor for FieldPatterns {
    type Output = ExtractionMatch<String>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        let found = self.matches(text).next();
        match &found {
            Some(m) => tracing::debug!(
                "Found {} with pattern #{}: {}",
                self.field,
                m.precedence,
                m.value
            ),
            None => tracing::debug!("No match found for {}", self.field),
        }
        found
    }
}

fn field(name: &'static str, sources: &[&str]) -> FieldPatterns {
    FieldPatterns::new(name, sources).expect("built-in field pattern must compile")
}

lazy_static! {
    pub static ref ACCOUNT_NUMBER: FieldPatterns = field("account_number", &[
        r"Account\s*(?:No|Number|#)[:.\s]*([A-Za-z0-9-]+)",
        r"Account:\s*([A-Za-z0-9-]+)",
        r"Account\s+#?\s*([A-Za-z0-9-]+)",
        r"Account\s+([A-Za-z0-9-]+)",
    ]);

    pub static ref BILL_DATE: FieldPatterns = field("bill_date", &[
        r"Bill\s*Date[:.\s]*([^\n]+)",
        r"Statement\s*Date[:.\s]*([^\n]+)",
        r"Bill\s+Date\s+([^\n]+)",
        r"Bill mailing date is ([^\n]+)",
    ]);

    pub static ref DUE_DATE: FieldPatterns = field("due_date", &[
        r"Due\s*Date[:.\s]*([^\n]+)",
        r"Payment\s*Due\s*Date[:.\s]*([^\n]+)",
        r"Due\s+Date\s+([^\n]+)",
        r"Amount due on or before ([^\n]+)",
    ]);

    pub static ref CURRENT_CHARGES: FieldPatterns = field("current_charges", &[
        r"Current\s*Charges[:.\s]*\$?\s*([\d,.]+)",
        r"Total\s*Current\s*Charges[:.\s]*\$?\s*([\d,.]+)",
        r"Current\s+Charges\s*\$?\s*([\d,.]+)",
        r"Amount due on or before \$?([\d,.]+)",
    ]);

    pub static ref AMOUNT_DUE: FieldPatterns = field("amount_due", &[
        r"Amount\s*Due[:.\s]*\$?\s*([\d,.]+)",
        r"Total\s*Amount\s*Due[:.\s]*\$?\s*([\d,.]+)",
        r"Amount\s+Due\s*\$?\s*([\d,.]+)",
        r"Amount due on or before \$?([\d,.]+)",
    ]);

    pub static ref BALANCE_FORWARD: FieldPatterns = field("balance_forward", &[
        r"Balance\s*Forward[:.\s]*\$?\s*(-?[\d,.]+)",
        r"Previous\s*Balance[:.\s]*\$?\s*(-?[\d,.]+)",
    ]);

    pub static ref LATE_FEE: FieldPatterns = field("late_fee", &[
        r"Late\s*(?:Payment\s*)?(?:Fee|Charge)[:.\s]*\$?\s*([\d,.]+)",
    ]);

    pub static ref REBILL: Regex = Regex::new(r"(?i)rebill").unwrap();

    // Meter sections
    pub static ref METER_NUMBER: Regex = Regex::new(
        r"Meter\s*#\s*([A-Za-z0-9-]+)"
    ).unwrap();

    /// "65221 Actual 65969 Actual 748": previous, current, usage.
    pub static ref METER_READINGS: Regex = Regex::new(
        r"(\d+)\s+(?:Actual|Estimated)\s+(\d+)\s+(?:Actual|Estimated)\s+(\d+)"
    ).unwrap();

    pub static ref METER_UNIT: Regex = Regex::new(
        r"(?i)\d+\s+(kWh|kW|CCF|MCF|Therms?)"
    ).unwrap();

    pub static ref ESTIMATED: Regex = Regex::new(r"(?i)Estimated").unwrap();

    pub static ref MULTIPLIER: Regex = Regex::new(
        r"Multiplier\s+(\d+(?:\.\d+)?)"
    ).unwrap();

    pub static ref SERVICE_PERIOD: Regex = Regex::new(
        r"Service Period\s+(\d{1,2}/\d{1,2})\s*-\s*(\d{1,2}/\d{1,2})"
    ).unwrap();
}
