//! Pattern-based utility bill parser.

use chrono::{Datelike, Local};
use tracing::{debug, info, warn};

use crate::error::ExtractionError;
use crate::models::bill::{BillRecord, MeterRecord, MAX_METERS};

use super::rules::{
    patterns::*, split_meter_sections, AmountExtractor, DateExtractor, FieldExtractor,
    MeterExtractor,
};
use super::Result;

/// Trait for bill parsing.
pub trait BillParser {
    /// Parse a bill from its extracted text.
    fn parse(&self, text: &str) -> Result<BillRecord>;
}

/// Deterministic regex-driven bill parser.
#[derive(Debug, Clone)]
pub struct PatternBillParser {
    /// Upper bound on accepted meter sections.
    max_meters: usize,
    /// Year for service periods when the bill date is missing.
    reference_year: Option<i32>,
}

impl PatternBillParser {
    /// Create a parser with default settings.
    pub fn new() -> Self {
        Self {
            max_meters: MAX_METERS,
            reference_year: None,
        }
    }

    /// Set the maximum number of meter sections processed.
    pub fn with_max_meters(mut self, max_meters: usize) -> Self {
        self.max_meters = max_meters;
        self
    }

    /// Pin the fallback year used for service periods.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    fn fallback_year(&self) -> i32 {
        self.reference_year.unwrap_or_else(|| Local::now().year())
    }

    fn extract_header(&self, text: &str, record: &mut BillRecord) {
        record.account_number = ACCOUNT_NUMBER.extract(text).map(|m| m.value);
        record.bill_date = DateExtractor::new(&BILL_DATE).extract(text).map(|m| m.value);
        record.due_date = DateExtractor::new(&DUE_DATE).extract(text).map(|m| m.value);
        record.balance_forward = AmountExtractor::new(&BALANCE_FORWARD)
            .extract(text)
            .map(|m| m.value);
        record.current_charges = AmountExtractor::new(&CURRENT_CHARGES)
            .extract(text)
            .map(|m| m.value);
        record.late_fee = AmountExtractor::new(&LATE_FEE).extract(text).map(|m| m.value);
        record.amount_due = AmountExtractor::new(&AMOUNT_DUE).extract(text).map(|m| m.value);
        record.rebill_adjustment = REBILL.is_match(text);
    }

    fn extract_meters(&self, text: &str, year: i32) -> Vec<MeterRecord> {
        let extractor = MeterExtractor::new(year);

        split_meter_sections(text)
            .into_iter()
            .take(self.max_meters)
            .filter_map(|(number, section)| {
                let meter = extractor.extract(&number, section);
                if meter.has_readings() {
                    Some(meter)
                } else {
                    debug!("Dropping meter {} without readings", number);
                    None
                }
            })
            .collect()
    }
}

impl Default for PatternBillParser {
    fn default() -> Self {
        Self::new()
    }
}

impl BillParser for PatternBillParser {
    fn parse(&self, text: &str) -> Result<BillRecord> {
        if text.trim().is_empty() {
            return Err(ExtractionError::NoText);
        }

        info!("Parsing bill from {} characters of text", text.len());

        let mut record = BillRecord::default();
        self.extract_header(text, &mut record);

        let year = record
            .bill_date
            .map(|d| d.year())
            .unwrap_or_else(|| self.fallback_year());
        record.meters = self.extract_meters(text, year);

        for issue in record.validate() {
            warn!("{}", issue);
        }

        debug!(
            "Extracted bill for account {:?} with {} meters",
            record.account_number,
            record.meters.len()
        );

        Ok(record)
    }
}
