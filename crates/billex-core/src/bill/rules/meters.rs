//! Meter section segmentation and per-meter extraction.

use rust_decimal::Decimal;
use tracing::{debug, info};

use super::amounts::parse_amount;
use super::dates::parse_service_period;
use super::patterns::{
    ESTIMATED, METER_NUMBER, METER_READINGS, METER_SECTION_MARKER, METER_UNIT, MULTIPLIER,
    SERVICE_PERIOD,
};
use crate::models::bill::MeterRecord;

/// Plausibility check for a candidate meter number.
///
/// Real meter numbers are 5 to 15 characters, contain digits and are not
/// mostly letters; anything else is usually a word picked up from prose.
pub fn is_valid_meter_number(meter_num: &str) -> bool {
    let len = meter_num.chars().count();
    if !(5..=15).contains(&len) {
        return false;
    }

    if !meter_num.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    let letters = meter_num.chars().filter(|c| c.is_alphabetic()).count();
    letters * 2 <= len
}

/// Split text into `(meter_number, section)` pairs.
///
/// Sections are the pieces after each "Meter Read Details:" marker; those
/// without a plausible meter number are dropped.
pub fn split_meter_sections(text: &str) -> Vec<(String, &str)> {
    let mut sections = Vec::new();

    for section in text.split(METER_SECTION_MARKER).skip(1) {
        let Some(caps) = METER_NUMBER.captures(section) else {
            debug!("Meter section without a meter number");
            continue;
        };

        let meter_num = &caps[1];
        if is_valid_meter_number(meter_num) {
            debug!("Found valid meter section with meter number: {}", meter_num);
            sections.push((meter_num.to_string(), section));
        } else {
            debug!("Rejected invalid meter number: {}", meter_num);
        }
    }

    info!("Found {} valid meter sections", sections.len());
    sections
}

/// Previous reading, current reading and usage, all or nothing.
pub fn extract_readings(section: &str) -> Option<(Decimal, Decimal, Decimal)> {
    let caps = METER_READINGS.captures(section)?;
    Some((
        parse_amount(&caps[1])?,
        parse_amount(&caps[2])?,
        parse_amount(&caps[3])?,
    ))
}

/// Extracts a [`MeterRecord`] from one meter section.
pub struct MeterExtractor {
    /// Year applied to "MM/DD" service period bounds.
    year: i32,
}

impl MeterExtractor {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    /// Build the record for a section; callers decide whether to keep it.
    pub fn extract(&self, meter_number: &str, section: &str) -> MeterRecord {
        let mut meter = MeterRecord::new(meter_number);

        if let Some((previous, current, usage)) = extract_readings(section) {
            meter.previous_reading = Some(previous);
            meter.meter_reading = Some(current);
            meter.usage = Some(usage);
        }

        if let Some(caps) = METER_UNIT.captures(section) {
            meter.unit = Some(caps[1].to_string());
        }

        meter.estimated = ESTIMATED.is_match(section);

        if let Some(multiplier) = MULTIPLIER.captures(section).and_then(|c| parse_amount(&c[1])) {
            meter.multiplier = multiplier;
        }

        if let Some(caps) = SERVICE_PERIOD.captures(section) {
            if let Some((from, to)) = parse_service_period(&caps[1], &caps[2], self.year) {
                meter.previous_read_date = Some(from);
                meter.read_date = Some(to);
            }
        }

        debug!(
            "Meter {}: readings {:?} -> {:?}, usage {:?} {:?}",
            meter.meter_number,
            meter.previous_reading,
            meter.meter_reading,
            meter.usage,
            meter.unit
        );

        meter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_meter_numbers() {
        assert!(is_valid_meter_number("12345"));
        assert!(is_valid_meter_number("AB12345"));
        assert!(is_valid_meter_number("123-456-789"));
        assert!(is_valid_meter_number("ABC123"));
    }

    #[test]
    fn test_invalid_meter_numbers() {
        assert!(!is_valid_meter_number("12"));
        assert!(!is_valid_meter_number("1234567890123456"));
        assert!(!is_valid_meter_number("Number"));
        assert!(!is_valid_meter_number("ABCD12"));
        assert!(!is_valid_meter_number(""));
    }

    #[test]
    fn test_split_sections() {
        let text = "Header\nMeter Read Details: Meter # 12 bogus\n\
                    Meter Read Details: Meter # 8812345 stuff\n\
                    Meter Read Details: no number here\n\
                    Meter Read Details: Meter #AB-99001 more";
        let sections = split_meter_sections(text);
        let numbers: Vec<&str> = sections.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(numbers, vec!["8812345", "AB-99001"]);
    }

    #[test]
    fn test_no_marker_no_sections() {
        assert!(split_meter_sections("Meter # 8812345 65221 Actual 65969 Actual 748").is_empty());
    }

    #[test]
    fn test_extract_meter() {
        let section = " Meter # 8812345\n\
                       Service Period 12/20 - 01/24\n\
                       65221 Actual 65969 Estimated 748 748 kWh\n\
                       Multiplier 2.5\n";
        let meter = MeterExtractor::new(2025).extract("8812345", section);

        assert_eq!(meter.meter_number, "8812345");
        assert_eq!(meter.previous_reading, Some(Decimal::new(65221, 0)));
        assert_eq!(meter.meter_reading, Some(Decimal::new(65969, 0)));
        assert_eq!(meter.usage, Some(Decimal::new(748, 0)));
        assert_eq!(meter.unit.as_deref(), Some("kWh"));
        assert!(meter.estimated);
        assert_eq!(meter.multiplier, Decimal::new(25, 1));
        assert_eq!(meter.previous_read_date, NaiveDate::from_ymd_opt(2025, 12, 20));
        assert_eq!(meter.read_date, NaiveDate::from_ymd_opt(2025, 1, 24));
        assert!(meter.has_readings());
    }

    #[test]
    fn test_extract_meter_without_readings() {
        let meter = MeterExtractor::new(2025).extract("AB12345", " Meter # AB12345\nUsage pending\n");
        assert_eq!(meter.multiplier, Decimal::ONE);
        assert!(!meter.estimated);
        assert!(meter.unit.is_none());
        assert!(!meter.has_readings());
    }
}
