//! Tolerant conversion of model output into a [`BillRecord`].
//!
//! Models wrap JSON in markdown fences, nest the header fields, write dates
//! as free text and numbers as strings. All of that is normalized here
//! before the typed record is deserialized.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::bill::rules::{parse_amount, parse_date};
use crate::error::LlmError;
use crate::models::bill::{BillRecord, BillType, MAX_METERS};

const BILL_NUMERIC_FIELDS: &[&str] = &["balance_forward", "current_charges", "late_fee", "amount_due"];
const BILL_DATE_FIELDS: &[&str] = &["bill_date", "due_date"];

const METER_NUMERIC_FIELDS: &[&str] = &[
    "previous_reading",
    "meter_reading",
    "multiplier",
    "usage",
    "utility_charges",
    "utility_taxes",
    "supply_charges",
    "supply_taxes",
    "other_charge",
    "rec_charge",
    "therm_factor",
    "adjustment_factor",
    "demand",
    "kw_actual",
    "kw_billed",
    "power_factor",
];
const METER_DATE_FIELDS: &[&str] = &["previous_read_date", "read_date"];

const NON_DATES: &[&str] = &["upon receipt", "due on receipt"];

/// Strip surrounding markdown code fences.
pub fn clean_response(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Lenient date parsing: ISO forms first, then the engine's date formats.
///
/// Placeholders such as "Upon Receipt" yield `None`.
pub fn lenient_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let lower = s.to_lowercase();
    if NON_DATES.iter().any(|p| lower.contains(p)) {
        warn!("Special date case encountered: {:?}", s);
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    parse_date(s)
}

/// Accept numbers either as JSON numbers or as strings.
pub fn lenient_number(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Parse raw model output into a bill record.
pub fn parse_response(raw: &str) -> Result<BillRecord, LlmError> {
    let cleaned = clean_response(raw);
    if cleaned.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let Value::Object(mut data) = value else {
        return Err(LlmError::InvalidResponse("expected a JSON object".to_string()));
    };

    if let Some(Value::Object(basic)) = data.remove("basic_information") {
        debug!("Flattening nested basic_information");
        data.extend(basic);
    }

    normalize_fields(&mut data, BILL_NUMERIC_FIELDS, BILL_DATE_FIELDS);

    match data.remove("meters") {
        Some(Value::Array(meters)) => {
            let mut normalized: Vec<Value> = meters
                .into_iter()
                .filter_map(|m| match m {
                    Value::Object(mut meter) => {
                        normalize_fields(&mut meter, METER_NUMERIC_FIELDS, METER_DATE_FIELDS);
                        normalize_bill_type(&mut meter);
                        Some(Value::Object(meter))
                    }
                    other => {
                        warn!("Ignoring non-object meter entry: {}", other);
                        None
                    }
                })
                .collect();

            if normalized.len() > MAX_METERS {
                warn!("Model returned {} meters, keeping the first {}", normalized.len(), MAX_METERS);
                normalized.truncate(MAX_METERS);
            }
            data.insert("meters".to_string(), Value::Array(normalized));
        }
        Some(Value::Null) | None => {}
        Some(other) => warn!("Ignoring non-array meters value: {}", other),
    }

    // Source file is set by the caller, never by the model.
    data.remove("source_file");

    serde_json::from_value(Value::Object(data)).map_err(|e| LlmError::InvalidResponse(e.to_string()))
}

fn normalize_fields(obj: &mut Map<String, Value>, numeric: &[&str], dates: &[&str]) {
    for &field in numeric {
        if let Some(value) = obj.get(field) {
            match lenient_number(value) {
                Some(n) => {
                    obj.insert(field.to_string(), Value::String(n.to_string()));
                }
                None => {
                    if !value.is_null() {
                        warn!("Dropping unparseable {}: {}", field, value);
                    }
                    obj.remove(field);
                }
            }
        }
    }

    for &field in dates {
        let parsed = obj.get(field).and_then(Value::as_str).and_then(lenient_date);
        match parsed {
            Some(date) => {
                obj.insert(field.to_string(), Value::String(date.format("%Y-%m-%d").to_string()));
            }
            None => {
                obj.remove(field);
            }
        }
    }

    // Nulls fall back to the record defaults.
    obj.retain(|_, v| !v.is_null());
}

fn normalize_bill_type(meter: &mut Map<String, Value>) {
    if let Some(value) = meter.get("bill_type") {
        if serde_json::from_value::<BillType>(value.clone()).is_err() {
            warn!("Unknown bill type: {}", value);
            meter.remove("bill_type");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_clean_response() {
        assert_eq!(clean_response("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(clean_response("```\n{}\n```"), "{}");
        assert_eq!(clean_response("  {}  "), "{}");
    }

    #[test]
    fn test_lenient_date() {
        assert_eq!(lenient_date("2025-01-24"), Some(ymd(2025, 1, 24)));
        assert_eq!(lenient_date("2025-01-24T00:00:00"), Some(ymd(2025, 1, 24)));
        assert_eq!(lenient_date("01/24/2025"), Some(ymd(2025, 1, 24)));
        assert_eq!(lenient_date("Upon Receipt"), None);
        assert_eq!(lenient_date("DUE ON RECEIPT"), None);
        assert_eq!(lenient_date("soon"), None);
    }

    #[test]
    fn test_lenient_number() {
        assert_eq!(lenient_number(&serde_json::json!(351.25)), Some(Decimal::new(35125, 2)));
        assert_eq!(lenient_number(&serde_json::json!("$1,234.56")), Some(Decimal::new(123456, 2)));
        assert_eq!(lenient_number(&serde_json::json!(true)), None);
        assert_eq!(lenient_number(&Value::Null), None);
    }

    #[test]
    fn test_parse_nested_response() {
        let raw = r#"```json
{
  "basic_information": {
    "account_number": "123-456-789",
    "bill_date": "2025-01-24",
    "due_date": "Upon Receipt",
    "amount_due": 351.25,
    "rebill_adjustment": null
  },
  "current_charges": "250.75",
  "meters": [
    {
      "meter_number": "8812345",
      "bill_type": "EB bill",
      "usage": 748,
      "multiplier": null,
      "unit": "kWh",
      "estimated": false,
      "read_date": "2025-01-24"
    },
    {
      "meter_number": "W-100200",
      "bill_type": "Sewer bill",
      "usage": "12"
    }
  ]
}
```"#;

        let record = parse_response(raw).unwrap();
        assert_eq!(record.account_number.as_deref(), Some("123-456-789"));
        assert_eq!(record.bill_date, Some(ymd(2025, 1, 24)));
        assert_eq!(record.due_date, None);
        assert_eq!(record.amount_due, Some(Decimal::new(35125, 2)));
        assert_eq!(record.current_charges, Some(Decimal::new(25075, 2)));
        assert!(!record.rebill_adjustment);

        assert_eq!(record.meters.len(), 2);
        assert_eq!(record.meters[0].bill_type, Some(BillType::Electric));
        assert_eq!(record.meters[0].multiplier, Decimal::ONE);
        assert_eq!(record.meters[0].usage, Some(Decimal::new(748, 0)));
        assert_eq!(record.meters[1].bill_type, None);
        assert_eq!(record.meters[1].usage, Some(Decimal::new(12, 0)));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(parse_response("[1, 2]"), Err(LlmError::InvalidResponse(_))));
        assert!(matches!(parse_response("not json"), Err(LlmError::InvalidResponse(_))));
        assert!(matches!(parse_response("```json\n```"), Err(LlmError::EmptyResponse)));
    }

    #[test]
    fn test_meter_limit() {
        let raw = r#"{"meters": [{"meter_number": "1"}, {"meter_number": "2"}, {"meter_number": "3"}, {"meter_number": "4"}]}"#;
        let record = parse_response(raw).unwrap();
        assert_eq!(record.meters.len(), MAX_METERS);
    }
}
