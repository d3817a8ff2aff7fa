//! Utility bill data models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of meters kept on a single bill.
pub const MAX_METERS: usize = 3;

/// Structured data extracted from one utility bill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillRecord {
    /// Customer account number as printed on the bill.
    pub account_number: Option<String>,

    /// Date the bill was issued.
    pub bill_date: Option<NaiveDate>,

    /// Payment due date.
    pub due_date: Option<NaiveDate>,

    /// Unpaid balance carried over from the previous bill.
    pub balance_forward: Option<Decimal>,

    /// Charges for the current billing period.
    pub current_charges: Option<Decimal>,

    /// Late payment fee.
    pub late_fee: Option<Decimal>,

    /// Total amount due.
    pub amount_due: Option<Decimal>,

    /// Bill mentions a rebill/adjustment.
    pub rebill_adjustment: bool,

    /// Meters billed on this statement, in document order.
    pub meters: Vec<MeterRecord>,

    /// Name of the uploaded file this record came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
}

/// Kind of utility a meter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillType {
    #[serde(rename = "Water bill", alias = "water")]
    Water,
    #[serde(rename = "Telecom bill", alias = "telecom")]
    Telecom,
    #[serde(rename = "EB bill", alias = "electric", alias = "Electric bill")]
    Electric,
    #[serde(rename = "Gas bill", alias = "gas")]
    Gas,
}

/// Readings and charges for a single meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterRecord {
    /// Meter identifier.
    pub meter_number: String,

    /// Utility type, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_type: Option<BillType>,

    /// Start of the service period.
    pub previous_read_date: Option<NaiveDate>,

    /// End of the service period.
    pub read_date: Option<NaiveDate>,

    /// Reading at the start of the period.
    pub previous_reading: Option<Decimal>,

    /// Reading at the end of the period.
    pub meter_reading: Option<Decimal>,

    /// Meter multiplier (default: 1).
    pub multiplier: Decimal,

    /// Billed usage.
    pub usage: Option<Decimal>,

    /// Unit of measure (kWh, CCF, Therms, ...).
    pub unit: Option<String>,

    /// At least one reading was estimated.
    pub estimated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub utility_charges: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utility_taxes: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply_charges: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supply_taxes: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_charge: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rec_charge: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub therm_factor: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjustment_factor: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub demand: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kw_actual: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kw_billed: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_factor: Option<Decimal>,
}

impl Default for MeterRecord {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl MeterRecord {
    /// Create an empty meter record for the given meter number.
    pub fn new(meter_number: impl Into<String>) -> Self {
        Self {
            meter_number: meter_number.into(),
            bill_type: None,
            previous_read_date: None,
            read_date: None,
            previous_reading: None,
            meter_reading: None,
            multiplier: Decimal::ONE,
            usage: None,
            unit: None,
            estimated: false,
            utility_charges: None,
            utility_taxes: None,
            supply_charges: None,
            supply_taxes: None,
            other_charge: None,
            rec_charge: None,
            therm_factor: None,
            adjustment_factor: None,
            demand: None,
            kw_actual: None,
            kw_billed: None,
            power_factor: None,
        }
    }

    /// A meter is worth keeping only with a number and at least one reading.
    pub fn has_readings(&self) -> bool {
        !self.meter_number.is_empty()
            && (self.previous_reading.is_some()
                || self.meter_reading.is_some()
                || self.usage.is_some())
    }
}

impl BillRecord {
    /// Check the record for gaps and inconsistencies.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.account_number.is_none() {
            issues.push("Missing account number".to_string());
        }

        if self.bill_date.is_none() {
            issues.push("Missing bill date".to_string());
        }

        if self.amount_due.is_none() && self.current_charges.is_none() {
            issues.push("No charges found".to_string());
        }

        if let (Some(bill), Some(due)) = (self.bill_date, self.due_date) {
            if due < bill {
                issues.push(format!("Due date {} precedes bill date {}", due, bill));
            }
        }

        if self.meters.len() > MAX_METERS {
            issues.push(format!(
                "{} meters found, at most {} are supported",
                self.meters.len(),
                MAX_METERS
            ));
        }

        for meter in &self.meters {
            if let (Some(prev), Some(curr), Some(usage)) =
                (meter.previous_reading, meter.meter_reading, meter.usage)
            {
                // Rollover and multiplier make this legitimately differ, so only flag odd cases.
                if curr >= prev && (curr - prev) * meter.multiplier != usage && curr - prev != usage {
                    issues.push(format!(
                        "Meter {} usage {} does not match readings {} -> {}",
                        meter.meter_number, usage, prev, curr
                    ));
                }
            }
        }

        issues
    }
}
