//! Rendering bill records as JSON, CSV or text.

use std::fmt::Display;

use billex_core::{BillRecord, MeterRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per meter
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub fn format_bill(record: &BillRecord, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(record)?),
        OutputFormat::Csv => format_csv(record),
        OutputFormat::Text => Ok(format_text(record)),
    }
}

fn opt<T: Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

const CSV_HEADER: [&str; 16] = [
    "account_number",
    "bill_date",
    "due_date",
    "balance_forward",
    "current_charges",
    "late_fee",
    "amount_due",
    "rebill_adjustment",
    "meter_number",
    "previous_read_date",
    "read_date",
    "previous_reading",
    "meter_reading",
    "multiplier",
    "usage",
    "unit",
];

fn format_csv(record: &BillRecord) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(CSV_HEADER)?;

    let bill = [
        opt(&record.account_number),
        opt(&record.bill_date),
        opt(&record.due_date),
        opt(&record.balance_forward),
        opt(&record.current_charges),
        opt(&record.late_fee),
        opt(&record.amount_due),
        record.rebill_adjustment.to_string(),
    ];

    if record.meters.is_empty() {
        let row: Vec<String> = bill.iter().cloned().chain(std::iter::repeat_n(String::new(), 8)).collect();
        wtr.write_record(&row)?;
    }

    for meter in &record.meters {
        let row: Vec<String> = bill.iter().cloned().chain(meter_columns(meter)).collect();
        wtr.write_record(&row)?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn meter_columns(meter: &MeterRecord) -> [String; 8] {
    [
        meter.meter_number.clone(),
        opt(&meter.previous_read_date),
        opt(&meter.read_date),
        opt(&meter.previous_reading),
        opt(&meter.meter_reading),
        meter.multiplier.to_string(),
        opt(&meter.usage),
        opt(&meter.unit),
    ]
}

fn format_text(record: &BillRecord) -> String {
    let mut output = String::new();

    if let Some(source) = &record.source_file {
        output.push_str(&format!("Source: {}\n", source));
    }
    output.push_str(&format!(
        "Account: {}\n",
        record.account_number.as_deref().unwrap_or("-")
    ));
    if let Some(date) = record.bill_date {
        output.push_str(&format!("Bill date: {}\n", date));
    }
    if let Some(date) = record.due_date {
        output.push_str(&format!("Due date: {}\n", date));
    }
    output.push('\n');

    output.push_str("Charges:\n");
    for (label, value) in [
        ("Balance forward", record.balance_forward),
        ("Current charges", record.current_charges),
        ("Late fee", record.late_fee),
        ("Amount due", record.amount_due),
    ] {
        if let Some(value) = value {
            output.push_str(&format!("  {:<16} ${}\n", format!("{}:", label), value));
        }
    }
    if record.rebill_adjustment {
        output.push_str("  (rebill/adjustment)\n");
    }

    for meter in &record.meters {
        output.push('\n');
        output.push_str(&format!("Meter {}", meter.meter_number));
        if meter.estimated {
            output.push_str(" (estimated)");
        }
        output.push('\n');
        if let (Some(from), Some(to)) = (meter.previous_read_date, meter.read_date) {
            output.push_str(&format!("  Period:   {} - {}\n", from, to));
        }
        if let (Some(prev), Some(curr)) = (meter.previous_reading, meter.meter_reading) {
            output.push_str(&format!("  Readings: {} -> {}\n", prev, curr));
        }
        if let Some(usage) = meter.usage {
            output.push_str(&format!(
                "  Usage:    {} {}\n",
                usage,
                meter.unit.as_deref().unwrap_or("")
            ));
        }
    }

    output
}
