//! Rule-based field extractors for utility bills.

pub mod amounts;
pub mod dates;
pub mod meters;
pub mod patterns;

pub use amounts::{parse_amount, AmountExtractor};
pub use dates::{parse_date, parse_service_period, DateExtractor};
pub use meters::{is_valid_meter_number, split_meter_sections, MeterExtractor};
pub use patterns::*;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;
}

/// A matched value and the rank of the pattern that produced it.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    pub value: T,
    /// Rank of the candidate pattern (0 = primary).
    pub precedence: usize,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, precedence: usize) -> Self {
        Self { value, precedence }
    }

    /// Convert the value, keeping the precedence.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExtractionMatch<U> {
        ExtractionMatch {
            value: f(self.value),
            precedence: self.precedence,
        }
    }
}
