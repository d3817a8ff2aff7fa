//! LLM-backed bill extraction.

#[cfg(feature = "llm")]
mod client;
pub mod prompt;
pub mod response;

#[cfg(feature = "llm")]
pub use client::LlmBillExtractor;
pub use response::{clean_response, lenient_date, lenient_number, parse_response};
