//! Core library for utility bill extraction.
//!
//! This crate provides:
//! - Document text extraction (PDF via lopdf/pdf-extract, plain text)
//! - Pattern-based bill field extraction (account, dates, charges, meters)
//! - An optional LLM extraction collaborator
//! - Batch orchestration with bounded concurrency
//! - Job and result storage (in-memory or SQLite)

pub mod bill;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod pdf;
pub mod store;

pub use bill::{BillParser, PatternBillParser};
pub use error::{BillexError, Result};
pub use extractor::{extractor_for, DocumentExtractor, PatternExtractor};
pub use models::{BillRecord, BillType, BillexConfig, ExtractionResult, Job, JobId, JobStatus, MeterRecord};
pub use orchestrator::{Document, Orchestrator};
pub use pdf::{DocumentKind, TextSource};
pub use store::{open_store, InMemoryTaskStore, TaskStore};

#[cfg(feature = "sqlite")]
pub use store::SqliteTaskStore;

#[cfg(feature = "llm")]
pub use extractor::LlmExtractor;
