//! Data models shared across billex.

pub mod bill;
pub mod config;
pub mod job;

pub use bill::{BillRecord, BillType, MeterRecord, MAX_METERS};
pub use config::BillexConfig;
pub use job::{ExtractionResult, Job, JobId, JobStatus, ResultStatus};
