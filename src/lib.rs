pub mod answers;
pub mod config;
pub mod cumulative;
pub mod error;
pub mod fiscal;
pub mod import;
pub mod merge;
pub mod models;
pub mod report;
pub mod service;
pub mod storage;

pub use answers::{AnswerInput, Normalized, Scalar, Vector84, SLOT_COUNT};
pub use config::StorageConfig;
pub use error::{Error, Result};
pub use models::{IdentityKey, Report, ReportFilter, ReportPayload, StorageInfo, Upserted};
pub use service::{Preview, ReportService, Submission, SubmissionBody};
pub use storage::ReportStore;
