pub mod config;
pub mod controller;
pub mod db;
pub mod dedup;
pub mod error;
pub mod export;
pub mod models;
pub mod pager;
pub mod pipeline;
pub mod quality;
pub mod stats;

#[cfg(test)]
mod test_utils;

pub use config::Settings;
pub use error::{ExportWriteError, InputValidationError, RunError, UpstreamFetchError};
pub use export::{AggregateExporter, RunSummary};
pub use models::{AcceptedRecord, CollectionTarget, RawRecord};
pub use pipeline::{run, RunRequest};
