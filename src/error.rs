use std::path::PathBuf;

use thiserror::Error;

/// Malformed run request. Raised before anything is fetched.
#[derive(Debug, Error, PartialEq)]
pub enum InputValidationError {
    #[error("run request has no targets")]
    NoTargets,
    #[error("target #{index} has an empty id")]
    EmptyTargetId { index: usize },
    #[error("target {id} is listed more than once")]
    DuplicateTargetId { id: String },
    #[error("requested count per target must be at least 1 (got {0})")]
    RequestedCountTooSmall(i64),
    #[error("filter threshold must be within [0, 1] (got {0})")]
    ThresholdOutOfRange(f64),
    #[error("malformed run request: {0}")]
    Malformed(String),
}

/// Failure of a single upstream page fetch. Recovered per target, never fatal.
#[derive(Debug, Error)]
pub enum UpstreamFetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("could not decode upstream document: {0}")]
    Decode(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The export artifact could not be written. Fails the whole run.
#[derive(Debug, Error)]
pub enum ExportWriteError {
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize export rows: {0}")]
    Serialize(#[from] csv::Error),
    #[error("failed to write export file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Input(#[from] InputValidationError),
    #[error(transparent)]
    Export(#[from] ExportWriteError),
}
