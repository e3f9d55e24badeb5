//! Error types for the FFA search pipeline.
//!
//! `FfaError` is the error type shared by the core, search and orchestration
//! layers. It separates three kinds of failure:
//!
//! 1. **Fatal setup errors** - `Configuration`, `UnknownDataFormat`
//!    - Raised immediately, never retried
//!    - Recovery: fix the configuration and rerun
//!
//! 2. **Input errors** - `Io`, `Header`, `InvalidTimeSeries`
//!    - A single input file is missing or malformed
//!    - Recovery: during candidate building the offending cluster is skipped;
//!      elsewhere the error propagates and the file is retried on the next run
//!
//! 3. **Processing errors** - `Search`, `Processing`
//!    - A worker or a processing stage failed
//!    - Recovery: the file's ledger entry is not written, so the next run
//!      picks it up again

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using [`FfaError`].
pub type Result<T> = std::result::Result<T, FfaError>;

/// Primary error type for the search pipeline.
#[derive(Error, Debug)]
pub enum FfaError {
    /// Configuration values parsed but are not usable.
    ///
    /// **Error Type**: Permanent - requires fixing the configuration values.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The configured time-series format is not one of the supported readers.
    ///
    /// **Error Type**: Permanent.
    #[error("Invalid data format '{0}'. Must be one of: presto, sigproc")]
    UnknownDataFormat(String),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A time-series header could not be parsed.
    #[error("Malformed header in '{}': {reason}", path.display())]
    Header { path: PathBuf, reason: String },

    /// Time-series samples are unusable (empty, non-finite sampling time, ...).
    #[error("Invalid time series: {0}")]
    InvalidTimeSeries(String),

    /// A search worker failed on one time series of a batch.
    #[error("Search failed on '{}': {reason}", fname.display())]
    Search { fname: PathBuf, reason: String },

    /// Any other failure inside a processing stage.
    #[error("Processing error: {0}")]
    Processing(String),
}

impl FfaError {
    /// Build a [`FfaError::Header`] for `path`.
    pub fn header(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Header {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error indicates a setup mistake that must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FfaError::Configuration(_) | FfaError::UnknownDataFormat(_)
        )
    }
}
