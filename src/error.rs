//! Error type of the orchestration layer.
//!
//! `AppError` sits above the pipeline crates and adds the failures specific to
//! running whole observing dates: configuration loading (figment) and the
//! external dedispersion stage.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: the configuration file could not be read or deserialised.
//! - **`Configuration`**: values that parse but cannot be used.
//! - **`Pipeline`**: anything raised by a search-pipeline run, including its
//!   core and storage errors.
//! - **`Storage`**: ledger failures raised while resuming or recording a date.
//! - **`Dedispersion`**: the dedispersion stage failed for one input file.
//! - **`Io`**: directory creation and discovery.
//!
//! [`AppError::is_fatal`] decides whether a date is aborted or only the current
//! file is skipped.

use ffa_core::FfaError;
use ffa_search::PipelineError;
use ffa_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Dedispersion of '{}' failed: {reason}", input.display())]
    Dedispersion { input: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether the error must abort the whole date rather than one file.
    pub fn is_fatal(&self) -> bool {
        match self {
            AppError::Config(_) | AppError::Configuration(_) => true,
            AppError::Pipeline(e) => e.is_fatal(),
            AppError::Storage(e) => e.is_fatal(),
            AppError::Dedispersion { .. } | AppError::Io(_) => false,
        }
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(Box::new(e))
    }
}

impl From<FfaError> for AppError {
    fn from(e: FfaError) -> Self {
        AppError::Pipeline(PipelineError::Core(e))
    }
}
