//! Error type of a search-pipeline run.
//!
//! A run touches both the core layer (reading, searching, folding) and the
//! storage layer (tables, artifacts). `PipelineError` wraps either so callers
//! can tell fatal setup mistakes from failures that only affect one file.

use ffa_core::FfaError;
use ffa_storage::StorageError;
use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] FfaError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// Whether the error must abort the whole run rather than just one file.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Core(e) => e.is_fatal(),
            PipelineError::Storage(e) => e.is_fatal(),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Core(FfaError::Io(e))
    }
}
