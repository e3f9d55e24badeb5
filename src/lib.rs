//! # GHRSS FFA pipeline
//!
//! Orchestration layer of the GHRSS survey FFA search. The search itself lives
//! in the workspace crates; this crate wires them into observing dates:
//!
//! - **`config`**: pipeline and search manager configuration (figment, YAML
//!   plus `GHRSS_FFA_` environment overrides).
//! - **`date_worker`**: per-date processing with ledger-driven resume, and the
//!   parallel multi-date run.
//! - **`status`**: plain-text progress report built from a date's ledger.
//! - **`tracing_setup`**: subscriber initialisation.
//! - **`error`**: `AppError`, wrapping the pipeline and storage errors.
//!
//! Crates underneath:
//!
//! - `ffa_core`: data model, time-series readers, preprocessing and folding.
//! - `ffa_search`: DM-trial selection, searches, clustering, harmonic and
//!   candidate filtering, candidate building, `PipelineManager`.
//! - `ffa_storage`: completion ledger, parameter tables, candidate artifacts.

pub mod config;
pub mod date_worker;
pub mod error;
pub mod status;
pub mod tracing_setup;

pub use config::{Backend, ManagerOverrides, PipelineConfig, SearchSetup};
pub use date_worker::{
    run_dates, DateReport, DateWorker, Dedisperser, FileProcessor, InputFile, Precomputed,
    SearchFileProcessor,
};
pub use error::{AppError, AppResult};
