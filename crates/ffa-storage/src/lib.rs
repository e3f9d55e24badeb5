//! Durable outputs of the FFA search pipeline: the per-date completion
//! ledger, the tab-separated parameter tables and candidate artifacts.

pub mod artifacts;
pub mod error;
pub mod ledger;
pub mod tables;

pub use artifacts::{candidate_basename, load_candidate, save_candidate, save_candidates};
pub use error::{StorageError, StorageResult};
pub use ledger::{read_ledger, ConfigSnapshot, FileRecord, Ledger, LedgerContents, LedgerRecord};
