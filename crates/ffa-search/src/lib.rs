//! # ffa-search
//!
//! Search stage of the FFA pipeline: from a set of dedispersed time series to
//! a ranked list of candidates.
//!
//! | Module          | Purpose                                                  |
//! |-----------------|----------------------------------------------------------|
//! | [`dm_select`]   | DM-trial selection and batching of input files           |
//! | [`periodogram`] | Periodicity-search capability and its folding reference  |
//! | [`worker`]      | Thread pool running searches over a batch                |
//! | [`search`]      | Per-range detection accumulator and clustering           |
//! | [`clustering`]  | One-dimensional single-linkage clustering                |
//! | [`harmonics`]   | Harmonic classification and filtering                    |
//! | [`filters`]     | Threshold and rank filters on final clusters             |
//! | [`builder`]     | Candidate construction from clusters                     |
//! | [`manager`]     | End-to-end run sequencing                                |

pub mod builder;
pub mod clustering;
pub mod dm_select;
pub mod error;
pub mod filters;
pub mod harmonics;
pub mod manager;
pub mod params;
pub mod periodogram;
pub mod search;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_log {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a plain-text subscriber and return what it logged.
    pub fn capture<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = Buffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
        (out, text)
    }
}

pub use error::{PipelineError, PipelineResult};
pub use harmonics::{HarmonicClassifier, HarmonicFlag, RationalHarmonicClassifier};
pub use manager::{PipelineManager, RunSummary};
pub use params::{
    CandidateFilterConfig, CandidateShape, DetectParams, HarmonicFilterConfig, ManagerConfig,
    SearchConfig, SearchParams,
};
pub use periodogram::{FoldingSearch, PeriodicitySearch, Periodogram};
pub use search::PulsarSearch;
