//! Raw periodicity-search detections and search attribution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Observation context a detection was produced from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetadata {
    /// Length of the searched time series in seconds.
    pub tobs: f64,
    /// Source time-series file.
    pub fname: PathBuf,
    /// DM trial of the searched time series.
    pub dm: f64,
}

/// One peak reported by the periodicity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Trial period in seconds.
    pub period: f64,
    /// Dispersion measure in pc cm^-3.
    pub dm: f64,
    /// Best boxcar width, in phase bins.
    pub width: u32,
    /// Duty cycle, `width / nbins`.
    pub ducy: f64,
    pub snr: f64,
    pub metadata: DetectionMetadata,
}

impl Detection {
    pub fn frequency(&self) -> f64 {
        1.0 / self.period
    }

    /// Number of pulse periods spanned by an observation of length `tobs`.
    pub fn beat_index(&self, tobs: f64) -> f64 {
        tobs / self.period
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection(P0 = {:.9e}, DM = {:8.3}, width = {:3}, ducy = {:.4}, S/N = {:6.2})",
            self.period, self.dm, self.width, self.ducy, self.snr
        )
    }
}

/// Index of a search range within the pipeline manager's search list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SearchId(pub usize);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search#{}", self.0)
    }
}

/// A payload paired with the search range that produced it.
///
/// The pairing is made once, when detections or clusters are gathered from
/// their searches, and is never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributed<T> {
    payload: T,
    search: SearchId,
}

impl<T> Attributed<T> {
    pub fn new(payload: T, search: SearchId) -> Self {
        Self { payload, search }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn search(&self) -> SearchId {
        self.search
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

#[cfg(test)]
pub(crate) fn test_detection(period: f64, dm: f64, snr: f64, tobs: f64) -> Detection {
    Detection {
        period,
        dm,
        width: 2,
        ducy: 2.0 / 64.0,
        snr,
        metadata: DetectionMetadata {
            tobs,
            fname: PathBuf::from(format!("obs_DM{dm:.2}.inf")),
            dm,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_index() {
        let det = test_detection(0.5, 10.0, 8.0, 100.0);
        assert!((det.beat_index(100.0) - 200.0).abs() < 1e-12);
        assert!((det.frequency() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_attribution_is_fixed_at_construction() {
        let det = test_detection(1.0, 5.0, 7.0, 60.0);
        let tagged = Attributed::new(det.clone(), SearchId(2));
        assert_eq!(tagged.search(), SearchId(2));
        assert_eq!(tagged.payload(), &det);
        assert_eq!(tagged.into_payload(), det);
    }
}
