//! Groups of detections believed to come from the same periodic signal.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detection::Detection;

/// A non-empty, ordered group of [`Detection`]s.
///
/// The brightest member (`top_detection`) is resolved once at construction:
/// the first detection with the maximum S/N wins ties.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCluster {
    detections: Vec<Detection>,
    top: usize,
}

/// Compact description of a cluster, as consumed by the harmonic classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub period: f64,
    pub ducy: f64,
    pub dm: f64,
    pub snr: f64,
    pub num_detections: usize,
}

impl ClusterSummary {
    pub fn frequency(&self) -> f64 {
        1.0 / self.period
    }
}

impl DetectionCluster {
    /// Build a cluster, or `None` when `detections` is empty.
    pub fn new(detections: Vec<Detection>) -> Option<Self> {
        if detections.is_empty() {
            return None;
        }
        let mut top = 0;
        for (index, det) in detections.iter().enumerate().skip(1) {
            if det.snr > detections[top].snr {
                top = index;
            }
        }
        Some(Self { detections, top })
    }

    pub fn top_detection(&self) -> &Detection {
        &self.detections[self.top]
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Always false; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn summary(&self) -> ClusterSummary {
        let top = self.top_detection();
        ClusterSummary {
            period: top.period,
            ducy: top.ducy,
            dm: top.dm,
            snr: top.snr,
            num_detections: self.len(),
        }
    }
}

impl fmt::Display for DetectionCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let top = self.top_detection();
        write!(
            f,
            "DetectionCluster [size = {:4}, P0 = {:.9e}, DM = {:8.3}, S/N = {:6.2}]",
            self.len(),
            top.period,
            top.dm,
            top.snr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_detection;

    #[test]
    fn test_empty_cluster_is_rejected() {
        assert!(DetectionCluster::new(Vec::new()).is_none());
    }

    #[test]
    fn test_top_detection_is_max_snr() {
        let cluster = DetectionCluster::new(vec![
            test_detection(1.0, 10.0, 5.0, 100.0),
            test_detection(1.001, 12.0, 9.0, 100.0),
            test_detection(0.999, 14.0, 3.0, 100.0),
        ])
        .unwrap();
        assert_eq!(cluster.top_detection().snr, 9.0);
        assert_eq!(cluster.top_detection().dm, 12.0);
        assert_eq!(cluster.len(), 3);
    }

    #[test]
    fn test_top_detection_tie_keeps_first() {
        let cluster = DetectionCluster::new(vec![
            test_detection(1.0, 10.0, 4.0, 100.0),
            test_detection(1.0, 20.0, 8.0, 100.0),
            test_detection(1.0, 30.0, 8.0, 100.0),
        ])
        .unwrap();
        assert_eq!(cluster.top_detection().dm, 20.0);
    }

    #[test]
    fn test_summary_uses_top_detection() {
        let cluster = DetectionCluster::new(vec![
            test_detection(2.0, 10.0, 6.0, 100.0),
            test_detection(2.01, 11.0, 7.5, 100.0),
        ])
        .unwrap();
        let summary = cluster.summary();
        assert_eq!(summary.period, 2.01);
        assert_eq!(summary.dm, 11.0);
        assert_eq!(summary.snr, 7.5);
        assert_eq!(summary.num_detections, 2);
    }
}
