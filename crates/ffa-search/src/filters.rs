//! Candidate filters applied to the final clusters.

use ffa_core::{Attributed, DetectionCluster};
use std::time::Instant;
use tracing::info;

use crate::harmonics::sort_by_snr;
use crate::params::CandidateFilterConfig;

type Clusters = Vec<Attributed<DetectionCluster>>;

fn apply_filter<F>(clusters: Clusters, name: &str, keep: F) -> Clusters
where
    F: Fn(&DetectionCluster) -> bool,
{
    let before = clusters.len();
    let valid: Clusters = clusters.into_iter().filter(|c| keep(c.payload())).collect();
    info!(
        filter = name,
        clusters = before,
        removed = before - valid.len(),
        "Applied candidate filter"
    );
    valid
}

/// Sort by decreasing top S/N, then apply the enabled filters in order:
/// minimum DM, minimum S/N, then keep at most `max_number` clusters.
///
/// A threshold that is absent or zero disables its filter.
pub fn apply_candidate_filters(clusters: Clusters, config: &CandidateFilterConfig) -> Clusters {
    let start = Instant::now();
    let before = clusters.len();
    let mut clusters = sort_by_snr(clusters);

    if let Some(dm_min) = config.dm_min.filter(|v| *v != 0.0) {
        clusters = apply_filter(clusters, &format!("DM >= {dm_min:.2}"), |cl| {
            cl.top_detection().dm >= dm_min
        });
    }
    if let Some(snr_min) = config.snr_min.filter(|v| *v != 0.0) {
        clusters = apply_filter(clusters, &format!("S/N >= {snr_min:.2}"), |cl| {
            cl.top_detection().snr >= snr_min
        });
    }
    if let Some(max_number) = config.max_number.filter(|v| *v != 0) {
        info!(max_number, "Keeping only the brightest candidates");
        clusters.truncate(max_number);
    }
    info!(
        clusters = before,
        kept = clusters.len(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "Candidate filtering finished"
    );
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffa_core::{Detection, DetectionMetadata, SearchId};
    use std::path::PathBuf;

    fn cluster(dm: f64, snr: f64) -> Attributed<DetectionCluster> {
        let det = Detection {
            period: 1.0 + dm / 100.0,
            dm,
            width: 1,
            ducy: 0.05,
            snr,
            metadata: DetectionMetadata {
                tobs: 100.0,
                fname: PathBuf::from("x.inf"),
                dm,
            },
        };
        Attributed::new(DetectionCluster::new(vec![det]).unwrap(), SearchId(0))
    }

    fn key(clusters: &Clusters) -> Vec<(f64, f64)> {
        clusters
            .iter()
            .map(|c| (c.payload().top_detection().dm, c.payload().top_detection().snr))
            .collect()
    }

    fn sample() -> Clusters {
        vec![
            cluster(0.0, 20.0),
            cluster(5.0, 7.0),
            cluster(12.0, 9.5),
            cluster(3.0, 4.0),
            cluster(30.0, 15.0),
            cluster(8.0, 12.0),
            cluster(1.0, 11.0),
        ]
    }

    #[test]
    fn test_disabled_filters_only_sort() {
        let out = apply_candidate_filters(sample(), &CandidateFilterConfig::default());
        let snrs: Vec<f64> = key(&out).into_iter().map(|(_, s)| s).collect();
        assert_eq!(snrs, vec![20.0, 15.0, 12.0, 11.0, 9.5, 7.0, 4.0]);

        let zeros = CandidateFilterConfig {
            dm_min: Some(0.0),
            snr_min: Some(0.0),
            max_number: Some(0),
        };
        assert_eq!(apply_candidate_filters(sample(), &zeros).len(), 7);
    }

    #[test]
    fn test_composition_matches_independent_thresholds() {
        let (x, y, n) = (2.0, 8.0, 3);
        let cfg = CandidateFilterConfig {
            dm_min: Some(x),
            snr_min: Some(y),
            max_number: Some(n),
        };
        let combined = apply_candidate_filters(sample(), &cfg);

        let mut expected: Vec<(f64, f64)> = key(&sample())
            .into_iter()
            .filter(|(dm, _)| *dm >= x)
            .filter(|(_, snr)| *snr >= y)
            .collect();
        expected.sort_by(|a, b| b.1.total_cmp(&a.1));
        expected.truncate(n);
        assert_eq!(key(&combined), expected);
        assert_eq!(key(&combined), vec![(30.0, 15.0), (8.0, 12.0), (12.0, 9.5)]);
    }

    #[test]
    fn test_cap_keeps_brightest() {
        let cfg = CandidateFilterConfig {
            max_number: Some(2),
            ..Default::default()
        };
        let out = apply_candidate_filters(sample(), &cfg);
        assert_eq!(key(&out), vec![(0.0, 20.0), (30.0, 15.0)]);
    }

    #[test]
    fn test_filtering_logs_elapsed_time() {
        let cfg = CandidateFilterConfig {
            snr_min: Some(10.0),
            ..Default::default()
        };
        let (out, logs) = crate::test_log::capture(|| apply_candidate_filters(sample(), &cfg));
        assert_eq!(out.len(), 4);
        let line = logs
            .lines()
            .find(|l| l.contains("Candidate filtering finished"))
            .unwrap();
        assert!(line.contains("clusters=7"));
        assert!(line.contains("kept=4"));
        assert!(line.contains("elapsed_s="));
    }
}
