//! Candidate builder.

use ffa_core::{Attributed, Candidate, DataFormat, DetectionCluster, FfaError, Result};
use tracing::{error, info};

use crate::params::SearchConfig;

/// Build a candidate from the top detection of `cluster`.
///
/// The source series is reloaded and preprocessed exactly as at search time,
/// then folded with the search's candidate shape.
pub fn build_candidate(
    format: DataFormat,
    cluster: &DetectionCluster,
    search: &SearchConfig,
) -> Result<Candidate> {
    let fname = &cluster.top_detection().metadata.fname;
    let mut tseries = format.load(fname)?;
    tseries.deredden(search.search.rmed_width, search.search.rmed_minpts)?;
    tseries.normalise();
    Candidate::from_cluster(
        cluster,
        &search.name,
        &tseries,
        search.candidates.nbins,
        search.candidates.nsubs,
    )
}

/// Build candidates from every cluster, sorted by decreasing S/N.
///
/// A cluster whose candidate cannot be built is logged and skipped. Clusters
/// are resolved to their search configuration through their attribution.
pub fn build_candidates(
    format: DataFormat,
    clusters: &[Attributed<DetectionCluster>],
    searches: &[SearchConfig],
) -> Vec<Candidate> {
    info!(clusters = clusters.len(), "Building candidates");
    let mut candidates: Vec<Candidate> = clusters
        .iter()
        .filter_map(|cl| {
            let result = searches
                .get(cl.search().0)
                .ok_or_else(|| FfaError::Processing(format!("no configuration for {}", cl.search())))
                .and_then(|search| build_candidate(format, cl.payload(), search));
            match result {
                Ok(cand) => Some(cand),
                Err(e) => {
                    error!(
                        reason = %e,
                        "Failed to build candidate from {}",
                        cl.payload()
                    );
                    None
                }
            }
        })
        .collect();

    candidates.sort_by(|a, b| b.params.best_snr.total_cmp(&a.params.best_snr));
    info!(candidates = candidates.len(), "Done building candidates");
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_search_config;
    use crate::periodogram::pulse_train;
    use ffa_core::formats::presto;
    use ffa_core::{Detection, DetectionMetadata, SearchId};
    use std::path::Path;

    fn cluster(fname: &Path, period: f64, snr: f64) -> Attributed<DetectionCluster> {
        let det = Detection {
            period,
            dm: 10.0,
            width: 2,
            ducy: 2.0 / 32.0,
            snr,
            metadata: DetectionMetadata {
                tobs: 10.0,
                fname: fname.to_path_buf(),
                dm: 10.0,
            },
        };
        Attributed::new(DetectionCluster::new(vec![det]).unwrap(), SearchId(0))
    }

    #[test]
    fn test_missing_file_skips_only_that_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good_DM10.00.inf");
        presto::write(
            &good,
            &pulse_train(0.8, 1e-3, 10_000, 2.0),
            1e-3,
            10.0,
            "05:34:31.97",
            "22:00:52.07",
        )
        .unwrap();
        let missing = dir.path().join("missing.inf");

        let clusters = vec![
            cluster(&good, 0.8, 12.0),
            cluster(&missing, 0.5, 30.0),
            cluster(&good, 1.6, 20.0),
        ];
        let cands = build_candidates(DataFormat::Presto, &clusters, &[test_search_config("short")]);

        assert_eq!(cands.len(), 2);
        assert_eq!(cands[0].params.best_snr, 20.0);
        assert_eq!(cands[0].params.best_period, 1.6);
        assert_eq!(cands[1].params.best_period, 0.8);
        assert_eq!(cands[1].params.best_dm, 10.0);
        assert_eq!(cands[1].subints.len(), 8);
        assert_eq!(cands[1].search_name, "short");
    }

    #[test]
    fn test_unknown_search_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let clusters = vec![Attributed::new(
            cluster(&dir.path().join("a.inf"), 1.0, 9.0).into_payload(),
            SearchId(4),
        )];
        assert!(build_candidates(DataFormat::Presto, &clusters, &[]).is_empty());
    }
}
