//! Detection accumulator for one search range.

use ffa_core::stats::median;
use ffa_core::{Detection, DetectionCluster, Result, SearchId, TimeSeries};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, Span};

use crate::clustering::cluster_1d;
use crate::params::SearchConfig;
use crate::periodogram::PeriodicitySearch;
use crate::worker::{SearchWorker, WorkerPool};

/// Accumulates detections of one search range over all DM-trial batches,
/// then clusters them.
///
/// Several searches usually cover adjacent period ranges, longer periods
/// being searched with more phase bins.
#[derive(Debug)]
pub struct PulsarSearch {
    id: SearchId,
    config: SearchConfig,
    detections: Vec<Detection>,
    clusters: Vec<DetectionCluster>,
    walltime: Duration,
    span: Span,
}

impl PulsarSearch {
    pub fn new(id: SearchId, config: SearchConfig) -> Self {
        let span = info_span!("search", name = %config.name);
        Self {
            id,
            config,
            detections: Vec::new(),
            clusters: Vec::new(),
            walltime: Duration::ZERO,
            span,
        }
    }

    pub fn id(&self) -> SearchId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn clusters(&self) -> &[DetectionCluster] {
        &self.clusters
    }

    /// Total time spent searching batches.
    pub fn cumulative_walltime(&self) -> Duration {
        self.walltime
    }

    /// Search every series of `batch` in parallel and append the new
    /// detections. Nothing is deduplicated here.
    pub fn process_batch(
        &mut self,
        pool: &WorkerPool,
        capability: &Arc<dyn PeriodicitySearch>,
        batch: &[TimeSeries],
    ) -> Result<()> {
        let _guard = self.span.enter();
        let start = Instant::now();
        info!(
            batch = batch.len(),
            workers = pool.num_threads(),
            "Searching batch of time series"
        );

        let worker = SearchWorker::new(Arc::clone(capability), self.config.clone());
        let new_detections = pool.map(&worker, batch)?;
        info!(new = new_detections.len(), "Search complete");
        self.detections.extend(new_detections);
        info!(total = self.detections.len(), "Total detections stored");

        self.walltime += start.elapsed();
        info!(
            seconds = self.walltime.as_secs_f64(),
            "Total processing time"
        );
        Ok(())
    }

    /// Cluster accumulated detections by beat index `median(tobs) / period`.
    pub fn cluster_detections(&mut self) {
        let _guard = self.span.enter();
        info!("Clustering detections");
        let tobs_values: Vec<f64> = self.detections.iter().map(|d| d.metadata.tobs).collect();
        let Some(tobs) = median(&tobs_values) else {
            info!("No detections in store, nothing to be done");
            return;
        };

        let beat: Vec<f64> = self.detections.iter().map(|d| d.beat_index(tobs)).collect();
        let groups = cluster_1d(&beat, self.config.detect.peak_clustering_radius);
        self.clusters = groups
            .into_iter()
            .filter_map(|indices| {
                DetectionCluster::new(indices.into_iter().map(|i| self.detections[i].clone()).collect())
            })
            .collect();
        info!(clusters = self.clusters.len(), "Clustering complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_search_config;
    use ffa_core::DetectionMetadata;
    use std::path::PathBuf;

    fn det(beat: f64, snr: f64) -> Detection {
        let tobs = 100.0;
        Detection {
            period: tobs / beat,
            dm: 1.0,
            width: 1,
            ducy: 0.05,
            snr,
            metadata: DetectionMetadata {
                tobs,
                fname: PathBuf::from("x.inf"),
                dm: 1.0,
            },
        }
    }

    #[test]
    fn test_empty_store_makes_no_clusters() {
        let mut search = PulsarSearch::new(SearchId(0), test_search_config("short"));
        search.cluster_detections();
        assert!(search.clusters().is_empty());
    }

    #[test]
    fn test_clusters_by_beat_index() {
        let mut cfg = test_search_config("short");
        cfg.detect.peak_clustering_radius = 0.05;
        let mut search = PulsarSearch::new(SearchId(0), cfg);
        search.detections = vec![det(10.01, 5.0), det(10.02, 9.0), det(50.0, 3.0)];
        search.cluster_detections();

        let tops: Vec<f64> = search.clusters().iter().map(|c| c.top_detection().snr).collect();
        assert_eq!(tops, vec![9.0, 3.0]);
        assert_eq!(search.clusters()[0].len(), 2);
        let total: usize = search.clusters().iter().map(|c| c.len()).sum();
        assert_eq!(total, search.detections().len());
    }
}
