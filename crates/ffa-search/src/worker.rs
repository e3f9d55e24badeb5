//! Search worker pool.
//!
//! A [`SearchWorker`] owns everything needed to search one time series (the
//! search capability and a copy of the search configuration) so it can be
//! shared by all threads of the [`WorkerPool`].

use ffa_core::{Detection, FfaError, Result, TimeSeries};
use rayon::prelude::*;
use std::sync::Arc;

use crate::params::SearchConfig;
use crate::periodogram::PeriodicitySearch;

/// Task that searches one time series with a fixed configuration.
#[derive(Clone)]
pub struct SearchWorker {
    search: Arc<dyn PeriodicitySearch>,
    config: SearchConfig,
}

impl SearchWorker {
    pub fn new(search: Arc<dyn PeriodicitySearch>, config: SearchConfig) -> Self {
        Self { search, config }
    }

    pub fn run(&self, tseries: &TimeSeries) -> Result<Vec<Detection>> {
        let (_, pgram) = self
            .search
            .search(tseries, &self.config.search)
            .map_err(|e| FfaError::Search {
                fname: tseries.metadata().fname.clone(),
                reason: e.to_string(),
            })?;
        Ok(self
            .search
            .detect(&pgram, &self.config.detect, tseries.metadata()))
    }
}

/// Fixed-size thread pool running search tasks over whole batches.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("ffa-search-{i}"))
            .build()
            .map_err(|e| FfaError::Configuration(format!("cannot start worker pool: {e}")))?;
        Ok(Self { pool, num_threads })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run `worker` on every series of `batch` and concatenate the detections
    /// in batch order.
    ///
    /// Blocks until every task has finished. The first failure fails the
    /// whole batch.
    pub fn map(&self, worker: &SearchWorker, batch: &[TimeSeries]) -> Result<Vec<Detection>> {
        let output: Vec<Vec<Detection>> = self
            .pool
            .install(|| batch.par_iter().map(|ts| worker.run(ts)).collect::<Result<_>>())?;
        Ok(output.into_iter().flatten().collect())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{test_search_config, DetectParams, SearchParams};
    use crate::periodogram::Periodogram;
    use ffa_core::{DetectionMetadata, TimeSeriesMetadata};

    /// Reports one detection per series at a period derived from its DM.
    struct EchoSearch;

    impl PeriodicitySearch for EchoSearch {
        fn search(&self, ts: &TimeSeries, _: &SearchParams) -> Result<(TimeSeries, Periodogram)> {
            if ts.dm() < 0.0 {
                return Err(FfaError::Processing("negative DM".into()));
            }
            Ok((ts.clone(), Periodogram::default()))
        }

        fn detect(&self, _: &Periodogram, _: &DetectParams, md: &TimeSeriesMetadata) -> Vec<Detection> {
            vec![Detection {
                period: 1.0 + md.dm,
                dm: md.dm,
                width: 1,
                ducy: 0.1,
                snr: 10.0,
                metadata: DetectionMetadata {
                    tobs: md.tobs,
                    fname: md.fname.clone(),
                    dm: md.dm,
                },
            }]
        }
    }

    fn series(dm: f64) -> TimeSeries {
        TimeSeries::new(vec![0.0; 16], 1e-3, format!("DM{dm}.inf"), dm, None).unwrap()
    }

    #[test]
    fn test_results_keep_batch_order() {
        let pool = WorkerPool::new(3).unwrap();
        let worker = SearchWorker::new(Arc::new(EchoSearch), test_search_config("echo"));
        let batch: Vec<TimeSeries> = (0..7).map(|i| series(i as f64)).collect();
        let dets = pool.map(&worker, &batch).unwrap();
        let dms: Vec<f64> = dets.iter().map(|d| d.dm).collect();
        assert_eq!(dms, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_one_failure_fails_the_batch() {
        let pool = WorkerPool::new(2).unwrap();
        let worker = SearchWorker::new(Arc::new(EchoSearch), test_search_config("echo"));
        let batch = vec![series(1.0), series(-1.0), series(2.0)];
        let err = pool.map(&worker, &batch).unwrap_err();
        assert!(matches!(err, FfaError::Search { .. }));
    }
}
