//! Pipeline manager: the outermost DM-trial loop of a search run.
//!
//! # Run sequence
//!
//! ```text
//! select DM trials -> for each batch: every search processes the batch
//!                  -> every search clusters its detections
//!                  -> fetch detections + clusters (attributed to searches)
//!                  -> save detections.csv, clusters.csv
//!                  -> harmonic filtering (optional)
//!                  -> candidate filters
//!                  -> build candidates -> save artifacts + summary.csv
//! ```
//!
//! Batches are processed strictly one after the other, and clustering only
//! starts once every batch has been searched.

use ffa_core::stats::median;
use ffa_core::{Attributed, Candidate, Detection, DetectionCluster, SearchId};
use ffa_storage::{artifacts, tables};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Span};

use crate::builder::build_candidates;
use crate::dm_select::{select_dm_trials, Batches, DmRange};
use crate::error::PipelineResult;
use crate::filters::apply_candidate_filters;
use crate::harmonics::{flag_harmonics, HarmonicClassifier, HarmonicParams, RationalHarmonicClassifier};
use crate::params::{ManagerConfig, SearchConfig};
use crate::periodogram::{FoldingSearch, PeriodicitySearch};
use crate::search::PulsarSearch;
use crate::worker::WorkerPool;

/// Counts and products of one completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub num_dm_trials: usize,
    pub num_detections: usize,
    pub num_clusters: usize,
    pub num_harmonics: usize,
    /// Candidate artifact paths, in decreasing S/N order.
    pub candidate_paths: Vec<PathBuf>,
}

pub struct PipelineManager {
    config: ManagerConfig,
    searches: Vec<PulsarSearch>,
    capability: Arc<dyn PeriodicitySearch>,
    classifier: Box<dyn HarmonicClassifier>,
    span: Span,
}

impl PipelineManager {
    /// Configure one [`PulsarSearch`] per search configuration, in order.
    pub fn new(config: ManagerConfig, search_configs: Vec<SearchConfig>) -> PipelineResult<Self> {
        config.validate()?;
        let span = info_span!("manager");
        let searches = {
            let _guard = span.enter();
            info!(data_format = %config.data_format, "Specified file format");
            let mut searches = Vec::with_capacity(search_configs.len());
            for (index, search_config) in search_configs.into_iter().enumerate() {
                search_config.validate()?;
                info!(name = %search_config.name, "Configured PulsarSearch");
                searches.push(PulsarSearch::new(SearchId(index), search_config));
            }
            info!(count = searches.len(), "Configured searches");
            searches
        };
        Ok(Self {
            config,
            searches,
            capability: Arc::new(FoldingSearch),
            classifier: Box::new(RationalHarmonicClassifier),
            span,
        })
    }

    pub fn with_capability(mut self, capability: Arc<dyn PeriodicitySearch>) -> Self {
        self.capability = capability;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn HarmonicClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn searches(&self) -> &[PulsarSearch] {
        &self.searches
    }

    /// Run the whole pipeline. A manager runs once.
    pub fn run(mut self) -> PipelineResult<RunSummary> {
        let span = self.span.clone();
        let _guard = span.enter();
        let run_start = Instant::now();
        info!("Starting pipeline");

        info!("Selecting DM trials");
        let range = DmRange {
            dm_min: self.config.dm_min,
            dm_max: self.config.dm_max,
            dm_step: self.config.dm_step,
            dmsinb_max: self.config.dmsinb_max,
        };
        let selection = select_dm_trials(self.config.data_format, &self.config.glob, &range)?;
        let mut summary = RunSummary {
            num_dm_trials: selection.paths.len(),
            ..Default::default()
        };

        let stage = Instant::now();
        let pool = WorkerPool::new(self.config.num_processes)?;
        info!(count = selection.paths.len(), "Preparing to iterate through DM trials");
        for batch in Batches::new(selection.paths, self.config.num_processes, self.config.data_format) {
            let batch = batch?;
            let mut dms: Vec<f64> = batch.iter().map(|ts| ts.dm()).collect();
            dms.sort_by(f64::total_cmp);
            info!(?dms, "Processing DM trials");
            for search in &mut self.searches {
                search.process_batch(&pool, &self.capability, &batch)?;
            }
        }
        info!(
            elapsed_s = stage.elapsed().as_secs_f64(),
            "All DM trials have been processed, clustering detections"
        );

        for search in &mut self.searches {
            search.cluster_detections();
        }

        let detections = self.fetch_detections();
        let clusters = self.fetch_clusters();
        summary.num_detections = detections.len();
        summary.num_clusters = clusters.len();

        fs::create_dir_all(&self.config.outdir)?;
        self.save_detections(&detections)?;
        self.save_clusters(&clusters)?;

        let before = clusters.len();
        let clusters = self.remove_harmonics(&detections, clusters);
        summary.num_harmonics = before - clusters.len();

        let clusters = apply_candidate_filters(clusters, &self.config.candidate_filters);

        let stage = Instant::now();
        let configs: Vec<SearchConfig> = self.searches.iter().map(|s| s.config().clone()).collect();
        let candidates = build_candidates(self.config.data_format, &clusters, &configs);
        info!(elapsed_s = stage.elapsed().as_secs_f64(), "Candidate building finished");

        summary.candidate_paths = self.save_candidates(&candidates)?;
        info!(
            elapsed_s = run_start.elapsed().as_secs_f64(),
            candidates = summary.candidate_paths.len(),
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// All detections of all searches, each tagged with its search.
    fn fetch_detections(&self) -> Vec<Attributed<Detection>> {
        let detections: Vec<Attributed<Detection>> = self
            .searches
            .iter()
            .flat_map(|s| s.detections().iter().map(|d| Attributed::new(d.clone(), s.id())))
            .collect();
        info!(count = detections.len(), "Fetched detections");
        detections
    }

    /// All clusters of all searches, each tagged with its search.
    fn fetch_clusters(&self) -> Vec<Attributed<DetectionCluster>> {
        let clusters: Vec<Attributed<DetectionCluster>> = self
            .searches
            .iter()
            .flat_map(|s| s.clusters().iter().map(|c| Attributed::new(c.clone(), s.id())))
            .collect();
        info!(count = clusters.len(), "Fetched detection clusters");
        clusters
    }

    fn search_name(&self, id: SearchId) -> &str {
        self.searches.get(id.0).map_or("", |s| s.name())
    }

    fn save_detections(&self, detections: &[Attributed<Detection>]) -> PipelineResult<()> {
        let rows: Vec<(&str, &Detection)> = detections
            .iter()
            .map(|d| (self.search_name(d.search()), d.payload()))
            .collect();
        tables::save_detections(&self.config.outdir, &rows)?;
        Ok(())
    }

    fn save_clusters(&self, clusters: &[Attributed<DetectionCluster>]) -> PipelineResult<()> {
        let rows: Vec<(&str, &Detection)> = clusters
            .iter()
            .map(|c| (self.search_name(c.search()), c.payload().top_detection()))
            .collect();
        tables::save_clusters(&self.config.outdir, &rows)?;
        Ok(())
    }

    fn remove_harmonics(
        &self,
        detections: &[Attributed<Detection>],
        clusters: Vec<Attributed<DetectionCluster>>,
    ) -> Vec<Attributed<DetectionCluster>> {
        let hf = &self.config.harmonic_filtering;
        if !hf.enabled {
            info!("Harmonic filtering is disabled");
            return clusters;
        }
        let tobs_values: Vec<f64> = detections.iter().map(|d| d.payload().metadata.tobs).collect();
        let Some(tobs) = median(&tobs_values) else {
            return clusters;
        };

        info!("Removing harmonics");
        let params = HarmonicParams {
            fmin: self.config.fmin,
            fmax: self.config.fmax,
            tobs,
            max_denominator: hf.max_denominator,
            max_distance: hf.max_distance,
            snr_tol: hf.snr_tol,
        };
        let fundamentals = flag_harmonics(clusters, self.classifier.as_ref(), &params).into_fundamentals();
        info!(count = fundamentals.len(), "Retained final candidates");
        fundamentals
    }

    fn save_candidates(&self, candidates: &[Candidate]) -> PipelineResult<Vec<PathBuf>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let outdir = &self.config.outdir;
        info!(
            count = candidates.len(),
            outdir = %outdir.display(),
            "Saving candidates to output directory"
        );
        let paths = artifacts::save_candidates(outdir, candidates)?;
        let rows: Vec<(String, _)> = paths
            .iter()
            .zip(candidates)
            .map(|(path, cand)| {
                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (basename, cand.params)
            })
            .collect();
        tables::save_summary(outdir, &rows)?;
        Ok(paths)
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("config", &self.config)
            .field("searches", &self.searches.len())
            .finish()
    }
}
