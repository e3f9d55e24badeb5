//! Search and manager parameters.
//!
//! These are plain serde types; loading them from YAML files and environment
//! overrides is done by the application crate. Each type carries a
//! `validate()` that rejects values the pipeline cannot run with.

use ffa_core::{DataFormat, FfaError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Parameters of the periodicity search over one period range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Shortest trial period in seconds.
    pub period_min: f64,
    /// Longest trial period in seconds.
    pub period_max: f64,
    /// Minimum number of phase bins per trial.
    pub bins_min: usize,
    /// Maximum number of phase bins per trial.
    pub bins_max: usize,
    /// Width of the running-median detrending window, in seconds.
    #[serde(default = "default_rmed_width")]
    pub rmed_width: f64,
    /// Minimum number of points per running-median window.
    #[serde(default = "default_rmed_minpts")]
    pub rmed_minpts: usize,
    /// Largest duty cycle tried by the boxcar filters.
    #[serde(default = "default_ducy_max")]
    pub ducy_max: f64,
    /// Geometric spacing of successive boxcar widths.
    #[serde(default = "default_wtsp")]
    pub wtsp: f64,
}

/// Peak-finding parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectParams {
    pub snr_min: f64,
    /// Clustering radius in beat-index units.
    #[serde(default = "default_peak_clustering_radius")]
    pub peak_clustering_radius: f64,
}

/// Shape of the folded data product of each candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateShape {
    #[serde(default = "default_cand_nbins")]
    pub nbins: usize,
    #[serde(default = "default_cand_nsubs")]
    pub nsubs: usize,
}

impl Default for CandidateShape {
    fn default() -> Self {
        Self {
            nbins: default_cand_nbins(),
            nsubs: default_cand_nsubs(),
        }
    }
}

/// One search range: a name, how to search, how to detect, how to fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub name: String,
    pub search: SearchParams,
    pub detect: DetectParams,
    #[serde(default)]
    pub candidates: CandidateShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmonicFilterConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_max_denominator")]
    pub max_denominator: u64,
    #[serde(default = "default_snr_tol")]
    pub snr_tol: f64,
    /// Frequency tolerance in Fourier bins (units of `1 / tobs`).
    #[serde(default = "default_max_distance")]
    pub max_distance: f64,
}

impl Default for HarmonicFilterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_denominator: default_max_denominator(),
            snr_tol: default_snr_tol(),
            max_distance: default_max_distance(),
        }
    }
}

/// Thresholds applied to the final clusters. An absent or zero value disables
/// the corresponding filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateFilterConfig {
    #[serde(default)]
    pub dm_min: Option<f64>,
    #[serde(default)]
    pub snr_min: Option<f64>,
    #[serde(default)]
    pub max_number: Option<usize>,
}

/// Configuration of one search-pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub data_format: DataFormat,
    /// Pattern selecting the input time-series files.
    #[serde(default)]
    pub glob: String,
    /// Output directory for tables and candidate artifacts.
    #[serde(default)]
    pub outdir: PathBuf,
    #[serde(default)]
    pub dm_min: Option<f64>,
    #[serde(default)]
    pub dm_max: Option<f64>,
    #[serde(default)]
    pub dm_step: f64,
    /// Maximum value of `DM x sin|b|`.
    #[serde(default)]
    pub dmsinb_max: Option<f64>,
    #[serde(default = "default_fmin")]
    pub fmin: f64,
    #[serde(default = "default_fmax")]
    pub fmax: f64,
    #[serde(default = "default_num_processes")]
    pub num_processes: usize,
    #[serde(default)]
    pub harmonic_filtering: HarmonicFilterConfig,
    #[serde(default)]
    pub candidate_filters: CandidateFilterConfig,
    /// Search configuration files, relative to the manager configuration file.
    #[serde(default)]
    pub search_configs: Vec<PathBuf>,
}

// Default value functions
fn default_rmed_width() -> f64 {
    4.0
}

fn default_rmed_minpts() -> usize {
    101
}

fn default_ducy_max() -> f64 {
    0.2
}

fn default_wtsp() -> f64 {
    1.5
}

fn default_peak_clustering_radius() -> f64 {
    0.2
}

fn default_cand_nbins() -> usize {
    128
}

fn default_cand_nsubs() -> usize {
    64
}

fn default_enabled() -> bool {
    true
}

fn default_max_denominator() -> u64 {
    100
}

fn default_snr_tol() -> f64 {
    2.0
}

fn default_max_distance() -> f64 {
    3.0
}

fn default_fmin() -> f64 {
    0.1
}

fn default_fmax() -> f64 {
    100.0
}

fn default_num_processes() -> usize {
    1
}

fn invalid(msg: String) -> FfaError {
    FfaError::Configuration(msg)
}

fn positive(key: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{key} must be positive, got {value}")))
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("search name must not be empty".into()));
        }
        let s = &self.search;
        positive("search.period_min", s.period_min)?;
        positive("search.period_max", s.period_max)?;
        if s.period_min >= s.period_max {
            return Err(invalid(format!(
                "search.period_min ({}) must be smaller than search.period_max ({})",
                s.period_min, s.period_max
            )));
        }
        if s.bins_min == 0 || s.bins_min > s.bins_max {
            return Err(invalid(format!(
                "search.bins_min ({}) must be in [1, bins_max = {}]",
                s.bins_min, s.bins_max
            )));
        }
        positive("search.rmed_width", s.rmed_width)?;
        if s.rmed_minpts == 0 {
            return Err(invalid("search.rmed_minpts must be at least 1".into()));
        }
        if !(s.ducy_max > 0.0 && s.ducy_max < 1.0) {
            return Err(invalid(format!(
                "search.ducy_max must be in (0, 1), got {}",
                s.ducy_max
            )));
        }
        if !(s.wtsp.is_finite() && s.wtsp > 1.0) {
            return Err(invalid(format!("search.wtsp must be > 1, got {}", s.wtsp)));
        }
        positive("detect.snr_min", self.detect.snr_min)?;
        positive(
            "detect.peak_clustering_radius",
            self.detect.peak_clustering_radius,
        )?;
        if self.candidates.nbins == 0 || self.candidates.nsubs == 0 {
            return Err(invalid(
                "candidates.nbins and candidates.nsubs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_processes == 0 {
            return Err(invalid("num_processes must be at least 1".into()));
        }
        if !(self.dm_step.is_finite() && self.dm_step >= 0.0) {
            return Err(invalid(format!(
                "dm_step must be non-negative, got {}",
                self.dm_step
            )));
        }
        if let (Some(lo), Some(hi)) = (self.dm_min, self.dm_max) {
            if lo > hi {
                return Err(invalid(format!("dm_min ({lo}) exceeds dm_max ({hi})")));
            }
        }
        if let Some(v) = self.dmsinb_max {
            positive("dmsinb_max", v)?;
        }
        positive("fmin", self.fmin)?;
        positive("fmax", self.fmax)?;
        if self.fmin >= self.fmax {
            return Err(invalid(format!(
                "fmin ({}) must be smaller than fmax ({})",
                self.fmin, self.fmax
            )));
        }
        let h = &self.harmonic_filtering;
        if h.max_denominator == 0 {
            return Err(invalid(
                "harmonic_filtering.max_denominator must be at least 1".into(),
            ));
        }
        if !(h.snr_tol.is_finite() && h.max_distance.is_finite() && h.max_distance >= 0.0) {
            return Err(invalid(
                "harmonic_filtering.snr_tol and max_distance must be finite".into(),
            ));
        }
        if self.search_configs.is_empty() {
            return Err(invalid("search_configs must list at least one file".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_search_config(name: &str) -> SearchConfig {
    SearchConfig {
        name: name.to_string(),
        search: SearchParams {
            period_min: 0.5,
            period_max: 2.0,
            bins_min: 32,
            bins_max: 40,
            rmed_width: 4.0,
            rmed_minpts: 101,
            ducy_max: 0.2,
            wtsp: 1.5,
        },
        detect: DetectParams {
            snr_min: 6.0,
            peak_clustering_radius: 0.2,
        },
        candidates: CandidateShape { nbins: 32, nsubs: 8 },
    }
}

#[cfg(test)]
pub(crate) fn test_manager_config() -> ManagerConfig {
    ManagerConfig {
        data_format: DataFormat::Presto,
        glob: String::new(),
        outdir: PathBuf::new(),
        dm_min: None,
        dm_max: None,
        dm_step: 0.0,
        dmsinb_max: None,
        fmin: 0.1,
        fmax: 100.0,
        num_processes: 2,
        harmonic_filtering: HarmonicFilterConfig::default(),
        candidate_filters: CandidateFilterConfig::default(),
        search_configs: vec![PathBuf::from("search.yml")],
    }
}
