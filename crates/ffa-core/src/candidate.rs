//! Finalised candidates: a cluster's best parameters plus a folded data product.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::cluster::DetectionCluster;
use crate::error::Result;
use crate::timeseries::TimeSeries;

/// Best-fit parameters of a candidate, taken verbatim from the top detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateParams {
    pub best_period: f64,
    pub best_dm: f64,
    pub best_width: u32,
    pub best_ducy: f64,
    pub best_snr: f64,
}

/// One point of the S/N versus DM curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DmCurvePoint {
    pub dm: f64,
    pub snr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub params: CandidateParams,
    pub search_name: String,
    pub fname: PathBuf,
    pub tobs: f64,
    pub num_detections: usize,
    pub nbins: usize,
    pub nsubs: usize,
    /// `nsubs` rows of `nbins` folded phase bins.
    pub subints: Vec<Vec<f32>>,
    /// Sum of all sub-integrations.
    pub profile: Vec<f32>,
    /// Best S/N per DM trial among the cluster members, ascending DM.
    pub dm_curve: Vec<DmCurvePoint>,
}

impl Candidate {
    /// Fold `tseries` at the period of the cluster's top detection.
    ///
    /// `tseries` must be the top detection's source series, preprocessed the
    /// same way as at search time.
    pub fn from_cluster(
        cluster: &DetectionCluster,
        search_name: &str,
        tseries: &TimeSeries,
        nbins: usize,
        nsubs: usize,
    ) -> Result<Self> {
        let top = cluster.top_detection();
        let subints = tseries.fold_subints(top.period, nbins, nsubs)?;
        let mut profile = vec![0.0f32; nbins];
        for row in &subints {
            for (acc, v) in profile.iter_mut().zip(row) {
                *acc += v;
            }
        }

        Ok(Self {
            params: CandidateParams {
                best_period: top.period,
                best_dm: top.dm,
                best_width: top.width,
                best_ducy: top.ducy,
                best_snr: top.snr,
            },
            search_name: search_name.to_string(),
            fname: top.metadata.fname.clone(),
            tobs: tseries.tobs(),
            num_detections: cluster.len(),
            nbins,
            nsubs,
            subints,
            profile,
            dm_curve: dm_curve(cluster),
        })
    }
}

fn dm_curve(cluster: &DetectionCluster) -> Vec<DmCurvePoint> {
    let mut points: Vec<DmCurvePoint> = cluster
        .detections()
        .iter()
        .map(|d| DmCurvePoint { dm: d.dm, snr: d.snr })
        .collect();
    points.sort_by(|a, b| {
        a.dm.total_cmp(&b.dm).then(b.snr.total_cmp(&a.snr))
    });
    points.dedup_by(|later, kept| later.dm == kept.dm);
    points
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Candidate(P0 = {:.9e}, DM = {:8.3}, width = {:3}, ducy = {:.4}, S/N = {:6.2})",
            self.params.best_period,
            self.params.best_dm,
            self.params.best_width,
            self.params.best_ducy,
            self.params.best_snr
        )
    }
}
