//! Dedispersed time series and the preprocessing applied before folding.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::coords::SkyCoord;
use crate::error::{FfaError, Result};
use crate::stats::fast_running_median;

/// Observation metadata attached to a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesMetadata {
    pub fname: PathBuf,
    /// DM trial of this series, pc cm^-3.
    pub dm: f64,
    pub skycoord: Option<SkyCoord>,
    /// Observation length in seconds.
    pub tobs: f64,
}

/// A uniformly sampled, dedispersed time series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    data: Vec<f32>,
    tsamp: f64,
    metadata: TimeSeriesMetadata,
}

/// Phase-binned sums of a folded series.
#[derive(Debug, Clone, PartialEq)]
pub struct Folded {
    pub sums: Vec<f64>,
    pub counts: Vec<u64>,
}

impl TimeSeries {
    /// Build a series; `tobs` is derived from the sample count.
    pub fn new(
        data: Vec<f32>,
        tsamp: f64,
        fname: impl Into<PathBuf>,
        dm: f64,
        skycoord: Option<SkyCoord>,
    ) -> Result<Self> {
        let fname = fname.into();
        if !(tsamp.is_finite() && tsamp > 0.0) {
            return Err(FfaError::InvalidTimeSeries(format!(
                "sampling time must be positive, got {tsamp} in '{}'",
                fname.display()
            )));
        }
        if data.is_empty() {
            return Err(FfaError::InvalidTimeSeries(format!(
                "no samples in '{}'",
                fname.display()
            )));
        }
        let tobs = data.len() as f64 * tsamp;
        Ok(Self {
            data,
            tsamp,
            metadata: TimeSeriesMetadata {
                fname,
                dm,
                skycoord,
                tobs,
            },
        })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn tsamp(&self) -> f64 {
        self.tsamp
    }

    pub fn nsamp(&self) -> usize {
        self.data.len()
    }

    pub fn tobs(&self) -> f64 {
        self.metadata.tobs
    }

    pub fn dm(&self) -> f64 {
        self.metadata.dm
    }

    pub fn metadata(&self) -> &TimeSeriesMetadata {
        &self.metadata
    }

    /// Subtract a running median of `width` seconds.
    ///
    /// `min_points` bounds the cost: windows longer than that many samples are
    /// evaluated on a downsampled copy.
    pub fn deredden(&mut self, width: f64, min_points: usize) -> Result<()> {
        if !(width.is_finite() && width > 0.0) {
            return Err(FfaError::Configuration(format!(
                "rmed_width must be positive, got {width}"
            )));
        }
        let width_samples = ((width / self.tsamp).round() as usize).max(1);
        let values: Vec<f64> = self.data.iter().map(|&v| f64::from(v)).collect();
        let trend = fast_running_median(&values, width_samples, min_points);
        for (sample, baseline) in self.data.iter_mut().zip(trend) {
            *sample = (f64::from(*sample) - baseline) as f32;
        }
        Ok(())
    }

    /// Scale to zero mean and unit variance. A constant series becomes zeros.
    pub fn normalise(&mut self) {
        let n = self.data.len() as f64;
        let mean = self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = self
            .data
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        let std = var.sqrt();
        let scale = if std > 0.0 && std.is_finite() { 1.0 / std } else { 0.0 };
        for v in &mut self.data {
            *v = ((f64::from(*v) - mean) * scale) as f32;
        }
    }

    /// Fold `data[range]` at `period` into `nbins` phase bins.
    fn fold_range(&self, period: f64, nbins: usize, range: std::ops::Range<usize>) -> Folded {
        let mut sums = vec![0.0; nbins];
        let mut counts = vec![0u64; nbins];
        let bins_per_sample = self.tsamp / period * nbins as f64;
        for i in range {
            let phase_bins = (i as f64 * bins_per_sample) % nbins as f64;
            let bin = (phase_bins as usize).min(nbins - 1);
            sums[bin] += f64::from(self.data[i]);
            counts[bin] += 1;
        }
        Folded { sums, counts }
    }

    fn check_fold_args(&self, period: f64, nbins: usize) -> Result<()> {
        if !(period.is_finite() && period > 0.0) {
            return Err(FfaError::Processing(format!(
                "cannot fold at period {period}"
            )));
        }
        if nbins == 0 {
            return Err(FfaError::Processing("cannot fold into 0 bins".into()));
        }
        Ok(())
    }

    /// Fold the whole series at `period`.
    pub fn fold(&self, period: f64, nbins: usize) -> Result<Folded> {
        self.check_fold_args(period, nbins)?;
        Ok(self.fold_range(period, nbins, 0..self.data.len()))
    }

    /// Fold into `nsubs` consecutive sub-integrations of `nbins` bins each.
    ///
    /// Returns per-bin means; bins that received no sample are zero.
    pub fn fold_subints(&self, period: f64, nbins: usize, nsubs: usize) -> Result<Vec<Vec<f32>>> {
        self.check_fold_args(period, nbins)?;
        if nsubs == 0 || nsubs > self.data.len() {
            return Err(FfaError::Processing(format!(
                "cannot split {} samples into {nsubs} sub-integrations",
                self.data.len()
            )));
        }
        let n = self.data.len();
        Ok((0..nsubs)
            .map(|k| {
                let range = (k * n / nsubs)..((k + 1) * n / nsubs);
                let folded = self.fold_range(period, nbins, range);
                folded
                    .sums
                    .iter()
                    .zip(&folded.counts)
                    .map(|(&s, &c)| if c > 0 { (s / c as f64) as f32 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(data: Vec<f32>, tsamp: f64) -> TimeSeries {
        TimeSeries::new(data, tsamp, "test.inf", 0.0, None).unwrap()
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(TimeSeries::new(vec![], 1e-3, "x", 0.0, None).is_err());
        assert!(TimeSeries::new(vec![1.0], 0.0, "x", 0.0, None).is_err());
        assert!(TimeSeries::new(vec![1.0], f64::NAN, "x", 0.0, None).is_err());
    }

    #[test]
    fn test_tobs() {
        let ts = series(vec![0.0; 1000], 0.01);
        assert!((ts.tobs() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalise() {
        let mut ts = series((0..100).map(|i| i as f32).collect(), 1e-3);
        ts.normalise();
        let n = ts.nsamp() as f64;
        let mean: f64 = ts.data().iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var: f64 = ts.data().iter().map(|&v| f64::from(v).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 1e-5);
        assert!((var - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalise_constant_series() {
        let mut ts = series(vec![3.0; 16], 1e-3);
        ts.normalise();
        assert!(ts.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_deredden_removes_baseline() {
        let mut ts = series((0..2000).map(|i| 5.0 + i as f32 * 0.001).collect(), 0.01);
        ts.deredden(1.0, 21).unwrap();
        for &v in &ts.data()[200..1800] {
            assert!(v.abs() < 0.05);
        }
    }

    #[test]
    fn test_preprocessing_is_deterministic() {
        let data: Vec<f32> = (0..4096).map(|i| ((i * 7919) % 101) as f32).collect();
        let mut a = series(data.clone(), 1e-3);
        let mut b = series(data, 1e-3);
        for ts in [&mut a, &mut b] {
            ts.deredden(0.5, 101).unwrap();
            ts.normalise();
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_fold_pulse_lands_in_one_bin() {
        // 10 samples per period, pulse on the first sample of each period.
        let data: Vec<f32> = (0..1000).map(|i| if i % 10 == 0 { 1.0 } else { 0.0 }).collect();
        let ts = series(data, 0.1);
        let folded = ts.fold(1.0, 10).unwrap();
        assert_eq!(folded.counts.iter().sum::<u64>(), 1000);
        assert_eq!(folded.sums[0], 100.0);
        assert!(folded.sums[1..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_fold_subints_shape() {
        let ts = series(vec![1.0; 1000], 0.1);
        let subints = ts.fold_subints(1.0, 10, 4).unwrap();
        assert_eq!(subints.len(), 4);
        assert!(subints.iter().all(|s| s.len() == 10));
        assert!(ts.fold_subints(1.0, 10, 0).is_err());
        assert!(ts.fold(0.0, 10).is_err());
    }
}
