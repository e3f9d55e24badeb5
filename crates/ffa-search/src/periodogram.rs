//! Periodicity-search capability.
//!
//! [`PeriodicitySearch`] is the seam between the pipeline and the transform
//! that turns a time series into a periodogram. [`FoldingSearch`] is a
//! brute-force folding implementation of it: every trial period is folded
//! directly and scored with boxcar matched filters of increasing width.

use ffa_core::{Detection, DetectionMetadata, Result, TimeSeries, TimeSeriesMetadata};

use crate::clustering::cluster_1d;
use crate::params::{DetectParams, SearchParams};

/// S/N of one trial period at each boxcar width.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTrial {
    pub period: f64,
    pub nbins: usize,
    pub widths: Vec<u32>,
    pub snrs: Vec<f64>,
}

impl PeriodTrial {
    /// Index of the best width; the narrowest wins ties.
    fn best(&self) -> Option<(usize, f64)> {
        self.snrs
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, snr)| match best {
                Some((_, s)) if s >= snr => best,
                _ => Some((i, snr)),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Periodogram {
    pub tobs: f64,
    pub trials: Vec<PeriodTrial>,
}

/// Transform a time series into detections.
pub trait PeriodicitySearch: Send + Sync {
    /// Preprocess `tseries` and compute its periodogram.
    fn search(&self, tseries: &TimeSeries, params: &SearchParams)
        -> Result<(TimeSeries, Periodogram)>;

    /// Extract significant peaks from a periodogram.
    fn detect(
        &self,
        pgram: &Periodogram,
        params: &DetectParams,
        metadata: &TimeSeriesMetadata,
    ) -> Vec<Detection>;
}

/// Reference periodicity search by direct folding.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldingSearch;

/// Boxcar widths 1, then geometrically spaced by `wtsp`, up to
/// `ducy_max * nbins`.
pub fn boxcar_widths(nbins: usize, ducy_max: f64, wtsp: f64) -> Vec<u32> {
    let wmax = ((ducy_max * nbins as f64).floor() as u32).max(1);
    let mut widths = vec![1u32];
    loop {
        let last = widths[widths.len() - 1];
        let next = ((f64::from(last) * wtsp).ceil() as u32).max(last + 1);
        if next > wmax {
            break;
        }
        widths.push(next);
    }
    widths
}

/// Phase bins used to fold at `period`.
pub fn trial_bins(period: f64, tsamp: f64, params: &SearchParams) -> usize {
    ((period / tsamp).floor() as usize).clamp(params.bins_min, params.bins_max)
}

/// Best S/N of a circular boxcar of each width over a folded profile.
///
/// With unit-variance white noise per sample, a window holding `n` samples
/// with sum `s` has S/N `s / sqrt(n)`.
fn boxcar_snrs(sums: &[f64], counts: &[u64], widths: &[u32]) -> Vec<f64> {
    let nbins = sums.len();
    widths
        .iter()
        .map(|&w| {
            let w = (w as usize).min(nbins);
            let mut s: f64 = sums[..w].iter().sum();
            let mut n: u64 = counts[..w].iter().sum();
            let mut best = f64::NEG_INFINITY;
            for start in 0..nbins {
                if n > 0 {
                    best = best.max(s / (n as f64).sqrt());
                }
                let out = start;
                let inc = (start + w) % nbins;
                s += sums[inc] - sums[out];
                n = n + counts[inc] - counts[out];
            }
            if best.is_finite() {
                best
            } else {
                0.0
            }
        })
        .collect()
}

impl PeriodicitySearch for FoldingSearch {
    fn search(
        &self,
        tseries: &TimeSeries,
        params: &SearchParams,
    ) -> Result<(TimeSeries, Periodogram)> {
        let mut ts = tseries.clone();
        ts.deredden(params.rmed_width, params.rmed_minpts)?;
        ts.normalise();

        let tobs = ts.tobs();
        let tsamp = ts.tsamp();
        let mut trials = Vec::new();
        let mut period = params.period_min;
        while period <= params.period_max {
            let nbins = trial_bins(period, tsamp, params);
            let folded = ts.fold(period, nbins)?;
            let widths = boxcar_widths(nbins, params.ducy_max, params.wtsp);
            let snrs = boxcar_snrs(&folded.sums, &folded.counts, &widths);
            trials.push(PeriodTrial {
                period,
                nbins,
                widths,
                snrs,
            });
            // One phase bin of drift across the whole observation.
            period += period * period / (tobs * nbins as f64);
        }
        Ok((ts, Periodogram { tobs, trials }))
    }

    fn detect(
        &self,
        pgram: &Periodogram,
        params: &DetectParams,
        metadata: &TimeSeriesMetadata,
    ) -> Vec<Detection> {
        let peaks: Vec<(&PeriodTrial, usize, f64)> = pgram
            .trials
            .iter()
            .filter_map(|t| t.best().map(|(iw, snr)| (t, iw, snr)))
            .filter(|(_, _, snr)| *snr >= params.snr_min)
            .collect();
        if peaks.is_empty() {
            return Vec::new();
        }

        let beat: Vec<f64> = peaks.iter().map(|(t, _, _)| pgram.tobs / t.period).collect();
        cluster_1d(&beat, params.peak_clustering_radius)
            .into_iter()
            .filter_map(|group| {
                group
                    .into_iter()
                    .map(|i| peaks[i])
                    .reduce(|a, b| if b.2 > a.2 { b } else { a })
            })
            .map(|(trial, iw, snr)| {
                let width = trial.widths[iw];
                Detection {
                    period: trial.period,
                    dm: metadata.dm,
                    width,
                    ducy: f64::from(width) / trial.nbins as f64,
                    snr,
                    metadata: DetectionMetadata {
                        tobs: metadata.tobs,
                        fname: metadata.fname.clone(),
                        dm: metadata.dm,
                    },
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn pulse_train(period: f64, tsamp: f64, nsamp: usize, amplitude: f32) -> Vec<f32> {
    // Deterministic pseudo-noise keeps the series non-degenerate.
    let mut state = 0x2545_f491_u32;
    (0..nsamp)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state as f32 / u32::MAX as f32) - 0.5;
            let phase = (i as f64 * tsamp / period).fract();
            noise + if phase < 0.03 { amplitude } else { 0.0 }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::test_search_config;

    #[test]
    fn test_boxcar_widths() {
        assert_eq!(boxcar_widths(32, 0.2, 1.5), vec![1, 2, 3, 5]);
        assert_eq!(boxcar_widths(4, 0.1, 1.5), vec![1]);
    }

    #[test]
    fn test_boxcar_snr_of_single_spike() {
        let sums = [0.0, 0.0, 8.0, 0.0];
        let counts = [4, 4, 4, 4];
        let snrs = boxcar_snrs(&sums, &counts, &[1, 2]);
        assert!((snrs[0] - 4.0).abs() < 1e-12);
        assert!((snrs[1] - 8.0 / 8f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_finds_injected_period() {
        let tsamp = 1e-3;
        let period = 0.8;
        let data = pulse_train(period, tsamp, 20_000, 3.0);
        let ts = TimeSeries::new(data, tsamp, "fake_DM10.00.inf", 10.0, None).unwrap();
        let cfg = test_search_config("short");

        let (processed, pgram) = FoldingSearch.search(&ts, &cfg.search).unwrap();
        assert_eq!(processed.nsamp(), ts.nsamp());
        assert!(pgram.trials.len() > 10);
        assert!(pgram.trials.windows(2).all(|w| w[1].period > w[0].period));

        let dets = FoldingSearch.detect(&pgram, &cfg.detect, ts.metadata());
        let best = dets
            .iter()
            .max_by(|a, b| a.snr.total_cmp(&b.snr))
            .unwrap();
        assert!((best.period - period).abs() / period < 0.01);
        assert_eq!(best.dm, 10.0);
        assert!(best.ducy > 0.0 && best.ducy <= 0.2);
        assert!(dets.iter().all(|d| d.snr >= cfg.detect.snr_min));
    }

    #[test]
    fn test_noise_has_no_detections_above_high_threshold() {
        let data = pulse_train(1.0, 1e-3, 8_000, 0.0);
        let ts = TimeSeries::new(data, 1e-3, "noise.inf", 0.0, None).unwrap();
        let mut cfg = test_search_config("short");
        cfg.detect.snr_min = 50.0;
        let (_, pgram) = FoldingSearch.search(&ts, &cfg.search).unwrap();
        assert!(FoldingSearch.detect(&pgram, &cfg.detect, ts.metadata()).is_empty());
    }
}
