//! Harmonic filtering.
//!
//! A bright pulsar is detected not only at its own frequency but also at
//! rational multiples of it. Clusters are examined in order of decreasing
//! S/N; each one is either a fundamental or a harmonic of an earlier,
//! brighter fundamental.

use ffa_core::{Attributed, ClusterSummary, DetectionCluster};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

/// A non-negative rational number `num / den` with `den >= 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub num: u64,
    pub den: u64,
}

impl Fraction {
    pub fn value(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Closest fraction to `x >= 0` with a denominator of at most
    /// `max_den`, found from the continued-fraction expansion of `x` and the
    /// best semiconvergent at the cut-off.
    pub fn limit_denominator(x: f64, max_den: u64) -> Self {
        let max_den = max_den.max(1);
        if !(x.is_finite() && x > 0.0) {
            return Self { num: 0, den: 1 };
        }
        let (mut p0, mut q0, mut p1, mut q1) = (0u64, 1u64, 1u64, 0u64);
        let mut r = x;
        loop {
            if r > u64::MAX as f64 / 2.0 {
                break;
            }
            let a = r.floor() as u64;
            let Some(q2) = a.checked_mul(q1).and_then(|v| v.checked_add(q0)) else {
                break;
            };
            if q2 > max_den {
                break;
            }
            let Some(p2) = a.checked_mul(p1).and_then(|v| v.checked_add(p0)) else {
                break;
            };
            (p0, q0, p1, q1) = (p1, q1, p2, q2);
            let rest = r - r.floor();
            if rest < 1e-12 {
                break;
            }
            r = 1.0 / rest;
        }
        if q1 == 0 {
            // The integer part alone needs no denominator; only reachable for huge x.
            return Self { num: u64::MAX, den: 1 };
        }

        let k = (max_den - q0) / q1;
        let bound2 = Self { num: p1, den: q1 };
        let bound1 = k
            .checked_mul(p1)
            .and_then(|v| v.checked_add(p0))
            .zip(k.checked_mul(q1).and_then(|v| v.checked_add(q0)))
            .map(|(num, den)| Self { num, den });
        match bound1 {
            Some(bound1) if (bound1.value() - x).abs() < (bound2.value() - x).abs() => bound1,
            _ => bound2,
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Parameters of the harmonic classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicParams {
    pub fmin: f64,
    pub fmax: f64,
    /// Representative observation length in seconds.
    pub tobs: f64,
    pub max_denominator: u64,
    /// Frequency tolerance in Fourier bins.
    pub max_distance: f64,
    pub snr_tol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonicFlag {
    Fundamental,
    /// Harmonic of the cluster at `fundamental_index`, whose frequency times
    /// `fraction` approximates this cluster's frequency.
    Harmonic {
        fundamental_index: usize,
        fraction: Fraction,
    },
}

impl HarmonicFlag {
    pub fn is_harmonic(&self) -> bool {
        matches!(self, HarmonicFlag::Harmonic { .. })
    }
}

/// Classify clusters given in decreasing S/N order.
///
/// The classification of summary `i` may only depend on summaries `0..i`,
/// and a `Harmonic` flag must point at an index below `i` flagged
/// `Fundamental`.
pub trait HarmonicClassifier: Send + Sync {
    fn classify(&self, summaries: &[ClusterSummary], params: &HarmonicParams) -> Vec<HarmonicFlag>;
}

/// Flags a cluster as harmonic when its frequency is close to a small-
/// denominator rational multiple of an earlier fundamental's frequency and
/// its S/N is compatible with that relation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RationalHarmonicClassifier;

impl RationalHarmonicClassifier {
    fn related(
        &self,
        cand: &ClusterSummary,
        fund: &ClusterSummary,
        params: &HarmonicParams,
    ) -> Option<Fraction> {
        let ff = fund.frequency();
        if !(params.fmin..=params.fmax).contains(&ff) {
            return None;
        }
        let fc = cand.frequency();
        let fraction = Fraction::limit_denominator(fc / ff, params.max_denominator);
        if fraction.num == 0 {
            return None;
        }
        let distance = (fc - ff * fraction.value()).abs() * params.tobs;
        if distance > params.max_distance {
            return None;
        }
        let expected = fund.snr / ((fraction.num * fraction.den) as f64).sqrt();
        (cand.snr <= expected + params.snr_tol).then_some(fraction)
    }
}

impl HarmonicClassifier for RationalHarmonicClassifier {
    fn classify(&self, summaries: &[ClusterSummary], params: &HarmonicParams) -> Vec<HarmonicFlag> {
        let mut flags: Vec<HarmonicFlag> = Vec::with_capacity(summaries.len());
        let mut fundamentals: Vec<usize> = Vec::new();
        for cand in summaries {
            let flag = fundamentals
                .iter()
                .find_map(|&j| {
                    self.related(cand, &summaries[j], params)
                        .map(|fraction| HarmonicFlag::Harmonic {
                            fundamental_index: j,
                            fraction,
                        })
                })
                .unwrap_or(HarmonicFlag::Fundamental);
            if !flag.is_harmonic() {
                fundamentals.push(flags.len());
            }
            flags.push(flag);
        }
        flags
    }
}

/// Clusters after harmonic filtering.
#[derive(Debug, Clone)]
pub struct HarmonicReport {
    /// Input clusters in classification order (decreasing S/N).
    pub ordered: Vec<Attributed<DetectionCluster>>,
    pub flags: Vec<HarmonicFlag>,
}

impl HarmonicReport {
    pub fn num_harmonics(&self) -> usize {
        self.flags.iter().filter(|f| f.is_harmonic()).count()
    }

    pub fn into_fundamentals(self) -> Vec<Attributed<DetectionCluster>> {
        self.ordered
            .into_iter()
            .zip(self.flags)
            .filter(|(_, flag)| !flag.is_harmonic())
            .map(|(cl, _)| cl)
            .collect()
    }
}

/// Sort by decreasing top S/N; clusters of equal S/N keep their input order.
pub fn sort_by_snr(clusters: Vec<Attributed<DetectionCluster>>) -> Vec<Attributed<DetectionCluster>> {
    let mut indexed: Vec<(usize, Attributed<DetectionCluster>)> =
        clusters.into_iter().enumerate().collect();
    indexed.sort_by(|(ia, a), (ib, b)| {
        let sa = a.payload().top_detection().snr;
        let sb = b.payload().top_detection().snr;
        sb.total_cmp(&sa).then(ia.cmp(ib))
    });
    indexed.into_iter().map(|(_, cl)| cl).collect()
}

/// Order clusters by decreasing S/N and classify them.
pub fn flag_harmonics(
    clusters: Vec<Attributed<DetectionCluster>>,
    classifier: &dyn HarmonicClassifier,
    params: &HarmonicParams,
) -> HarmonicReport {
    let start = Instant::now();
    let ordered = sort_by_snr(clusters);
    let summaries: Vec<ClusterSummary> = ordered.iter().map(|c| c.payload().summary()).collect();
    let flags = classifier.classify(&summaries, params);

    for (cl, flag) in ordered.iter().zip(&flags) {
        if let HarmonicFlag::Harmonic {
            fundamental_index,
            fraction,
        } = flag
        {
            debug!(
                "{} is a harmonic of {} with period ratio {}",
                cl.payload(),
                ordered[*fundamental_index].payload(),
                fraction
            );
        }
    }
    let report = HarmonicReport { ordered, flags };
    info!(
        clusters = report.ordered.len(),
        harmonics = report.num_harmonics(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "Flagged harmonics"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffa_core::{Detection, DetectionMetadata, SearchId};
    use std::path::PathBuf;

    fn summary(period: f64, snr: f64) -> ClusterSummary {
        ClusterSummary {
            period,
            ducy: 0.05,
            dm: 10.0,
            snr,
            num_detections: 1,
        }
    }

    fn params() -> HarmonicParams {
        HarmonicParams {
            fmin: 0.1,
            fmax: 100.0,
            tobs: 500.0,
            max_denominator: 10,
            max_distance: 3.0,
            snr_tol: 2.0,
        }
    }

    fn cluster(period: f64, snr: f64, search: usize) -> Attributed<DetectionCluster> {
        let det = Detection {
            period,
            dm: 10.0,
            width: 1,
            ducy: 0.05,
            snr,
            metadata: DetectionMetadata {
                tobs: 500.0,
                fname: PathBuf::from("x.inf"),
                dm: 10.0,
            },
        };
        Attributed::new(DetectionCluster::new(vec![det]).unwrap(), SearchId(search))
    }

    #[test]
    fn test_limit_denominator() {
        assert_eq!(
            Fraction::limit_denominator(std::f64::consts::PI, 10),
            Fraction { num: 22, den: 7 }
        );
        assert_eq!(
            Fraction::limit_denominator(std::f64::consts::PI, 120),
            Fraction { num: 355, den: 113 }
        );
        assert_eq!(Fraction::limit_denominator(0.5, 10), Fraction { num: 1, den: 2 });
        assert_eq!(Fraction::limit_denominator(3.0, 10), Fraction { num: 3, den: 1 });
        assert_eq!(
            Fraction::limit_denominator(0.6667, 5),
            Fraction { num: 2, den: 3 }
        );
        assert_eq!(Fraction::limit_denominator(0.0, 10).num, 0);
    }

    #[test]
    fn test_limit_denominator_extreme_ratios() {
        let max_den = u64::MAX / 2;
        assert_eq!(
            Fraction::limit_denominator(1e15, max_den),
            Fraction {
                num: 1_000_000_000_000_000,
                den: 1
            }
        );
        assert_eq!(
            Fraction::limit_denominator(1e15 + 0.5, u64::MAX),
            Fraction {
                num: 2_000_000_000_000_001,
                den: 2
            }
        );

        let tiny = Fraction::limit_denominator(1e-15, max_den);
        assert!(tiny.den >= 1 && tiny.den <= max_den);
        assert!(tiny.value() < 1e-12);

        let f = Fraction::limit_denominator(1e18, max_den);
        assert_eq!(f.den, 1);
        assert!((f.value() - 1e18).abs() <= 1e3);
    }

    #[test]
    fn test_second_harmonic_is_flagged() {
        // f = 2 Hz is twice the 1 Hz fundamental; S/N 7 <= 10/sqrt(2) + 2.
        let flags = RationalHarmonicClassifier
            .classify(&[summary(1.0, 10.0), summary(0.5, 7.0)], &params());
        assert_eq!(flags[0], HarmonicFlag::Fundamental);
        assert_eq!(
            flags[1],
            HarmonicFlag::Harmonic {
                fundamental_index: 0,
                fraction: Fraction { num: 2, den: 1 }
            }
        );
    }

    #[test]
    fn test_too_bright_or_unrelated_is_fundamental() {
        let flags = RationalHarmonicClassifier
            .classify(&[summary(1.0, 10.0), summary(0.5, 9.9)], &params());
        assert_eq!(flags[1], HarmonicFlag::Fundamental);

        // 1/0.7345 Hz is not within 3 bins of any p/q <= 10 multiple of 1 Hz.
        let flags = RationalHarmonicClassifier
            .classify(&[summary(1.0, 10.0), summary(0.734567, 4.0)], &params());
        assert_eq!(flags[1], HarmonicFlag::Fundamental);
    }

    #[test]
    fn test_harmonics_point_to_brighter_fundamentals() {
        let clusters = vec![
            cluster(0.5, 7.0, 0),
            cluster(1.0, 10.0, 1),
            cluster(0.33333, 5.0, 0),
            cluster(2.7183, 8.0, 1),
            cluster(1.5, 6.0, 1),
            cluster(1.0, 10.0, 0),
        ];
        let report = flag_harmonics(clusters, &RationalHarmonicClassifier, &params());

        for (i, flag) in report.flags.iter().enumerate() {
            if let HarmonicFlag::Harmonic {
                fundamental_index, ..
            } = flag
            {
                assert!(*fundamental_index < i);
                assert_eq!(report.flags[*fundamental_index], HarmonicFlag::Fundamental);
                assert!(
                    report.ordered[*fundamental_index].payload().top_detection().snr
                        >= report.ordered[i].payload().top_detection().snr
                );
            }
        }
        // Equal S/N: the cluster seen first leads.
        assert_eq!(report.ordered[0].search(), SearchId(1));
        assert_eq!(report.ordered[1].search(), SearchId(0));

        let harmonics = report.num_harmonics();
        let fundamentals = report.into_fundamentals();
        assert_eq!(fundamentals.len() + harmonics, 6);
        let periods: Vec<f64> = fundamentals
            .iter()
            .map(|c| c.payload().top_detection().period)
            .collect();
        assert!(periods.contains(&2.7183));
        assert!(!periods.contains(&0.5));
    }

    #[test]
    fn test_flagging_logs_elapsed_time() {
        let clusters = vec![cluster(1.0, 10.0, 0), cluster(0.5, 7.0, 0)];
        let (report, logs) = crate::test_log::capture(|| {
            flag_harmonics(clusters, &RationalHarmonicClassifier, &params())
        });
        assert_eq!(report.num_harmonics(), 1);
        let line = logs.lines().find(|l| l.contains("Flagged harmonics")).unwrap();
        assert!(line.contains("clusters=2"));
        assert!(line.contains("harmonics=1"));
        assert!(line.contains("elapsed_s="));
    }
}
