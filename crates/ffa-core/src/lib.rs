//! # ffa-core
//!
//! Core data model of the FFA pulsar-search pipeline.
//!
//! | Module          | Purpose                                                   |
//! |-----------------|-----------------------------------------------------------|
//! | [`detection`]   | Raw search detections and search attribution             |
//! | [`cluster`]     | Non-empty detection clusters and their summaries          |
//! | [`candidate`]   | Finalised candidates with folded data products            |
//! | [`timeseries`]  | Dedispersed time series, detrending, normalisation, folds |
//! | [`formats`]     | PRESTO and SIGPROC time-series readers                    |
//! | [`coords`]      | Sky coordinates and galactic latitude                     |
//! | [`stats`]       | Median and running-median helpers                         |
//! | [`error`]       | Error taxonomy shared across the workspace                |

pub mod candidate;
pub mod cluster;
pub mod coords;
pub mod detection;
pub mod error;
pub mod formats;
pub mod stats;
pub mod timeseries;

pub use candidate::{Candidate, CandidateParams, DmCurvePoint};
pub use cluster::{ClusterSummary, DetectionCluster};
pub use coords::SkyCoord;
pub use detection::{Attributed, Detection, DetectionMetadata, SearchId};
pub use error::{FfaError, Result};
pub use formats::DataFormat;
pub use timeseries::{Folded, TimeSeries, TimeSeriesMetadata};
