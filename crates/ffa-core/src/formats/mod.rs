//! Time-series readers.
//!
//! Dedispersed time series arrive in one of two on-disk formats:
//!
//! - **PRESTO** - a text `.inf` header next to a `.dat` file of `f32` samples.
//! - **SIGPROC** - a `.tim` file with a binary keyword header followed by the
//!   samples.
//!
//! [`DataFormat`] picks the reader. Reading the DM only parses the header,
//! which is what DM-trial selection needs before any samples are loaded.

pub mod presto;
pub mod sigproc;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::coords::SkyCoord;
use crate::error::{FfaError, Result};
use crate::timeseries::TimeSeries;

/// Supported time-series formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataFormat {
    Presto,
    Sigproc,
}

impl DataFormat {
    /// Load samples and metadata from `path`.
    pub fn load(&self, path: &Path) -> Result<TimeSeries> {
        match self {
            DataFormat::Presto => presto::load(path),
            DataFormat::Sigproc => sigproc::load(path),
        }
    }

    /// Read the DM trial value from the header only.
    pub fn read_dm(&self, path: &Path) -> Result<f64> {
        match self {
            DataFormat::Presto => Ok(presto::PrestoInf::read(path)?.dm),
            DataFormat::Sigproc => Ok(sigproc::SigprocHeader::read(path)?.refdm),
        }
    }

    /// Read the source coordinates from the header only.
    pub fn read_skycoord(&self, path: &Path) -> Result<Option<SkyCoord>> {
        match self {
            DataFormat::Presto => Ok(presto::PrestoInf::read(path)?.skycoord),
            DataFormat::Sigproc => Ok(sigproc::SigprocHeader::read(path)?.skycoord),
        }
    }

    /// Header file extension used when counting processed DM trials.
    pub fn header_extension(&self) -> &'static str {
        match self {
            DataFormat::Presto => "inf",
            DataFormat::Sigproc => "tim",
        }
    }
}

impl FromStr for DataFormat {
    type Err = FfaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "presto" => Ok(DataFormat::Presto),
            "sigproc" => Ok(DataFormat::Sigproc),
            _ => Err(FfaError::UnknownDataFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for DataFormat {
    type Error = FfaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DataFormat> for String {
    fn from(value: DataFormat) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Presto => write!(f, "presto"),
            DataFormat::Sigproc => write!(f, "sigproc"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(" PRESTO ".parse::<DataFormat>().unwrap(), DataFormat::Presto);
        assert_eq!("sigproc".parse::<DataFormat>().unwrap(), DataFormat::Sigproc);
        let err = "filterbank".parse::<DataFormat>().unwrap_err();
        assert!(err.is_fatal());
    }
}
