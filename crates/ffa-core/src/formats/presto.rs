//! PRESTO `.inf` / `.dat` reader.
//!
//! The `.inf` file is a list of `description = value` lines. Only the fields
//! needed by the search are extracted; the rest are ignored.

use std::fs;
use std::path::{Path, PathBuf};

use crate::coords::SkyCoord;
use crate::error::{FfaError, Result};
use crate::timeseries::TimeSeries;

/// Parsed subset of a PRESTO `.inf` header.
#[derive(Debug, Clone, PartialEq)]
pub struct PrestoInf {
    pub basename: String,
    pub nsamp: usize,
    pub tsamp: f64,
    pub dm: f64,
    pub skycoord: Option<SkyCoord>,
}

impl PrestoInf {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut basename = None;
        let mut nsamp = None;
        let mut tsamp = None;
        let mut dm = None;
        let mut ra = None;
        let mut dec = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.starts_with("Data file name") {
                basename = Some(value.to_string());
            } else if key.starts_with("Number of bins in the time series") {
                nsamp = Some(parse_field::<usize>(value, key, path)?);
            } else if key.starts_with("Width of each time series bin") {
                tsamp = Some(parse_field::<f64>(value, key, path)?);
            } else if key.starts_with("Dispersion measure") {
                dm = Some(parse_field::<f64>(value, key, path)?);
            } else if key.starts_with("J2000 Right Ascension") {
                ra = Some(value.to_string());
            } else if key.starts_with("J2000 Declination") {
                dec = Some(value.to_string());
            }
        }

        let skycoord = match (ra, dec) {
            (Some(ra), Some(dec)) => SkyCoord::from_sexagesimal(&ra, &dec),
            _ => None,
        };

        Ok(Self {
            basename: basename.ok_or_else(|| FfaError::header(path, "missing data file name"))?,
            nsamp: nsamp.ok_or_else(|| FfaError::header(path, "missing number of bins"))?,
            tsamp: tsamp.ok_or_else(|| FfaError::header(path, "missing sample width"))?,
            dm: dm.ok_or_else(|| FfaError::header(path, "missing dispersion measure"))?,
            skycoord,
        })
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, key: &str, path: &Path) -> Result<T> {
    value
        .parse()
        .map_err(|_| FfaError::header(path, format!("cannot parse '{key}' value '{value}'")))
}

/// Path of the `.dat` file belonging to an `.inf` header.
pub fn dat_path(inf_path: &Path) -> PathBuf {
    inf_path.with_extension("dat")
}

/// Load a PRESTO time series from its `.inf` header path.
pub fn load(inf_path: &Path) -> Result<TimeSeries> {
    let inf = PrestoInf::read(inf_path)?;
    let bytes = fs::read(dat_path(inf_path))?;
    if bytes.len() % 4 != 0 {
        return Err(FfaError::header(
            inf_path,
            format!(".dat size {} is not a multiple of 4 bytes", bytes.len()),
        ));
    }
    let mut data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if data.len() < inf.nsamp {
        return Err(FfaError::header(
            inf_path,
            format!("expected {} samples, .dat holds {}", inf.nsamp, data.len()),
        ));
    }
    data.truncate(inf.nsamp);
    TimeSeries::new(data, inf.tsamp, inf_path, inf.dm, inf.skycoord)
}

/// Write a minimal `.inf`/`.dat` pair. Used to stage synthetic inputs.
pub fn write(inf_path: &Path, data: &[f32], tsamp: f64, dm: f64, ra: &str, dec: &str) -> Result<()> {
    let basename = inf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let header = format!(
        " Data file name without suffix          =  {basename}\n\
         \x20Telescope used                         =  GMRT\n\
         \x20J2000 Right Ascension (hh:mm:ss.ssss)  =  {ra}\n\
         \x20J2000 Declination     (dd:mm:ss.ssss)  =  {dec}\n\
         \x20Number of bins in the time series      =  {}\n\
         \x20Width of each time series bin (sec)    =  {tsamp:e}\n\
         \x20Dispersion measure (cm-3 pc)           =  {dm:.3}\n",
        data.len()
    );
    fs::write(inf_path, header)?;
    let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(dat_path(inf_path), bytes)?;
    Ok(())
}
