//! SIGPROC `.tim` reader.
//!
//! The header starts with the string `"HEADER_START"`, followed by
//! keyword/value pairs, and ends with `"HEADER_END"`. Strings are stored as a
//! little-endian `u32` length followed by the bytes. The value type of each
//! keyword is fixed by the SIGPROC keyword table below.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::coords::SkyCoord;
use crate::error::{FfaError, Result};
use crate::timeseries::TimeSeries;

const INT_KEYS: &[&str] = &[
    "telescope_id",
    "machine_id",
    "data_type",
    "barycentric",
    "pulsarcentric",
    "nbits",
    "nsamples",
    "nchans",
    "nifs",
    "nbeams",
    "ibeam",
    "signed",
];

const DOUBLE_KEYS: &[&str] = &[
    "az_start",
    "za_start",
    "src_raj",
    "src_dej",
    "tstart",
    "tsamp",
    "fch1",
    "foff",
    "refdm",
    "period",
];

const STRING_KEYS: &[&str] = &["source_name", "rawdatafile"];

/// Parsed subset of a SIGPROC header.
#[derive(Debug, Clone, PartialEq)]
pub struct SigprocHeader {
    pub nbits: u32,
    pub tsamp: f64,
    pub refdm: f64,
    pub source_name: String,
    pub skycoord: Option<SkyCoord>,
    /// Size of the header in bytes.
    pub header_len: usize,
}

struct CountingReader<R> {
    inner: R,
    consumed: usize,
}

impl<R: Read> CountingReader<R> {
    fn read_bytes<const N: usize>(&mut self) -> std::io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        self.consumed += N;
        Ok(buf)
    }

    fn read_string(&mut self, path: &Path) -> Result<String> {
        let len = u32::from_le_bytes(self.read_bytes::<4>()?) as usize;
        if len > 1024 {
            return Err(FfaError::header(
                path,
                format!("keyword length {len} exceeds sanity limit"),
            ));
        }
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        self.consumed += len;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_bytes::<4>()?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_bytes::<8>()?))
    }
}

impl SigprocHeader {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = CountingReader {
            inner: BufReader::new(file),
            consumed: 0,
        };
        Self::parse(&mut reader, path)
    }

    fn parse<R: Read>(reader: &mut CountingReader<R>, path: &Path) -> Result<Self> {
        if reader.read_string(path)? != "HEADER_START" {
            return Err(FfaError::header(path, "file does not start with HEADER_START"));
        }

        let mut nbits = 32u32;
        let mut tsamp = None;
        let mut refdm = 0.0;
        let mut source_name = String::new();
        let mut raj = None;
        let mut dej = None;

        loop {
            let keyword = reader.read_string(path)?;
            match keyword.as_str() {
                "HEADER_END" => break,
                "nbits" => nbits = reader.read_i32()? as u32,
                "tsamp" => tsamp = Some(reader.read_f64()?),
                "refdm" => refdm = reader.read_f64()?,
                "src_raj" => raj = Some(reader.read_f64()?),
                "src_dej" => dej = Some(reader.read_f64()?),
                "source_name" => source_name = reader.read_string(path)?,
                k if INT_KEYS.contains(&k) => {
                    reader.read_i32()?;
                }
                k if DOUBLE_KEYS.contains(&k) => {
                    reader.read_f64()?;
                }
                k if STRING_KEYS.contains(&k) => {
                    reader.read_string(path)?;
                }
                other => {
                    return Err(FfaError::header(path, format!("unknown keyword '{other}'")));
                }
            }
        }

        let skycoord = match (raj, dej) {
            (Some(raj), Some(dej)) => Some(SkyCoord::from_sigproc(raj, dej)),
            _ => None,
        };

        Ok(Self {
            nbits,
            tsamp: tsamp.ok_or_else(|| FfaError::header(path, "missing tsamp"))?,
            refdm,
            source_name,
            skycoord,
            header_len: reader.consumed,
        })
    }
}

/// Load a SIGPROC time series.
pub fn load(path: &Path) -> Result<TimeSeries> {
    let file = File::open(path)?;
    let mut reader = CountingReader {
        inner: BufReader::new(file),
        consumed: 0,
    };
    let header = SigprocHeader::parse(&mut reader, path)?;
    let mut raw = Vec::new();
    reader.inner.read_to_end(&mut raw)?;

    let data: Vec<f32> = match header.nbits {
        8 => raw.iter().map(|&b| f32::from(b)).collect(),
        32 => raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        other => {
            return Err(FfaError::header(path, format!("unsupported nbits={other}")));
        }
    };
    TimeSeries::new(data, header.tsamp, path, header.refdm, header.skycoord)
}

fn write_string(out: &mut impl Write, s: &str) -> std::io::Result<()> {
    out.write_all(&(s.len() as u32).to_le_bytes())?;
    out.write_all(s.as_bytes())
}

/// Write a 32-bit `.tim` file. Used to stage synthetic inputs.
pub fn write(path: &Path, data: &[f32], tsamp: f64, refdm: f64, raj: f64, dej: f64) -> Result<()> {
    let mut out = std::io::BufWriter::new(File::create(path)?);
    write_string(&mut out, "HEADER_START")?;
    write_string(&mut out, "source_name")?;
    write_string(&mut out, "synthetic")?;
    write_string(&mut out, "data_type")?;
    out.write_all(&2i32.to_le_bytes())?;
    write_string(&mut out, "nbits")?;
    out.write_all(&32i32.to_le_bytes())?;
    write_string(&mut out, "tsamp")?;
    out.write_all(&tsamp.to_le_bytes())?;
    write_string(&mut out, "refdm")?;
    out.write_all(&refdm.to_le_bytes())?;
    write_string(&mut out, "src_raj")?;
    out.write_all(&raj.to_le_bytes())?;
    write_string(&mut out, "src_dej")?;
    out.write_all(&dej.to_le_bytes())?;
    write_string(&mut out, "HEADER_END")?;
    for v in data {
        out.write_all(&v.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obs_DM30.00.tim");
        let data: Vec<f32> = (0..128).map(|i| (i % 7) as f32).collect();
        write(&path, &data, 2e-4, 30.0, 53431.97, 220052.07).unwrap();

        let header = SigprocHeader::read(&path).unwrap();
        assert_eq!(header.nbits, 32);
        assert_eq!(header.source_name, "synthetic");
        assert!((header.refdm - 30.0).abs() < 1e-12);

        let ts = load(&path).unwrap();
        assert_eq!(ts.data(), data.as_slice());
        assert!(ts.metadata().skycoord.is_some());
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tim");
        let mut f = File::create(&path).unwrap();
        write_string(&mut f, "NOT_A_HEADER").unwrap();
        drop(f);
        assert!(matches!(
            SigprocHeader::read(&path),
            Err(FfaError::Header { .. })
        ));
    }
}
