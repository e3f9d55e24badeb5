//! Sky coordinates and the ICRS to galactic-latitude conversion.

use serde::{Deserialize, Serialize};

/// Right ascension of the north galactic pole (J2000), degrees.
const NGP_RA_DEG: f64 = 192.859_48;
/// Declination of the north galactic pole (J2000), degrees.
const NGP_DEC_DEG: f64 = 27.128_25;

/// Equatorial (J2000) pointing direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub ra_rad: f64,
    pub dec_rad: f64,
}

impl SkyCoord {
    pub fn from_degrees(ra_deg: f64, dec_deg: f64) -> Self {
        Self {
            ra_rad: ra_deg.to_radians(),
            dec_rad: dec_deg.to_radians(),
        }
    }

    /// Parse PRESTO-style sexagesimal strings, `hh:mm:ss.s` and `[+-]dd:mm:ss.s`.
    pub fn from_sexagesimal(ra: &str, dec: &str) -> Option<Self> {
        let ra_hours = parse_sexagesimal(ra)?;
        let dec_deg = parse_sexagesimal(dec)?;
        Some(Self::from_degrees(ra_hours * 15.0, dec_deg))
    }

    /// Decode SIGPROC packed coordinates, `hhmmss.s` and `[+-]ddmmss.s`.
    pub fn from_sigproc(src_raj: f64, src_dej: f64) -> Self {
        Self::from_degrees(unpack_sigproc(src_raj) * 15.0, unpack_sigproc(src_dej))
    }

    /// Galactic latitude `b` in radians.
    pub fn galactic_latitude(&self) -> f64 {
        let ngp_ra = NGP_RA_DEG.to_radians();
        let ngp_dec = NGP_DEC_DEG.to_radians();
        let sin_b = self.dec_rad.sin() * ngp_dec.sin()
            + self.dec_rad.cos() * ngp_dec.cos() * (self.ra_rad - ngp_ra).cos();
        sin_b.clamp(-1.0, 1.0).asin()
    }
}

fn parse_sexagesimal(text: &str) -> Option<f64> {
    let text = text.trim();
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut parts = body.split(':');
    let units: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = match parts.next() {
        Some(p) => p.trim().parse().ok()?,
        None => 0.0,
    };
    let seconds: f64 = match parts.next() {
        Some(p) => p.trim().parse().ok()?,
        None => 0.0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(sign * (units + minutes / 60.0 + seconds / 3600.0))
}

fn unpack_sigproc(packed: f64) -> f64 {
    let sign = if packed < 0.0 { -1.0 } else { 1.0 };
    let value = packed.abs();
    let units = (value / 10_000.0).floor();
    let minutes = ((value - units * 10_000.0) / 100.0).floor();
    let seconds = value - units * 10_000.0 - minutes * 100.0;
    sign * (units + minutes / 60.0 + seconds / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_galactic_pole_has_latitude_90() {
        let ngp = SkyCoord::from_degrees(NGP_RA_DEG, NGP_DEC_DEG);
        assert!((ngp.galactic_latitude().to_degrees() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_crab_latitude() {
        // Crab pulsar, b = -5.78 deg
        let crab = SkyCoord::from_sexagesimal("05:34:31.97", "+22:00:52.07").unwrap();
        assert!((crab.galactic_latitude().to_degrees() + 5.78).abs() < 0.01);
    }

    #[test]
    fn test_sigproc_matches_sexagesimal() {
        let a = SkyCoord::from_sigproc(53431.97, 220052.07);
        let b = SkyCoord::from_sexagesimal("05:34:31.97", "22:00:52.07").unwrap();
        assert!((a.ra_rad - b.ra_rad).abs() < 1e-9);
        assert!((a.dec_rad - b.dec_rad).abs() < 1e-9);
    }

    #[test]
    fn test_negative_declination() {
        let c = SkyCoord::from_sexagesimal("10:00:00", "-30:30:00").unwrap();
        assert!((c.dec_rad.to_degrees() + 30.5).abs() < 1e-9);
        let packed = SkyCoord::from_sigproc(100000.0, -303000.0);
        assert!((packed.dec_rad.to_degrees() + 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_sexagesimal() {
        assert!(SkyCoord::from_sexagesimal("aa:bb", "10:00:00").is_none());
        assert!(SkyCoord::from_sexagesimal("01:02:03:04", "10:00:00").is_none());
    }
}
