//! Batch loader: selects the DM trials to search and groups them into batches.
//!
//! Selection happens on headers only. The first selected file's sky position
//! bounds the highest useful DM through `dmsinb_max`, the maximum of
//! `DM x sin|b|`: beyond it a source would have to lie outside the Galaxy.

use ffa_core::{DataFormat, FfaError, Result, TimeSeries};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Regularises `sin|b|` near the galactic plane.
pub const GALACTIC_EPS: f64 = 1e-6;

/// Relative tolerance on `dm_step` against float rounding of header values.
pub const STEP_RTOL: f64 = 1e-7;

/// `dm_min` as enforced by the user, or the smallest available trial.
pub fn lower_dm_limit(dm_trials: &[f64], dm_min: Option<f64>) -> Option<f64> {
    dm_min.or_else(|| dm_trials.iter().copied().reduce(f64::min))
}

pub fn galactic_dm_limit(glat_radians: f64, dmsinb_max: f64) -> f64 {
    dmsinb_max / (glat_radians.abs().sin() + GALACTIC_EPS)
}

/// Largest available trial, clamped by the user's `dm_max` and, when the
/// galactic latitude is known, by `dmsinb_max`.
pub fn upper_dm_limit(
    dm_trials: &[f64],
    glat_radians: Option<f64>,
    dm_max: Option<f64>,
    dmsinb_max: Option<f64>,
) -> Option<f64> {
    let mut result = dm_trials.iter().copied().reduce(f64::max)?;
    if let Some(dm_max) = dm_max {
        result = result.min(dm_max);
    }
    if let (Some(glat), Some(dmsinb_max)) = (glat_radians, dmsinb_max) {
        result = result.min(galactic_dm_limit(glat, dmsinb_max));
    }
    Some(result)
}

/// Keep values in `[vmin, vmax]`, scanned in ascending order, each at least
/// `step` above the previously kept one.
pub fn iter_steps(values: &[f64], vmin: f64, vmax: f64, step: f64) -> Vec<f64> {
    let mut sorted: Vec<f64> = values
        .iter()
        .copied()
        .filter(|v| *v >= vmin && *v <= vmax)
        .collect();
    sorted.sort_by(f64::total_cmp);

    let mut kept: Vec<f64> = Vec::new();
    for value in sorted {
        match kept.last() {
            Some(&last) if value - last < step * (1.0 - STEP_RTOL) => {}
            _ => kept.push(value),
        }
    }
    kept
}

/// Translate the wildcards of a file-name pattern (`*`, `?`, `[...]`) into
/// an anchored regular expression.
fn pattern_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '[' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if !closed {
                    return Err(FfaError::Configuration(format!(
                        "unterminated character class in pattern \"{pattern}\""
                    )));
                }
                re.push('[');
                re.push_str(&class);
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| FfaError::Configuration(format!("invalid pattern \"{pattern}\": {e}")))
}

/// Expand a file pattern, sorted by path.
///
/// Wildcards are honoured in the file-name component only; the directory part
/// is taken literally. A missing directory matches nothing.
pub fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FfaError::Configuration(format!("pattern \"{pattern}\" has no file name")))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let re = pattern_to_regex(name)?;

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        let fname = entry.file_name();
        let Some(fname) = fname.to_str() else { continue };
        if re.is_match(fname) && entry.file_type()?.is_file() {
            paths.push(dir.join(fname));
        }
    }
    paths.sort();
    Ok(paths)
}

/// DM-trial selection policy of a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DmRange {
    pub dm_min: Option<f64>,
    pub dm_max: Option<f64>,
    pub dm_step: f64,
    pub dmsinb_max: Option<f64>,
}

/// Files chosen for searching, in ascending DM order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DmSelection {
    pub paths: Vec<PathBuf>,
    pub dms: Vec<f64>,
    pub num_found: usize,
}

/// Select the input files to search.
///
/// When two files carry the same DM trial value, the one later in path order
/// is used.
pub fn select_dm_trials(format: DataFormat, pattern: &str, range: &DmRange) -> Result<DmSelection> {
    let filenames = expand_pattern(pattern)?;
    info!(
        count = filenames.len(),
        pattern,
        "Found file names corresponding to specified pattern"
    );
    if filenames.is_empty() {
        return Ok(DmSelection::default());
    }

    info!("Fetching DM trial values from headers");
    let mut trials: Vec<(f64, PathBuf)> = Vec::with_capacity(filenames.len());
    for fname in &filenames {
        trials.push((format.read_dm(fname)?, fname.clone()));
    }
    trials.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut unique: Vec<(f64, PathBuf)> = Vec::with_capacity(trials.len());
    for (dm, path) in trials {
        match unique.last_mut() {
            Some(last) if last.0 == dm => last.1 = path,
            _ => unique.push((dm, path)),
        }
    }
    let dm_values: Vec<f64> = unique.iter().map(|(dm, _)| *dm).collect();

    let glat = match format.read_skycoord(&filenames[0])? {
        Some(coord) => {
            let b = coord.galactic_latitude();
            info!(
                fname = %filenames[0].display(),
                b_deg = b.to_degrees(),
                "Read galactic latitude"
            );
            Some(b)
        }
        None => {
            if range.dmsinb_max.is_some() {
                warn!(
                    fname = %filenames[0].display(),
                    "No sky coordinates in header, dmsinb_max is ignored"
                );
            }
            None
        }
    };
    if let (Some(b), Some(dmsinb_max)) = (glat, range.dmsinb_max) {
        info!(
            dmsinb_max,
            dm = galactic_dm_limit(b, dmsinb_max),
            "Requested maximum value of DM x sin|b|"
        );
    }

    // Both limits exist: dm_values is non-empty.
    let dm_min = lower_dm_limit(&dm_values, range.dm_min).unwrap_or(f64::NEG_INFINITY);
    let dm_max = upper_dm_limit(&dm_values, glat, range.dm_max, range.dmsinb_max)
        .unwrap_or(f64::INFINITY);
    info!(
        dm_min,
        dm_max,
        dm_step = range.dm_step,
        "Selecting DM trials in range with minimum step"
    );

    let selected = iter_steps(&dm_values, dm_min, dm_max, range.dm_step);
    let mut paths = Vec::with_capacity(selected.len());
    let mut cursor = unique.iter();
    for dm in &selected {
        if let Some((_, path)) = cursor.find(|(v, _)| v == dm) {
            paths.push(path.clone());
        }
    }
    info!(count = paths.len(), "Selected DM trials to process");

    Ok(DmSelection {
        paths,
        dms: selected,
        num_found: filenames.len(),
    })
}

/// Consuming iterator over batches of loaded time series.
///
/// Every batch holds `size` series except possibly the last one. Series are
/// loaded only when their batch is requested.
#[derive(Debug)]
pub struct Batches {
    paths: std::vec::IntoIter<PathBuf>,
    size: usize,
    format: DataFormat,
}

impl Batches {
    pub fn new(paths: Vec<PathBuf>, size: usize, format: DataFormat) -> Self {
        Self {
            paths: paths.into_iter(),
            size: size.max(1),
            format,
        }
    }
}

impl Iterator for Batches {
    type Item = Result<Vec<TimeSeries>>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch: Vec<PathBuf> = self.paths.by_ref().take(self.size).collect();
        if batch.is_empty() {
            return None;
        }
        Some(batch.iter().map(|p| self.format.load(p)).collect())
    }
}
