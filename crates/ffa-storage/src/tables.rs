//! Tab-separated parameter tables written next to the candidate artifacts.
//!
//! All three tables share the layout of a header row followed by one row per
//! entry, with floats printed to eight decimal places.

use csv::WriterBuilder;
use ffa_core::{CandidateParams, Detection};
use std::fs::File;
use std::path::Path;
use tracing::info;

use crate::error::StorageResult;

pub const DETECTIONS_FILE_NAME: &str = "detections.csv";
pub const CLUSTERS_FILE_NAME: &str = "clusters.csv";
pub const SUMMARY_FILE_NAME: &str = "summary.csv";

const PARAM_COLUMNS: [&str; 6] = ["search_name", "period", "dm", "width", "ducy", "snr"];
const SUMMARY_COLUMNS: [&str; 6] = ["fname", "period", "dm", "width", "ducy", "snr"];

fn fmt_float(value: f64) -> String {
    format!("{value:.8}")
}

fn tsv_writer(path: &Path) -> StorageResult<csv::Writer<File>> {
    Ok(WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?)
}

fn param_row(label: &str, period: f64, dm: f64, width: u32, ducy: f64, snr: f64) -> [String; 6] {
    [
        label.to_string(),
        fmt_float(period),
        fmt_float(dm),
        width.to_string(),
        fmt_float(ducy),
        fmt_float(snr),
    ]
}

fn write_param_table(path: &Path, rows: &[(&str, &Detection)]) -> StorageResult<()> {
    let mut sorted: Vec<&(&str, &Detection)> = rows.iter().collect();
    sorted.sort_by(|a, b| a.1.period.total_cmp(&b.1.period));

    let mut writer = tsv_writer(path)?;
    writer.write_record(PARAM_COLUMNS)?;
    for (label, det) in sorted {
        writer.write_record(param_row(label, det.period, det.dm, det.width, det.ducy, det.snr))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write every raw detection, labelled with its search name, sorted by period.
///
/// Nothing is written when `rows` is empty. Returns whether a file was written.
pub fn save_detections(outdir: &Path, rows: &[(&str, &Detection)]) -> StorageResult<bool> {
    if rows.is_empty() {
        return Ok(false);
    }
    let path = outdir.join(DETECTIONS_FILE_NAME);
    info!(
        count = rows.len(),
        path = %path.display(),
        "Saving parameters of all detections"
    );
    write_param_table(&path, rows)?;
    Ok(true)
}

/// Write the top detection of every cluster, sorted by period.
///
/// Nothing is written when `rows` is empty. Returns whether a file was written.
pub fn save_clusters(outdir: &Path, rows: &[(&str, &Detection)]) -> StorageResult<bool> {
    if rows.is_empty() {
        return Ok(false);
    }
    let path = outdir.join(CLUSTERS_FILE_NAME);
    info!(
        count = rows.len(),
        path = %path.display(),
        "Saving parameters of all detection clusters"
    );
    write_param_table(&path, rows)?;
    Ok(true)
}

/// Write the candidate summary, one row per saved artifact, in candidate order.
pub fn save_summary(outdir: &Path, rows: &[(String, CandidateParams)]) -> StorageResult<()> {
    let path = outdir.join(SUMMARY_FILE_NAME);
    info!(path = %path.display(), "Saving candidate summary");
    let mut writer = tsv_writer(&path)?;
    writer.write_record(SUMMARY_COLUMNS)?;
    for (basename, p) in rows {
        writer.write_record(param_row(
            basename,
            p.best_period,
            p.best_dm,
            p.best_width,
            p.best_ducy,
            p.best_snr,
        ))?;
    }
    writer.flush()?;
    Ok(())
}
