//! Per-candidate JSON artifacts.

use ffa_core::Candidate;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::StorageResult;

pub const CANDIDATE_NAME_PREFIX: &str = "riptide_cand";
pub const CANDIDATE_EXTENSION: &str = "json";

/// File name of the `index`-th candidate, counting from 1.
pub fn candidate_basename(index: usize) -> String {
    format!("{CANDIDATE_NAME_PREFIX}_{index:04}.{CANDIDATE_EXTENSION}")
}

pub fn save_candidate(path: &Path, candidate: &Candidate) -> StorageResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, candidate)?;
    writer.flush()?;
    Ok(())
}

pub fn load_candidate(path: &Path) -> StorageResult<Candidate> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Save candidates as numbered artifacts in `outdir`.
///
/// Returns the written file paths in candidate order.
pub fn save_candidates(outdir: &Path, candidates: &[Candidate]) -> StorageResult<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(candidates.len());
    for (index, cand) in candidates.iter().enumerate() {
        let path = outdir.join(candidate_basename(index + 1));
        info!(path = %path.display(), "Saving {cand}");
        save_candidate(&path, cand)?;
        paths.push(path);
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_basename() {
        assert_eq!(candidate_basename(1), "riptide_cand_0001.json");
        assert_eq!(candidate_basename(123), "riptide_cand_0123.json");
    }
}
