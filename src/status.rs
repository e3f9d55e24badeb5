//! Plain-text progress report of one date, built from its ledger.

use ffa_storage::{read_ledger, ConfigSnapshot, FileRecord};
use serde_json::Value;
use std::fmt::{self, Write as _};
use std::path::Path;

use crate::error::AppResult;

/// Completion of a stage that runs after the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Done,
    Incomplete,
    NotDone,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Done => "Done.",
            StageStatus::Incomplete => "Incomplete.",
            StageStatus::NotDone => "Not Done.",
        };
        // `pad` honours the width of the table columns.
        f.pad(s)
    }
}

fn stage_status(produced: Option<u64>, expected: Option<u64>) -> StageStatus {
    match produced {
        Some(n) if n > 0 => {
            if Some(n) == expected {
                StageStatus::Done
            } else {
                StageStatus::Incomplete
            }
        }
        _ => StageStatus::NotDone,
    }
}

/// Folding is done when every candidate has a folded profile.
pub fn folding_status(record: &FileRecord) -> StageStatus {
    stage_status(record.num_fold_prfs, record.num_candidates)
}

/// Archiving is done when every folded profile has been archived.
pub fn archiving_status(record: &FileRecord) -> StageStatus {
    stage_status(record.num_arv_prfs, record.num_fold_prfs)
}

/// Everything the ledger says about a date.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub date: String,
    pub config: Option<ConfigSnapshot>,
    pub files: Vec<FileRecord>,
}

impl StatusReport {
    /// Read the ledger at `path`. `None` when the date has never been run.
    pub fn load(date: &str, path: &Path) -> AppResult<Option<Self>> {
        let Some(contents) = read_ledger(path)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            date: date.to_string(),
            config: contents.config,
            files: contents.files,
        }))
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_config(&mut out);

        let _ = writeln!(
            out,
            "{:<50} {:<11} {:<11} {:<15} {}\n",
            "Filename", "DM trials", "Candidates", "Folding Status", "Archiving Status"
        );
        for record in &self.files {
            let _ = writeln!(
                out,
                "{:<50} {:<11} {:<11} {:<15} {}",
                record.fname.as_deref().unwrap_or("-"),
                counter(record.proc_dm_trials),
                counter(record.num_candidates),
                folding_status(record),
                archiving_status(record),
            );
        }
        let _ = writeln!(out, "\nFiles processed: {}", self.files.len());
        out
    }

    fn render_config(&self, out: &mut String) {
        let _ = writeln!(out, "Pipeline status for {}", self.date);
        let _ = writeln!(out, "------------------------------");
        let Some(snapshot) = &self.config else {
            let _ = writeln!(out, "No configuration recorded.\n");
            return;
        };
        let field = |key: &str| match snapshot.config.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        };
        let _ = writeln!(out, "Run started: {}", snapshot.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(out, "Backend: {}", field("backend"));
        let _ = writeln!(out, "Node(s): {}", field("nodes"));
        let _ = writeln!(out, "Machine configuration: {}", field("mach_config"));
        let _ = writeln!(out, "Dates to be analysed: {}", field("dates"));
        let _ = writeln!(out, "Number of cores per node: {}\n", field("cores"));
    }
}

fn counter(value: Option<u64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ffa_storage::Ledger;
    use serde_json::json;

    fn record(cands: Option<u64>, fold: Option<u64>, arv: Option<u64>) -> FileRecord {
        let mut r = FileRecord::new("obs.fil");
        r.proc_dm_trials = Some(100);
        r.num_candidates = cands;
        r.num_fold_prfs = fold;
        r.num_arv_prfs = arv;
        r
    }

    #[test]
    fn test_stage_status() {
        let r = record(Some(12), Some(12), Some(5));
        assert_eq!(folding_status(&r), StageStatus::Done);
        assert_eq!(archiving_status(&r), StageStatus::Incomplete);

        let r = record(Some(12), None, None);
        assert_eq!(folding_status(&r), StageStatus::NotDone);
        assert_eq!(archiving_status(&r), StageStatus::NotDone);

        let r = record(Some(12), Some(0), Some(0));
        assert_eq!(folding_status(&r), StageStatus::NotDone);

        let r = record(None, Some(3), Some(3));
        assert_eq!(folding_status(&r), StageStatus::Incomplete);
        assert_eq!(archiving_status(&r), StageStatus::Done);
    }

    #[test]
    fn test_render_from_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d1.history.jsonl");
        let mut ledger = Ledger::open(&path, None, || {
            ConfigSnapshot::new(json!({"backend": "GWB", "nodes": ["n1"], "cores": 4}))
        })
        .unwrap();
        ledger.append(record(Some(7), Some(7), None)).unwrap();

        let report = StatusReport::load("d1", &path).unwrap().unwrap();
        let text = report.render();
        assert!(text.contains("Backend: GWB"));
        assert!(text.contains("Number of cores per node: 4"));
        let row = text.lines().find(|l| l.starts_with("obs.fil")).unwrap();
        assert!(row.contains("Done."));
        assert!(row.trim_end().ends_with("Not Done."));
        assert!(text.contains("Files processed: 1"));
    }

    #[test]
    fn test_missing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StatusReport::load("d1", &dir.path().join("none.jsonl"))
            .unwrap()
            .is_none());
    }
}
