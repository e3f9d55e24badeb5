//! Completion ledger - append-only record of fully processed input files.
//!
//! The ledger is a JSON-lines document log, one per observation date:
//!
//! ```text
//! {"type":"config", ...}     (1, configuration snapshot of the first run)
//! {"type":"file", ...}       (N, one per completed input file, in order)
//! ```
//!
//! A file listed in the ledger is never processed again. A file that failed
//! never gets a record and is therefore retried by the next run. Records are
//! appended only after all of a file's products are on disk, and each append
//! is synced before returning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn, Span};

use crate::error::{StorageError, StorageResult};

/// Configuration snapshot written as the first ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub started_at: DateTime<Utc>,
    pub config: Value,
}

impl ConfigSnapshot {
    pub fn new(config: Value) -> Self {
        Self {
            started_at: Utc::now(),
            config,
        }
    }
}

/// Outcome counters of one processed input file.
///
/// Counters that were not measured stay `None`; they are never reported as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub fname: Option<String>,
    /// Number of DM trials processed.
    pub proc_dm_trials: Option<u64>,
    /// Number of candidates generated.
    pub num_candidates: Option<u64>,
    /// Number of folded profiles made.
    pub num_fold_prfs: Option<u64>,
    /// Number of folded profiles archived.
    pub num_arv_prfs: Option<u64>,
}

const COUNTER_KEYS: [&str; 4] = [
    "proc_dm_trials",
    "num_candidates",
    "num_fold_prfs",
    "num_arv_prfs",
];

fn json_type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
    .to_string()
}

impl FileRecord {
    pub fn new(fname: impl Into<String>) -> Self {
        Self {
            fname: Some(fname.into()),
            ..Default::default()
        }
    }

    /// Validate a decoded record.
    ///
    /// Absent and `null` fields become `None`. A present field of the wrong
    /// type is a [`StorageError::LedgerField`] naming the line and key.
    pub fn from_json(map: &Map<String, Value>, line: usize) -> StorageResult<Self> {
        let fname = match map.get("fname") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(StorageError::LedgerField {
                    line,
                    key: "fname".into(),
                    expected: "str",
                    found: json_type_name(other),
                })
            }
        };

        let mut counters = [None; 4];
        for (slot, key) in counters.iter_mut().zip(COUNTER_KEYS) {
            *slot = match map.get(key) {
                None | Some(Value::Null) => None,
                Some(value) => Some(value.as_u64().ok_or_else(|| StorageError::LedgerField {
                    line,
                    key: key.into(),
                    expected: "int",
                    found: json_type_name(value),
                })?),
            };
        }
        let [proc_dm_trials, num_candidates, num_fold_prfs, num_arv_prfs] = counters;

        Ok(Self {
            fname,
            proc_dm_trials,
            num_candidates,
            num_fold_prfs,
            num_arv_prfs,
        })
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerRecord {
    Config(ConfigSnapshot),
    File(FileRecord),
}

impl LedgerRecord {
    fn from_line(text: &str, line: usize) -> StorageResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| StorageError::LedgerCorrupt {
            line,
            reason: e.to_string(),
        })?;
        let Value::Object(map) = value else {
            return Err(StorageError::LedgerCorrupt {
                line,
                reason: "record is not a JSON object".into(),
            });
        };
        match map.get("type").and_then(Value::as_str) {
            Some("file") => Ok(LedgerRecord::File(FileRecord::from_json(&map, line)?)),
            Some("config") => serde_json::from_value(Value::Object(map))
                .map(LedgerRecord::Config)
                .map_err(|e| StorageError::LedgerCorrupt {
                    line,
                    reason: format!("invalid configuration snapshot: {e}"),
                }),
            other => Err(StorageError::LedgerCorrupt {
                line,
                reason: format!("unknown record type {other:?}"),
            }),
        }
    }
}

/// Records recovered from an existing ledger file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerContents {
    pub config: Option<ConfigSnapshot>,
    pub files: Vec<FileRecord>,
    /// Byte length of the valid prefix; anything after it is a torn write.
    valid_len: u64,
    torn_tail: bool,
}

impl LedgerContents {
    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.files.is_empty()
    }

    pub fn processed_names(&self) -> HashSet<&str> {
        self.files.iter().filter_map(|r| r.fname.as_deref()).collect()
    }
}

/// Read a ledger file.
///
/// Returns `Ok(None)` when the file is absent or cannot be read. A record
/// with malformed fields, or unparseable JSON on any line but the last, is an
/// error.
pub fn read_ledger(path: &Path) -> StorageResult<Option<LedgerContents>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Ledger exists but cannot be opened");
            }
            return Ok(None);
        }
    };

    let mut lines = Vec::new();
    let mut reader = BufReader::new(file);
    let mut offset = 0u64;
    loop {
        let mut buf = String::new();
        match reader.read_line(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                lines.push((offset, buf));
                offset += n as u64;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ledger cannot be read");
                return Ok(None);
            }
        }
    }

    let mut contents = LedgerContents::default();
    let last = lines.len().saturating_sub(1);
    for (index, (start, text)) in lines.iter().enumerate() {
        let line = index + 1;
        let complete = text.ends_with('\n');
        let trimmed = text.trim();
        if trimmed.is_empty() {
            contents.valid_len = start + text.len() as u64;
            continue;
        }
        let record = match LedgerRecord::from_line(trimmed, line) {
            Ok(record) if complete => record,
            Ok(_) | Err(StorageError::LedgerCorrupt { .. }) if index == last => {
                warn!(path = %path.display(), line, "Ignoring torn final ledger record");
                contents.torn_tail = true;
                break;
            }
            Ok(record) => record,
            Err(e) => return Err(e),
        };
        match record {
            LedgerRecord::Config(snapshot) => {
                if index != 0 || contents.config.is_some() {
                    warn!(line, "Configuration snapshot is not the first ledger record");
                }
                contents.config.get_or_insert(snapshot);
            }
            LedgerRecord::File(rec) => {
                if rec.fname.is_none() {
                    warn!(line, "Ledger record without a file name");
                }
                contents.files.push(rec);
            }
        }
        contents.valid_len = start + text.len() as u64;
    }
    Ok(Some(contents))
}

/// Handle on one date's ledger, open for appending.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    filelist: Option<PathBuf>,
    contents: LedgerContents,
    resumed: bool,
    span: Span,
}

impl Ledger {
    /// Resume the ledger at `path`, or start a fresh one.
    ///
    /// When no usable ledger exists, a new file is created and `snapshot` is
    /// written as its first record. An unreadable ledger is moved aside to
    /// `<path>.unreadable` first. `filelist`, when given, receives one
    /// processed file name per line.
    pub fn open(
        path: impl Into<PathBuf>,
        filelist: Option<PathBuf>,
        snapshot: impl FnOnce() -> ConfigSnapshot,
    ) -> StorageResult<Self> {
        let path = path.into();
        let span = info_span!("ledger", path = %path.display());
        let _guard = span.enter();

        let existing = read_ledger(&path)?;
        let (contents, resumed) = match existing {
            Some(contents) if !contents.is_empty() => {
                if contents.torn_tail {
                    // Drop the partial record so the next append starts on a clean line.
                    let file = OpenOptions::new().write(true).open(&path)?;
                    file.set_len(contents.valid_len)?;
                    file.sync_all()?;
                }
                info!(
                    processed = contents.files.len(),
                    "Pipeline has run before, restoring previous state"
                );
                (contents, true)
            }
            other => {
                if other.is_none() && path.exists() {
                    let aside = path.with_extension("unreadable");
                    warn!(aside = %aside.display(), "Moving unreadable ledger aside");
                    fs::rename(&path, &aside)?;
                }
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let snapshot = snapshot();
                let mut file = File::create(&path)?;
                write_line(&mut file, &LedgerRecord::Config(snapshot.clone()))?;
                info!("Running from scratch, initialised a fresh ledger");
                let contents = LedgerContents {
                    config: Some(snapshot),
                    ..Default::default()
                };
                (contents, false)
            }
        };
        drop(_guard);

        Ok(Self {
            path,
            filelist,
            contents,
            resumed,
            span,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether an earlier run's ledger was restored.
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn config(&self) -> Option<&ConfigSnapshot> {
        self.contents.config.as_ref()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.contents.files
    }

    pub fn is_processed(&self, fname: &str) -> bool {
        self.contents
            .files
            .iter()
            .any(|r| r.fname.as_deref() == Some(fname))
    }

    /// Keep the names that have no ledger record, preserving order.
    pub fn pending<'a, I>(&self, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let done = self.contents.processed_names();
        names.into_iter().filter(|n| !done.contains(n)).collect()
    }

    /// Append one record and sync it to disk.
    pub fn append(&mut self, record: FileRecord) -> StorageResult<()> {
        let _guard = self.span.enter();
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        write_line(&mut file, &LedgerRecord::File(record.clone()))?;

        if let (Some(list), Some(name)) = (&self.filelist, &record.fname) {
            let mut f = OpenOptions::new().create(true).append(true).open(list)?;
            writeln!(f, "{name}")?;
        }
        info!(fname = ?record.fname, "Recorded completed file");
        self.contents.files.push(record);
        Ok(())
    }
}

fn write_line(file: &mut File, record: &LedgerRecord) -> StorageResult<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::new(json!({"backend": "GWB", "cores": 4}))
    }

    #[test]
    fn test_missing_fields_are_unset() {
        let map = json!({"type": "file", "fname": "a.fil", "num_candidates": 3});
        let rec = FileRecord::from_json(map.as_object().unwrap(), 2).unwrap();
        assert_eq!(rec.fname.as_deref(), Some("a.fil"));
        assert_eq!(rec.num_candidates, Some(3));
        assert_eq!(rec.proc_dm_trials, None);
        assert_eq!(rec.num_fold_prfs, None);
        assert_eq!(rec.num_arv_prfs, None);
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let map = json!({"type": "file", "fname": "a.fil", "proc_dm_trials": "many"});
        let err = FileRecord::from_json(map.as_object().unwrap(), 4).unwrap_err();
        assert!(err.is_fatal());
        match err {
            StorageError::LedgerField {
                line, key, found, ..
            } => {
                assert_eq!(line, 4);
                assert_eq!(key, "proc_dm_trials");
                assert_eq!(found, "str");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let map = json!({"type": "file", "fname": 12});
        assert!(FileRecord::from_json(map.as_object().unwrap(), 1).is_err());

        let map = json!({"type": "file", "fname": "b.fil", "num_arv_prfs": -1});
        assert!(FileRecord::from_json(map.as_object().unwrap(), 1).is_err());
    }

    #[test]
    fn test_fresh_ledger_writes_snapshot_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2019-01-01.history.jsonl");
        let ledger = Ledger::open(&path, None, snapshot).unwrap();
        assert!(!ledger.resumed());

        let text = fs::read_to_string(&path).unwrap();
        let first: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["type"], "config");
        assert_eq!(first["config"]["backend"], "GWB");
    }

    #[test]
    fn test_resume_skips_recorded_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let filelist = dir.path().join("filelist");
        {
            let mut ledger = Ledger::open(&path, Some(filelist.clone()), snapshot).unwrap();
            let mut rec = FileRecord::new("A.fil");
            rec.proc_dm_trials = Some(100);
            ledger.append(rec).unwrap();
            ledger.append(FileRecord::new("B.fil")).unwrap();
        }

        let ledger = Ledger::open(&path, None, || panic!("must not reinitialise")).unwrap();
        assert!(ledger.resumed());
        assert!(ledger.is_processed("A.fil"));
        assert_eq!(ledger.pending(["A.fil", "B.fil", "C.fil"]), vec!["C.fil"]);
        assert_eq!(ledger.records()[0].proc_dm_trials, Some(100));
        assert_eq!(ledger.records()[1].proc_dm_trials, None);
        assert_eq!(fs::read_to_string(filelist).unwrap(), "A.fil\nB.fil\n");
    }

    #[test]
    fn test_torn_final_record_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let mut ledger = Ledger::open(&path, None, snapshot).unwrap();
            ledger.append(FileRecord::new("A.fil")).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(br#"{"type":"file","fname":"B.f"#).unwrap();
        drop(f);

        let mut ledger = Ledger::open(&path, None, snapshot).unwrap();
        assert_eq!(ledger.pending(["A.fil", "B.fil"]), vec!["B.fil"]);
        ledger.append(FileRecord::new("B.fil")).unwrap();

        let contents = read_ledger(&path).unwrap().unwrap();
        assert_eq!(contents.files.len(), 2);
        assert!(!contents.torn_tail);
    }

    #[test]
    fn test_corrupt_middle_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        fs::write(
            &path,
            "{\"type\":\"config\",\"started_at\":\"2020-01-01T00:00:00Z\",\"config\":{}}\n\
             not json\n\
             {\"type\":\"file\",\"fname\":\"A.fil\"}\n",
        )
        .unwrap();
        let err = read_ledger(&path).unwrap_err();
        assert!(matches!(err, StorageError::LedgerCorrupt { line: 2, .. }));
    }

    #[test]
    fn test_empty_ledger_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        fs::write(&path, "").unwrap();
        let ledger = Ledger::open(&path, None, snapshot).unwrap();
        assert!(!ledger.resumed());
        assert!(ledger.config().is_some());
    }
}
