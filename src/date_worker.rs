//! Per-date processing and multi-date orchestration.
//!
//! # Directory layout
//!
//! ```text
//! <store>/<date>/*.raw | *.fil          inputs
//! <state>/<date>/<date>.history.jsonl   completion ledger
//! <state>/<date>/filelist               processed file names
//! <state>/<date>/<stem>/                dedispersed time series
//! <state>/<date>/<stem>/candidates/     search products
//! <state>/<date>/<stem>/folded_profiles/
//! <state>/<date>/<stem>/archived_profiles/
//! <RFI>/<date>/                         RFI masks
//! ```
//!
//! A [`DateWorker`] resumes the date's ledger, skips every file already
//! recorded there and hands the rest to a [`FileProcessor`] one at a time. A
//! file is recorded only after its processing succeeded, so an interrupted or
//! failed file is picked up again by the next run.

use ffa_search::{PeriodicitySearch, PipelineManager};
use ffa_storage::{ConfigSnapshot, FileRecord, Ledger};
use rayon::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Span};

use crate::config::{Backend, PipelineConfig, SearchSetup};
use crate::error::{AppError, AppResult};

pub const FILELIST_NAME: &str = "filelist";
pub const CANDIDATES_DIR: &str = "candidates";
pub const FOLDED_PROFILES_DIR: &str = "folded_profiles";
pub const ARCHIVED_PROFILES_DIR: &str = "archived_profiles";

/// Ledger file of `date` inside its state directory.
pub fn ledger_path(state_dir: &Path, date: &str) -> PathBuf {
    state_dir.join(format!("{date}.history.jsonl"))
}

/// Kind of input a date was recorded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Raw voltage-beam dumps, converted to filterbank before dedispersion
    Raw,
    Filterbank,
}

impl InputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            InputKind::Raw => "raw",
            InputKind::Filterbank => "fil",
        }
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

fn list_with_extension(dir: &Path, ext: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, ext) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Find the inputs of one date directory, sorted by name.
///
/// Raw files take precedence over filterbank files. Returns `None` when the
/// directory is absent or holds neither.
pub fn discover_inputs(date_dir: &Path) -> AppResult<Option<(InputKind, Vec<PathBuf>)>> {
    if !date_dir.is_dir() {
        warn!(dir = %date_dir.display(), "Date directory does not exist");
        return Ok(None);
    }
    for kind in [InputKind::Raw, InputKind::Filterbank] {
        let paths = list_with_extension(date_dir, kind.extension())?;
        if !paths.is_empty() {
            return Ok(Some((kind, paths)));
        }
    }
    Ok(None)
}

/// Number of files with extension `ext` in `dir`, or `None` if `dir` does
/// not exist.
pub fn count_files(dir: &Path, ext: &str) -> Option<u64> {
    let entries = fs::read_dir(dir).ok()?;
    let count = entries
        .filter_map(|e| e.ok())
        .filter(|e| has_extension(&e.path(), ext))
        .count();
    Some(count as u64)
}

/// Working directories of one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDirs {
    pub timeseries: PathBuf,
    pub candidates: PathBuf,
    pub folded_profiles: PathBuf,
    pub archived_profiles: PathBuf,
}

impl FileDirs {
    pub fn new(state_dir: &Path, stem: &str) -> Self {
        let timeseries = state_dir.join(stem);
        Self {
            candidates: timeseries.join(CANDIDATES_DIR),
            folded_profiles: timeseries.join(FOLDED_PROFILES_DIR),
            archived_profiles: timeseries.join(ARCHIVED_PROFILES_DIR),
            timeseries,
        }
    }

    /// Create the time-series and candidate directories. Profile directories
    /// belong to the folding stage and are left alone.
    pub fn create(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.timeseries)?;
        fs::create_dir_all(&self.candidates)
    }
}

/// One input file of a date.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// File name, the ledger key
    pub name: String,
    pub path: PathBuf,
    pub kind: InputKind,
    /// RFI directory of the date
    pub rfi_dir: PathBuf,
    pub dirs: FileDirs,
}

impl InputFile {
    fn new(path: PathBuf, kind: InputKind, state_dir: &Path, rfi_dir: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        Self {
            dirs: FileDirs::new(state_dir, &stem),
            rfi_dir: rfi_dir.to_path_buf(),
            name,
            path,
            kind,
        }
    }
}

/// Produces the dedispersed time series of one input file in
/// `input.dirs.timeseries`.
pub trait Dedisperser: Send + Sync {
    fn dedisperse(&self, input: &InputFile) -> AppResult<()>;
}

/// Time series were produced beforehand; nothing to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct Precomputed;

impl Dedisperser for Precomputed {
    fn dedisperse(&self, input: &InputFile) -> AppResult<()> {
        tracing::debug!(dir = %input.dirs.timeseries.display(), "Using precomputed time series");
        Ok(())
    }
}

/// All the work done on one input file.
///
/// Returns the record to append to the date's ledger. An `Err` leaves the
/// file unrecorded.
pub trait FileProcessor: Send + Sync {
    fn process(&self, input: &InputFile) -> AppResult<FileRecord>;
}

/// Dedisperse, then run the search pipeline over the file's time series.
pub struct SearchFileProcessor {
    setup: SearchSetup,
    dedisperser: Box<dyn Dedisperser>,
    capability: Option<Arc<dyn PeriodicitySearch>>,
}

impl SearchFileProcessor {
    pub fn new(setup: SearchSetup) -> Self {
        Self {
            setup,
            dedisperser: Box::new(Precomputed),
            capability: None,
        }
    }

    pub fn with_dedisperser(mut self, dedisperser: Box<dyn Dedisperser>) -> Self {
        self.dedisperser = dedisperser;
        self
    }

    /// Replace the default periodicity search of every run.
    pub fn with_capability(mut self, capability: Arc<dyn PeriodicitySearch>) -> Self {
        self.capability = Some(capability);
        self
    }
}

impl FileProcessor for SearchFileProcessor {
    fn process(&self, input: &InputFile) -> AppResult<FileRecord> {
        let dirs = &input.dirs;
        let mut record = FileRecord::new(&input.name);

        self.dedisperser.dedisperse(input)?;
        let ext = self.setup.manager.data_format.header_extension();
        record.proc_dm_trials = count_files(&dirs.timeseries, ext);
        info!(dm_trials = ?record.proc_dm_trials, "Dedispersion done");

        let mut manager_config = self.setup.manager.clone();
        manager_config.glob = dirs
            .timeseries
            .join(format!("*.{ext}"))
            .to_string_lossy()
            .into_owned();
        manager_config.outdir = dirs.candidates.clone();

        let mut manager = PipelineManager::new(manager_config, self.setup.searches.clone())?;
        if let Some(capability) = &self.capability {
            manager = manager.with_capability(Arc::clone(capability));
        }
        // Products of an earlier failed attempt must not mix with this run.
        if dirs.candidates.exists() {
            fs::remove_dir_all(&dirs.candidates)?;
        }
        fs::create_dir_all(&dirs.candidates)?;
        let summary = manager.run()?;

        record.num_candidates = Some(summary.candidate_paths.len() as u64);
        record.num_fold_prfs = count_files(&dirs.folded_profiles, "pfd");
        record.num_arv_prfs = count_files(&dirs.archived_profiles, "archive");
        info!(candidates = ?record.num_candidates, "FFA search done");
        Ok(record)
    }
}

/// Outcome of one date.
#[derive(Debug, Clone, Default)]
pub struct DateReport {
    pub date: String,
    pub kind: Option<InputKind>,
    /// Files processed and recorded by this run
    pub processed: Vec<String>,
    /// Files already recorded by an earlier run
    pub skipped: usize,
    /// Files that failed, with the reason; retried on the next run
    pub failed: Vec<(String, String)>,
    pub elapsed: Duration,
}

/// Processes the pending files of one observing date.
pub struct DateWorker<'a> {
    date: String,
    store_dir: PathBuf,
    state_dir: PathBuf,
    rfi_dir: PathBuf,
    snapshot: Value,
    processor: &'a dyn FileProcessor,
    span: Span,
}

impl<'a> DateWorker<'a> {
    pub fn new(
        config: &PipelineConfig,
        backend: Backend,
        date: &str,
        processor: &'a dyn FileProcessor,
    ) -> Self {
        let mut snapshot = config.snapshot(backend);
        if let Value::Object(map) = &mut snapshot {
            map.insert("date".into(), Value::String(date.to_string()));
        }
        Self {
            date: date.to_string(),
            store_dir: config.store_path().join(date),
            state_dir: config.state_path().join(date),
            rfi_dir: config.rfi_path().join(date),
            snapshot,
            processor,
            span: info_span!("date", date = %date),
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn ledger_path(&self) -> PathBuf {
        ledger_path(&self.state_dir, &self.date)
    }

    pub fn run(&self) -> AppResult<DateReport> {
        let _guard = self.span.enter();
        let start = Instant::now();
        let mut report = DateReport {
            date: self.date.clone(),
            ..Default::default()
        };

        fs::create_dir_all(&self.state_dir)?;
        fs::create_dir_all(&self.rfi_dir)?;

        let Some((kind, inputs)) = discover_inputs(&self.store_dir)? else {
            info!(dir = %self.store_dir.display(), "No raw or filterbank files found, nothing to process");
            return Ok(report);
        };
        report.kind = Some(kind);
        info!(count = inputs.len(), kind = kind.extension(), "Found input files");

        let mut ledger = Ledger::open(
            self.ledger_path(),
            Some(self.state_dir.join(FILELIST_NAME)),
            || ConfigSnapshot::new(self.snapshot.clone()),
        )?;

        let inputs: Vec<InputFile> = inputs
            .into_iter()
            .map(|path| InputFile::new(path, kind, &self.state_dir, &self.rfi_dir))
            .collect();
        let pending: Vec<&InputFile> = inputs
            .iter()
            .filter(|input| !ledger.is_processed(&input.name))
            .collect();
        report.skipped = inputs.len() - pending.len();
        if report.skipped > 0 {
            info!(skipped = report.skipped, "Skipping files processed by an earlier run");
        }

        for input in pending {
            let file_span = info_span!("file", fname = %input.name);
            let _file_guard = file_span.enter();
            let file_start = Instant::now();
            info!("Start processing");

            let result = input
                .dirs
                .create()
                .map_err(AppError::from)
                .and_then(|()| self.processor.process(input));
            match result {
                Ok(mut record) => {
                    record.fname = Some(input.name.clone());
                    ledger.append(record)?;
                    report.processed.push(input.name.clone());
                    info!(elapsed_s = file_start.elapsed().as_secs_f64(), "Done processing");
                }
                Err(e) if e.is_fatal() => {
                    error!(reason = %e, "Fatal error, aborting date");
                    return Err(e);
                }
                Err(e) => {
                    error!(reason = %e, "Failed to process file, it will be retried on the next run");
                    report.failed.push((input.name.clone(), e.to_string()));
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            elapsed_s = report.elapsed.as_secs_f64(),
            "Date complete"
        );
        Ok(report)
    }
}

/// Run every analysis date of `backend` in parallel, one task per date.
///
/// Each date gets its own result: a fatal error in one date does not stop the
/// others.
pub fn run_dates(
    config: &PipelineConfig,
    backend: Backend,
    processor: &dyn FileProcessor,
) -> AppResult<Vec<(String, AppResult<DateReport>)>> {
    let dates = config.analysis_dates(backend)?;
    fs::create_dir_all(config.rfi_path())?;
    fs::create_dir_all(config.state_path())?;
    info!(
        backend = %backend,
        nodes = ?config.nodes(),
        mach_config = %config.mach_config(),
        ?dates,
        "Starting analysis"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(dates.len())
        .thread_name(|i| format!("ffa-date-{i}"))
        .build()
        .map_err(|e| AppError::Configuration(format!("cannot start date pool: {e}")))?;

    let results: Vec<(String, AppResult<DateReport>)> = pool.install(|| {
        dates
            .par_iter()
            .map(|date| {
                let worker = DateWorker::new(config, backend, date, processor);
                (date.clone(), worker.run())
            })
            .collect()
    });
    Ok(results)
}
