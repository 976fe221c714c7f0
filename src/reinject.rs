//! Reinject registry.
//!
//! Lab staff list re-run reactions in worksheets dropped into one or more
//! reinject directories. Only worksheets modified within the configured window
//! and associated with today's run ids are read. Sheets are either
//! tab-delimited text (`.txt`, `.tsv`) or workbooks (`.xlsx`, `.xls`, `.ods`,
//! first worksheet only). Each sheet carries sample names in a fixed row range
//! of one column (rows 6 to 101, column 2 by default). Rows are counted as
//! lines in the file or worksheet, blank ones included.
//!
//! Loading is best-effort: a sheet that cannot be read is recorded in the
//! [`ReinjectLoadReport`] and skipped, and the registry holds whatever did load.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use calamine::{open_workbook_auto, Reader};
use chrono::{DateTime, Duration, Local};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::IntakeConfig;
use crate::naming::NameNormalizer;

/// A sample flagged as re-run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReinjectRecord {
    pub raw_name: String,
    pub normalized: String,
    /// Scheduled replacement: lands in the main slot instead of Alternate Injections.
    pub preemptive: bool,
}

/// What happened while loading worksheets.
#[derive(Clone, Debug, Default)]
pub struct ReinjectLoadReport {
    pub worksheets_read: Vec<PathBuf>,
    /// Sheets that failed to parse, with the reason.
    pub worksheets_failed: Vec<(PathBuf, String)>,
    /// Sheets in the window that were ignored (wrong format or unrelated run).
    pub worksheets_ignored: Vec<PathBuf>,
    pub records: usize,
}

/// Normalized sample name → reinject record.
#[derive(Clone, Debug, Default)]
pub struct ReinjectRegistry {
    records: HashMap<String, ReinjectRecord>,
}

impl ReinjectRegistry {
    /// An empty registry; nothing is treated as a reinject.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-parsed raw names.
    pub fn from_raw_names<I, S>(names: I, marker: &str, normalizer: &NameNormalizer) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut reg = Self::default();
        for n in names {
            reg.insert(n.as_ref(), marker, normalizer);
        }
        reg
    }

    /// Scan the configured reinject directories.
    ///
    /// `run_ids` restricts the scan to worksheets whose file name mentions one of
    /// them; an empty slice accepts every worksheet in the window.
    pub fn load(config: &IntakeConfig, run_ids: &[String], normalizer: &NameNormalizer) -> (Self, ReinjectLoadReport) {
        let cutoff: DateTime<Local> = Local::now() - Duration::days(i64::from(config.reinject_window_days));
        let mut reg = Self::default();
        let mut report = ReinjectLoadReport::default();

        for dir in &config.reinject_dirs {
            if !dir.is_dir() {
                warn!("Reinject folder {} does not exist, skipping", dir.display());
                continue;
            }
            for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("Could not list reinject folder {}: {}", dir.display(), e);
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();

                let modified = entry.metadata().ok().and_then(|m| m.modified().ok()).unwrap_or(SystemTime::UNIX_EPOCH);
                if DateTime::<Local>::from(modified) < cutoff {
                    continue;
                }
                if !run_ids.is_empty() && !run_ids.iter().any(|id| name.contains(id.as_str())) {
                    report.worksheets_ignored.push(path.to_path_buf());
                    continue;
                }
                let Some(format) = SheetFormat::of(&name) else {
                    debug!("Ignoring {}: not a worksheet", path.display());
                    report.worksheets_ignored.push(path.to_path_buf());
                    continue;
                };
                match read_sheet(path, format, config) {
                    Ok(names) => {
                        debug!("Read {} reinject names from {}", names.len(), path.display());
                        for n in &names {
                            reg.insert(n, &config.preemptive_marker, normalizer);
                        }
                        report.worksheets_read.push(path.to_path_buf());
                    }
                    Err(e) => {
                        warn!("Skipping reinject worksheet {}: {}", path.display(), e);
                        report.worksheets_failed.push((path.to_path_buf(), e.to_string()));
                    }
                }
            }
        }
        report.records = reg.len();
        info!(
            "Loaded {} reinject records from {} worksheets ({} failed)",
            report.records,
            report.worksheets_read.len(),
            report.worksheets_failed.len()
        );
        (reg, report)
    }

    fn insert(&mut self, raw: &str, marker: &str, normalizer: &NameNormalizer) {
        let raw = raw.trim();
        if raw.is_empty() {
            return;
        }
        let preemptive = !marker.is_empty() && raw.to_lowercase().contains(&marker.to_lowercase());
        let normalized = normalizer.normalize(raw, true);
        if normalized.is_empty() {
            return;
        }
        let rec = ReinjectRecord { raw_name: raw.to_string(), normalized: normalized.clone(), preemptive };
        match self.records.get(&normalized) {
            // A plain reinject listed anywhere outranks a preemptive listing of the same sample.
            Some(existing) if !existing.preemptive => {}
            _ => {
                self.records.insert(normalized, rec);
            }
        }
    }

    /// Record for a normalized name.
    pub fn get(&self, normalized: &str) -> Option<&ReinjectRecord> {
        self.records.get(normalized)
    }

    /// `true` if the file must go to Alternate Injections (known, non-preemptive reinject).
    pub fn is_diverting(&self, normalized: &str) -> bool {
        self.get(normalized).is_some_and(|r| !r.preemptive)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SheetFormat {
    Text,
    Workbook,
}

impl SheetFormat {
    fn of(name: &str) -> Option<Self> {
        let l = name.to_ascii_lowercase();
        if l.ends_with(".txt") || l.ends_with(".tsv") {
            Some(Self::Text)
        } else if [".xlsx", ".xlsm", ".xls", ".ods"].iter().any(|ext| l.ends_with(ext)) {
            Some(Self::Workbook)
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
enum SheetError {
    #[error(transparent)]
    Text(#[from] csv::Error),
    #[error(transparent)]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
}

fn read_sheet(path: &Path, format: SheetFormat, config: &IntakeConfig) -> Result<Vec<String>, SheetError> {
    match format {
        SheetFormat::Text => read_text_sheet(path, config),
        SheetFormat::Workbook => read_workbook(path, config),
    }
}

fn read_text_sheet(path: &Path, config: &IntakeConfig) -> Result<Vec<String>, SheetError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;
    let col = config.reinject_name_column - 1;
    let last = config.reinject_last_row as u64;
    let mut names = Vec::new();
    for rec in rdr.records() {
        // Empty lines yield no record; the file line keeps the row window anchored.
        let rec = match rec {
            Ok(r) => r,
            Err(e) if e.position().is_some_and(|p| p.line() > last) => break,
            Err(e) => return Err(e.into()),
        };
        let row = rec.position().map_or(0, |p| p.line());
        if row > last {
            break;
        }
        if row < config.reinject_first_row as u64 {
            continue;
        }
        if let Some(v) = rec.get(col) {
            push_name(&mut names, v);
        }
    }
    Ok(names)
}

fn read_workbook(path: &Path, config: &IntakeConfig) -> Result<Vec<String>, SheetError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or(SheetError::NoWorksheet)??;
    let col = (config.reinject_name_column - 1) as u32;
    let mut names = Vec::new();
    for row in config.reinject_first_row..=config.reinject_last_row {
        // Absolute cell positions, so leading blank rows do not shift the window.
        if let Some(cell) = range.get_value(((row - 1) as u32, col)) {
            push_name(&mut names, &cell.to_string());
        }
    }
    Ok(names)
}

fn push_name(names: &mut Vec<String>, value: &str) {
    let v = value.trim();
    if !v.is_empty() {
        names.push(v.to_string());
    }
}
