//! Run-folder discovery, canonicalisation and post-sort cleanup.
//!
//! Instrument exports arrive under names like `2024-05-01_RunFolder-20000_1`.
//! Before sorting, such a folder is renamed to `RunFolder-20000` when that
//! name is free; otherwise it is sorted in place and its leftovers are merged
//! into the canonical folder afterwards.
//!
//! Cleanup never force-deletes: only empty folders are removed, and anything
//! that could not be moved is counted in the [`CleanupReport`].

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::data::folders;
use crate::error::Result;
use crate::fsops::FsOps;
use crate::naming;
use crate::readiness::FolderKind;
use crate::resolve::run_folder_path;

static RUN_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)runfolder-(\d+)").expect("static regex"));

/// A run folder found under the data folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunFolder {
    pub path: PathBuf,
    pub run_id: String,
    /// `<data>/RunFolder-{run_id}`.
    pub canonical: PathBuf,
    /// Original path when canonicalisation renamed the folder.
    pub renamed_from: Option<PathBuf>,
}

impl RunFolder {
    pub fn is_canonical(&self) -> bool {
        self.path == self.canonical
    }
}

/// Outcome of cleaning one run folder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub run_folder: PathBuf,
    pub deleted: Vec<PathBuf>,
    /// Items moved into the canonical run folder.
    pub relocated: usize,
    /// Items left behind in the run folder.
    pub retained: usize,
    pub failures: Vec<(PathBuf, String)>,
    /// `.ab1` files still sitting in the run folder.
    pub unresolved_ab1: usize,
    /// The run folder itself was removed.
    pub removed: bool,
    pub renamed_to: Option<PathBuf>,
}

/// Run id embedded in a folder name, unless the folder is an order folder or a reinject folder.
pub fn run_id_of(name: &str) -> Option<String> {
    let is_order = matches!(FolderKind::parse(name), Some(FolderKind::Order { .. }));
    if is_order || name.to_lowercase().contains("reinject") {
        return None;
    }
    RUN_ID.captures(name).map(|c| c[1].to_string())
}

/// Run folders directly under `data_folder`, canonical ones first, then by name.
pub fn discover_run_folders(data_folder: &Path, fs: &mut FsOps) -> Result<Vec<RunFolder>> {
    let mut out: Vec<RunFolder> = fs
        .subdirs(data_folder)?
        .into_iter()
        .filter_map(|name| {
            let run_id = run_id_of(&name)?;
            Some(RunFolder {
                path: data_folder.join(&name),
                canonical: run_folder_path(data_folder, &run_id),
                run_id,
                renamed_from: None,
            })
        })
        .collect();
    out.sort_by(|a, b| b.is_canonical().cmp(&a.is_canonical()).then_with(|| a.path.cmp(&b.path)));
    Ok(out)
}

/// Rename `run` to its canonical name when that name is free.
pub fn canonicalize(run: RunFolder, fs: &mut FsOps) -> Result<RunFolder> {
    if run.is_canonical() {
        return Ok(run);
    }
    if fs.exists(&run.canonical) {
        debug!(
            "{} exists; sorting {} in place and merging afterwards",
            run.canonical.display(),
            run.path.display()
        );
        return Ok(run);
    }
    fs.rename(&run.path, &run.canonical)?;
    info!("Renamed {} to {}", run.path.display(), run.canonical.display());
    Ok(RunFolder { renamed_from: Some(run.path), path: run.canonical.clone(), ..run })
}

/// Clean a run folder after sorting.
///
/// Well-known subfolders of a non-canonical run folder are merged into the
/// canonical one and removed once empty. The run folder itself is removed only
/// when nothing at all is left in it, canonical or not.
pub fn cleanup(run: &RunFolder, fs: &mut FsOps) -> CleanupReport {
    let mut report = CleanupReport {
        run_folder: run.path.clone(),
        renamed_to: run.renamed_from.as_ref().map(|_| run.path.clone()),
        ..Default::default()
    };

    if !run.is_canonical() {
        for sub in folders::WELL_KNOWN_SUBFOLDERS {
            let src = run.path.join(sub);
            if fs.exists(&src) {
                merge_dir(&src, &run.canonical.join(sub), fs, &mut report);
            }
        }
    }

    let entries = match fs.list(&run.path) {
        Ok(e) => e.to_vec(),
        Err(e) => {
            report.failures.push((run.path.clone(), e.to_string()));
            return report;
        }
    };
    report.unresolved_ab1 = entries.iter().filter(|e| !e.is_dir && naming::is_ab1(&e.name)).count();

    if entries.is_empty() {
        match fs.remove_empty_dir(&run.path) {
            Ok(()) => {
                info!("Removed emptied run folder {}", run.path.display());
                report.deleted.push(run.path.clone());
                report.removed = true;
            }
            Err(e) => report.failures.push((run.path.clone(), e.to_string())),
        }
    } else if !run.is_canonical() {
        report.retained = entries.len();
    } else {
        // Order folders and well-known subfolders belong here; only stray reactions count as retained.
        report.retained = report.unresolved_ab1;
    }

    if report.unresolved_ab1 > 0 {
        warn!("{} unresolved .ab1 file(s) left in {}", report.unresolved_ab1, run.path.display());
    }
    report
}

/// Move everything from `src` into `dst`, then remove `src` if it ended up empty.
fn merge_dir(src: &Path, dst: &Path, fs: &mut FsOps, report: &mut CleanupReport) {
    if !fs.exists(dst) {
        if let Some(parent) = dst.parent() {
            if let Err(e) = fs.ensure_dir(parent) {
                report.failures.push((dst.to_path_buf(), e.to_string()));
                return;
            }
        }
        match fs.rename(src, dst) {
            Ok(()) => {
                debug!("Moved {} to {}", src.display(), dst.display());
                report.relocated += 1;
            }
            Err(e) => report.failures.push((src.to_path_buf(), e.to_string())),
        }
        return;
    }

    let names: Vec<String> = match fs.list(src) {
        Ok(e) => e.iter().map(|e| e.name.clone()).collect(),
        Err(e) => {
            report.failures.push((src.to_path_buf(), e.to_string()));
            return;
        }
    };
    for name in names {
        let from = src.join(&name);
        let to = dst.join(&name);
        if fs.exists(&to) {
            debug!("{} already present in {}, leaving it", name, dst.display());
            continue;
        }
        match fs.rename(&from, &to) {
            Ok(()) => report.relocated += 1,
            Err(e) => report.failures.push((from, e.to_string())),
        }
    }
    match fs.list(src).map(|e| e.is_empty()) {
        Ok(true) => match fs.remove_empty_dir(src) {
            Ok(()) => report.deleted.push(src.to_path_buf()),
            Err(e) => report.failures.push((src.to_path_buf(), e.to_string())),
        },
        Ok(false) => {}
        Err(e) => report.failures.push((src.to_path_buf(), e.to_string())),
    }
}
