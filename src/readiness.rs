//! Order and PCR folder readiness.
//!
//! A folder's state is recomputed from its contents on every pass; nothing is
//! persisted. [`evaluate`] is the pure decision over a [`FolderSnapshot`]:
//!
//! 1. every processing marker present → `Processed`
//! 2. any `.fsa` trace → `NotReady` (fragment analysis, never relocated)
//! 3. any brace-annotated `.ab1` → `NotReady` (manual cleanup first)
//! 4. `.ab1` count equals the order-key count and is non-zero → `ReadyForProcessing`
//! 5. otherwise `NotReady`; count mismatches are parked under `Not Ready`
//!
//! PCR folders carry no key count and are ready once they hold any clean `.ab1`.
//!
//! [`OrderReadinessTracker::sweep`] applies the verdicts: incomplete orders are
//! moved to `<data>/Not Ready`, and parked folders that have become ready (or
//! were processed meanwhile) are moved back under `RunFolder-{run}`.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::IntakeConfig;
use crate::data::{folders, markers};
use crate::error::Result;
use crate::fsops::{Entry, FsOps};
use crate::naming;
use crate::order_key::OrderKeyIndex;
use crate::resolve::run_folder_path;

static ORDER_FOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^runfolder-(\d+)_(.+)_(\d+)$").expect("static regex"));
static RUN_FOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^runfolder-(\d+)$").expect("static regex"));
static PCR_FOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^pcrfolder-(.+)$").expect("static regex"));

/// Processing gate of one folder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReadinessState {
    /// Not assessed yet, or the folder could not be read.
    #[default]
    Unprocessed,
    NotReady,
    ReadyForProcessing,
    Processed,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadinessState::Unprocessed => "unprocessed",
            ReadinessState::NotReady => "not-ready",
            ReadinessState::ReadyForProcessing => "ready",
            ReadinessState::Processed => "processed",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotReadyReason {
    /// `.ab1` names still carrying `{...}` annotations.
    BraceNames(Vec<String>),
    CountMismatch { expected: usize, found: usize },
    /// PCR folder without reactions.
    Empty,
    /// Order number absent from today's key.
    UnknownOrder,
    FragmentAnalysis,
}

impl NotReadyReason {
    /// Only count mismatches are parked under `Not Ready`.
    pub fn parks(&self) -> bool {
        matches!(self, NotReadyReason::CountMismatch { .. })
    }
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::BraceNames(n) => write!(f, "{} brace-annotated file(s)", n.len()),
            NotReadyReason::CountMismatch { expected, found } => write!(f, "{found} of {expected} reactions"),
            NotReadyReason::Empty => f.write_str("no reactions"),
            NotReadyReason::UnknownOrder => f.write_str("order not in key"),
            NotReadyReason::FragmentAnalysis => f.write_str("fragment analysis"),
        }
    }
}

/// What the external worker left behind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HandoffOutcome {
    #[default]
    Pending,
    /// All five text exports present.
    Complete,
    /// Worker ran (markers present) but skipped the exports.
    LowQuality,
}

impl fmt::Display for HandoffOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandoffOutcome::Pending => "pending",
            HandoffOutcome::Complete => "complete",
            HandoffOutcome::LowQuality => "low-quality",
        })
    }
}

/// Contents of a folder, reduced to what the gate needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FolderSnapshot {
    pub ab1_count: usize,
    pub brace_names: Vec<String>,
    pub markers_present: BTreeSet<String>,
    pub markers_expected: usize,
    pub has_fsa: bool,
    /// Output suffixes with at least one file, each file attributed to its first matching suffix.
    pub outputs_present: BTreeSet<String>,
    pub outputs_expected: usize,
}

impl FolderSnapshot {
    pub fn from_entries(entries: &[Entry], config: &IntakeConfig) -> Self {
        let mut s = FolderSnapshot {
            markers_expected: config.processing_markers.len(),
            outputs_expected: config.output_suffixes.len(),
            ..Default::default()
        };
        for e in entries {
            if let Some(m) = config.processing_markers.iter().find(|m| m.eq_ignore_ascii_case(&e.name)) {
                s.markers_present.insert(m.clone());
            }
            if e.is_dir {
                continue;
            }
            let lower = e.name.to_ascii_lowercase();
            if naming::is_ab1(&e.name) {
                s.ab1_count += 1;
                if naming::has_braces(&e.name) {
                    s.brace_names.push(e.name.clone());
                }
            } else if lower.ends_with(markers::FSA_EXTENSION) {
                s.has_fsa = true;
            } else if let Some(suf) = config.output_suffixes.iter().find(|x| lower.ends_with(&x.to_ascii_lowercase())) {
                s.outputs_present.insert(suf.clone());
            }
        }
        s
    }

    pub fn scan(folder: &Path, fs: &mut FsOps, config: &IntakeConfig) -> Result<Self> {
        let entries = fs.list(folder)?;
        Ok(Self::from_entries(entries, config))
    }

    pub fn is_processed(&self) -> bool {
        self.markers_expected > 0 && self.markers_present.len() == self.markers_expected
    }

    pub fn handoff_outcome(&self) -> HandoffOutcome {
        if self.outputs_expected > 0 && self.outputs_present.len() == self.outputs_expected {
            HandoffOutcome::Complete
        } else if self.is_processed() {
            HandoffOutcome::LowQuality
        } else {
            HandoffOutcome::Pending
        }
    }
}

/// State plus the reason when not ready.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub state: ReadinessState,
    pub reason: Option<NotReadyReason>,
}

impl Verdict {
    fn ready() -> Self {
        Verdict { state: ReadinessState::ReadyForProcessing, reason: None }
    }

    fn not_ready(reason: NotReadyReason) -> Self {
        Verdict { state: ReadinessState::NotReady, reason: Some(reason) }
    }
}

/// Pure readiness decision. `expected` is the order-key count, `None` for PCR folders.
pub fn evaluate(s: &FolderSnapshot, expected: Option<usize>) -> Verdict {
    if s.is_processed() {
        return Verdict { state: ReadinessState::Processed, reason: None };
    }
    if s.has_fsa {
        return Verdict::not_ready(NotReadyReason::FragmentAnalysis);
    }
    if !s.brace_names.is_empty() {
        return Verdict::not_ready(NotReadyReason::BraceNames(s.brace_names.clone()));
    }
    let found = s.ab1_count;
    match expected {
        None if found == 0 => Verdict::not_ready(NotReadyReason::Empty),
        None => Verdict::ready(),
        Some(0) => Verdict::not_ready(NotReadyReason::UnknownOrder),
        Some(e) if e == found => Verdict::ready(),
        Some(e) => Verdict::not_ready(NotReadyReason::CountMismatch { expected: e, found }),
    }
}

/// What a folder holds, from its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FolderKind {
    Order { run_id: String, account: String, order_number: String },
    Pcr { pcr_number: String },
}

impl FolderKind {
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(c) = ORDER_FOLDER.captures(name) {
            return Some(FolderKind::Order {
                run_id: c[1].to_string(),
                account: c[2].to_string(),
                order_number: c[3].to_string(),
            });
        }
        PCR_FOLDER.captures(name).map(|c| FolderKind::Pcr { pcr_number: c[1].to_string() })
    }
}

/// Assessment of one folder in a sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadinessAssessment {
    pub folder: PathBuf,
    pub kind: FolderKind,
    pub state: ReadinessState,
    pub reason: Option<NotReadyReason>,
    pub ab1_count: usize,
    pub expected: Option<usize>,
    /// Count-checked only; never handed to the worker.
    pub handoff_exempt: bool,
    /// Set when the sweep moved the folder (parked or restored).
    pub relocated_to: Option<PathBuf>,
    pub outcome: HandoffOutcome,
}

impl ReadinessAssessment {
    /// Ready and not exempt: the caller may hand this folder to the worker.
    pub fn should_hand_off(&self) -> bool {
        self.state == ReadinessState::ReadyForProcessing && !self.handoff_exempt
    }

    /// Current location, after any move made by the sweep.
    pub fn current_path(&self) -> &Path {
        self.relocated_to.as_deref().unwrap_or(&self.folder)
    }
}

/// Result of a readiness sweep.
#[derive(Clone, Debug, Default)]
pub struct ReadinessReport {
    pub assessments: Vec<ReadinessAssessment>,
    /// Folders moved into `Not Ready` (from, to).
    pub parked: Vec<(PathBuf, PathBuf)>,
    /// Folders moved out of `Not Ready` (from, to).
    pub restored: Vec<(PathBuf, PathBuf)>,
    pub failures: Vec<(PathBuf, String)>,
}

impl ReadinessReport {
    pub fn count(&self, state: ReadinessState) -> usize {
        self.assessments.iter().filter(|a| a.state == state).count()
    }

    /// Folders the caller should hand off, in sweep order.
    pub fn handoff_queue(&self) -> impl Iterator<Item = &ReadinessAssessment> {
        self.assessments.iter().filter(|a| a.should_hand_off())
    }
}

/// Evaluates and relocates order/PCR folders.
#[derive(Debug)]
pub struct OrderReadinessTracker<'a> {
    key: &'a OrderKeyIndex,
    config: &'a IntakeConfig,
}

impl<'a> OrderReadinessTracker<'a> {
    pub fn new(key: &'a OrderKeyIndex, config: &'a IntakeConfig) -> Self {
        Self { key, config }
    }

    /// Assess one folder without moving it. `None` if the name is neither an order nor a PCR folder.
    pub fn assess(&self, folder: &Path, fs: &mut FsOps) -> Result<Option<ReadinessAssessment>> {
        let Some(kind) = folder.file_name().and_then(|n| n.to_str()).and_then(FolderKind::parse) else {
            return Ok(None);
        };
        let snapshot = FolderSnapshot::scan(folder, fs, self.config)?;
        let (expected, handoff_exempt) = match &kind {
            FolderKind::Order { account, order_number, .. } => {
                (Some(self.key.expected_count(order_number)), self.config.is_completeness_only(account))
            }
            FolderKind::Pcr { .. } => (None, false),
        };
        let verdict = evaluate(&snapshot, expected);
        debug!(
            "{}: {} ({} of {:?}){}",
            folder.display(),
            verdict.state,
            snapshot.ab1_count,
            expected,
            verdict.reason.as_ref().map(|r| format!(", {r}")).unwrap_or_default()
        );
        Ok(Some(ReadinessAssessment {
            folder: folder.to_path_buf(),
            kind,
            state: verdict.state,
            reason: verdict.reason,
            ab1_count: snapshot.ab1_count,
            expected,
            handoff_exempt,
            relocated_to: None,
            outcome: snapshot.handoff_outcome(),
        }))
    }

    /// Order and PCR folders under the data folder, excluding `Not Ready`.
    pub fn active_folders(&self, data_folder: &Path, fs: &mut FsOps) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for name in fs.subdirs(data_folder)? {
            if ORDER_FOLDER.is_match(&name) || PCR_FOLDER.is_match(&name) {
                out.push(data_folder.join(&name));
            } else if RUN_FOLDER.is_match(&name) {
                let run = data_folder.join(&name);
                for sub in fs.subdirs(&run)? {
                    if ORDER_FOLDER.is_match(&sub) {
                        out.push(run.join(sub));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Assess every folder, park incomplete orders and restore recovered ones.
    ///
    /// Per-folder failures are recorded and the sweep continues.
    pub fn sweep(&self, data_folder: &Path, fs: &mut FsOps) -> Result<ReadinessReport> {
        let mut report = ReadinessReport::default();
        let not_ready = data_folder.join(folders::NOT_READY);
        // Taken before parking so folders parked in this sweep are assessed once.
        let already_parked = if not_ready.is_dir() { fs.subdirs(&not_ready)? } else { Vec::new() };

        for folder in self.active_folders(data_folder, fs)? {
            let mut a = match self.assess(&folder, fs) {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not assess {}: {}", folder.display(), e);
                    report.failures.push((folder, e.to_string()));
                    continue;
                }
            };
            let parks = matches!(a.kind, FolderKind::Order { .. }) && a.reason.as_ref().is_some_and(NotReadyReason::parks);
            if parks {
                match self.relocate(&folder, &not_ready, fs) {
                    Ok(to) => {
                        info!("Parked {} in {} ({})", folder.display(), folders::NOT_READY, a.reason.as_ref().map(ToString::to_string).unwrap_or_default());
                        report.parked.push((folder.clone(), to.clone()));
                        a.relocated_to = Some(to);
                    }
                    Err(e) => {
                        warn!("Could not park {}: {}", folder.display(), e);
                        report.failures.push((folder.clone(), e.to_string()));
                    }
                }
            }
            report.assessments.push(a);
        }

        for name in already_parked {
            let folder = not_ready.join(&name);
            let mut a = match self.assess(&folder, fs) {
                Ok(Some(a)) => a,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not assess {}: {}", folder.display(), e);
                    report.failures.push((folder, e.to_string()));
                    continue;
                }
            };
            if matches!(a.state, ReadinessState::ReadyForProcessing | ReadinessState::Processed) {
                let home = match &a.kind {
                    FolderKind::Order { run_id, .. } => run_folder_path(data_folder, run_id),
                    FolderKind::Pcr { .. } => data_folder.to_path_buf(),
                };
                match self.relocate(&folder, &home, fs) {
                    Ok(to) => {
                        info!("Restored {} from {}", name, folders::NOT_READY);
                        report.restored.push((folder.clone(), to.clone()));
                        a.relocated_to = Some(to);
                    }
                    Err(e) => {
                        warn!("Could not restore {}: {}", folder.display(), e);
                        report.failures.push((folder.clone(), e.to_string()));
                    }
                }
            }
            report.assessments.push(a);
        }

        info!(
            "Readiness: {} ready, {} processed, {} not ready, {} parked, {} restored",
            report.count(ReadinessState::ReadyForProcessing),
            report.count(ReadinessState::Processed),
            report.count(ReadinessState::NotReady),
            report.parked.len(),
            report.restored.len()
        );
        Ok(report)
    }

    fn relocate(&self, folder: &Path, into: &Path, fs: &mut FsOps) -> Result<PathBuf> {
        fs.ensure_dir(into)?;
        let name = folder.file_name().unwrap_or_default();
        let to = into.join(name);
        fs.rename(folder, &to)?;
        Ok(to)
    }
}

#[cfg(test)]
mod readiness_tests {
    use super::*;
    use crate::naming::NameNormalizer;
    use crate::order_key::OrderKeyEntry;
    use std::fs;

    fn entries(files: &[&str], dirs: &[&str]) -> Vec<Entry> {
        files
            .iter()
            .map(|n| Entry { name: n.to_string(), is_dir: false })
            .chain(dirs.iter().map(|n| Entry { name: n.to_string(), is_dir: true }))
            .collect()
    }

    fn snap(files: &[&str], dirs: &[&str]) -> FolderSnapshot {
        FolderSnapshot::from_entries(&entries(files, dirs), &IntakeConfig::default())
    }

    const MARKER_DIRS: [&str; 3] = ["chromat_dir", "edit_dir", "phd_dir"];

    #[test]
    fn counts_gate_readiness() {
        let s = snap(&["a.ab1", "b.ab1", "c.ab1"], &[]);
        assert_eq!(evaluate(&s, Some(3)).state, ReadinessState::ReadyForProcessing);
        let v = evaluate(&snap(&["a.ab1", "b.ab1"], &[]), Some(3));
        assert_eq!(v.reason, Some(NotReadyReason::CountMismatch { expected: 3, found: 2 }));
        assert!(v.reason.unwrap().parks());
        assert_eq!(evaluate(&snap(&[], &[]), Some(3)).state, ReadinessState::NotReady);
        assert_eq!(evaluate(&s, Some(0)).reason, Some(NotReadyReason::UnknownOrder));
    }

    #[test]
    fn braces_block_even_when_counts_match() {
        let v = evaluate(&snap(&["a.ab1", "{01A}b.ab1", "c.ab1"], &[]), Some(3));
        assert_eq!(v.state, ReadinessState::NotReady);
        assert!(matches!(v.reason, Some(NotReadyReason::BraceNames(ref n)) if n == &["{01A}b.ab1".to_string()]));
        assert!(!v.reason.unwrap().parks());
    }

    #[test]
    fn all_four_markers_mean_processed() {
        let s = snap(&["a.ab1", "mseq4.ini"], &MARKER_DIRS);
        assert_eq!(evaluate(&s, Some(5)).state, ReadinessState::Processed);
        assert_eq!(s.handoff_outcome(), HandoffOutcome::LowQuality);
        let partial = snap(&["a.ab1"], &MARKER_DIRS);
        assert_eq!(evaluate(&partial, Some(1)).state, ReadinessState::ReadyForProcessing);
        assert_eq!(partial.handoff_outcome(), HandoffOutcome::Pending);
    }

    #[test]
    fn output_suffixes_use_first_match() {
        let only_raw_seq = snap(&["p.raw.seq.txt"], &[]);
        assert_eq!(only_raw_seq.outputs_present.len(), 1);
        assert!(only_raw_seq.outputs_present.contains(".raw.seq.txt"));
        let all = snap(
            &["p.raw.qual.txt", "p.raw.seq.txt", "p.seq.info.txt", "p.seq.qual.txt", "p.seq.txt", "mseq4.ini"],
            &MARKER_DIRS,
        );
        assert_eq!(all.handoff_outcome(), HandoffOutcome::Complete);
    }

    #[test]
    fn fsa_and_pcr_rules() {
        assert_eq!(evaluate(&snap(&["a.ab1", "b.fsa"], &[]), Some(1)).reason, Some(NotReadyReason::FragmentAnalysis));
        assert_eq!(evaluate(&snap(&["a.ab1"], &[]), None).state, ReadinessState::ReadyForProcessing);
        assert_eq!(evaluate(&snap(&[], &[]), None).reason, Some(NotReadyReason::Empty));
    }

    #[test]
    fn folder_kinds() {
        assert_eq!(
            FolderKind::parse("RunFolder-20000_Smith_Lab_100001"),
            Some(FolderKind::Order { run_id: "20000".into(), account: "Smith_Lab".into(), order_number: "100001".into() })
        );
        assert_eq!(FolderKind::parse("PCRFolder-PCR12"), Some(FolderKind::Pcr { pcr_number: "PCR12".into() }));
        assert_eq!(FolderKind::parse("RunFolder-20000"), None);
        assert_eq!(FolderKind::parse("Controls"), None);
    }

    fn key(rows: &[(&str, &str, &str, &str)]) -> OrderKeyIndex {
        let entries = rows
            .iter()
            .map(|(r, a, o, n)| OrderKeyEntry {
                run_id: r.to_string(),
                account: a.to_string(),
                order_number: o.to_string(),
                raw_sample_name: n.to_string(),
            })
            .collect();
        OrderKeyIndex::from_entries(entries, &NameNormalizer::default())
    }

    #[test]
    fn sweep_parks_then_restores() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path();
        let order = data.join("RunFolder-20000").join("RunFolder-20000_Smith_100001");
        fs::create_dir_all(&order).unwrap();
        fs::write(order.join("A.ab1"), b"").unwrap();
        fs::write(order.join("B.ab1"), b"").unwrap();
        let k = key(&[("20000", "Smith", "100001", "A"), ("20000", "Smith", "100001", "B"), ("20000", "Smith", "100001", "C")]);
        let cfg = IntakeConfig::default();
        let tracker = OrderReadinessTracker::new(&k, &cfg);

        let mut ops = FsOps::new();
        let r = tracker.sweep(data, &mut ops).unwrap();
        let parked = data.join("Not Ready").join("RunFolder-20000_Smith_100001");
        assert_eq!(r.parked, vec![(order.clone(), parked.clone())]);
        assert!(parked.is_dir() && !order.exists());
        // A folder parked during the sweep is reported once.
        assert_eq!(r.assessments.len(), 1);
        assert_eq!(r.count(ReadinessState::NotReady), 1);

        fs::write(parked.join("C.ab1"), b"").unwrap();
        ops.clear();
        let r = tracker.sweep(data, &mut ops).unwrap();
        assert_eq!(r.restored, vec![(parked.clone(), order.clone())]);
        assert_eq!(r.count(ReadinessState::ReadyForProcessing), 1);
        assert_eq!(r.handoff_queue().count(), 1);
        assert!(order.join("C.ab1").is_file());
    }

    #[test]
    fn exempt_accounts_are_checked_but_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let order = dir.path().join("RunFolder-20000").join("RunFolder-20000_Andreev_100009");
        fs::create_dir_all(&order).unwrap();
        fs::write(order.join("A.ab1"), b"").unwrap();
        let k = key(&[("20000", "Andreev", "100009", "A")]);
        let cfg = IntakeConfig { completeness_only_accounts: vec!["andreev".into()], ..IntakeConfig::default() };
        let r = OrderReadinessTracker::new(&k, &cfg).sweep(dir.path(), &mut FsOps::new()).unwrap();
        assert_eq!(r.assessments.len(), 1);
        assert!(r.assessments[0].handoff_exempt);
        assert_eq!(r.assessments[0].state, ReadinessState::ReadyForProcessing);
        assert_eq!(r.handoff_queue().count(), 0);
    }
}
