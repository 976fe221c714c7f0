//! Destination resolution.
//!
//! Turns a classified [`ReactionFile`] into the folder it belongs in:
//!
//! | class    | destination                                                     |
//! |----------|-----------------------------------------------------------------|
//! | Customer | `<data>/RunFolder-{run}/RunFolder-{run}_{account}_{order}`      |
//! | PCR      | `<data>/PCRFolder-{pcrNumber}`                                  |
//! | Control  | `<data>/RunFolder-{current}/Controls`                           |
//! | Blank    | `<data>/RunFolder-{current}/Blank`                              |
//!
//! Customer names with several order-key candidates go through
//! [`choose_candidate`]. Each rule narrows the pool and the first rule that
//! leaves exactly one candidate decides:
//! current run, run tag in the file name, order tag in the file name, then
//! the first remaining candidate in key order.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::classify::{ReactionClass, ReactionFile};
use crate::data::folders;
use crate::error::Result;
use crate::fsops::FsOps;
use crate::naming::{adjust_chars, Annotations};
use crate::order_key::{OrderKeyEntry, OrderKeyIndex};

/// The run folder currently being sorted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunContext {
    pub data_folder: PathBuf,
    pub run_id: String,
}

impl RunContext {
    pub fn new(data_folder: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self { data_folder: data_folder.into(), run_id: run_id.into() }
    }

    /// `<data>/RunFolder-{run_id}`.
    pub fn canonical_run_folder(&self) -> PathBuf {
        run_folder_path(&self.data_folder, &self.run_id)
    }
}

/// `<data>/RunFolder-{run_id}`.
pub fn run_folder_path(data_folder: &Path, run_id: &str) -> PathBuf {
    data_folder.join(format!("{}{}", folders::RUN_FOLDER_PREFIX, run_id))
}

/// `RunFolder-{run}_{account}_{order}`, with the account pushed through the character table.
pub fn order_folder_name(entry: &OrderKeyEntry) -> String {
    format!(
        "{}{}_{}_{}",
        folders::RUN_FOLDER_PREFIX,
        entry.run_id,
        adjust_chars(&entry.account),
        entry.order_number
    )
}

/// `<data>/PCRFolder-{pcr_number}`.
pub fn pcr_folder_path(data_folder: &Path, pcr_number: &str) -> PathBuf {
    data_folder.join(format!("{}{}", folders::PCR_FOLDER_PREFIX, pcr_number))
}

/// Rule that picked a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TieBreak {
    /// Only one candidate existed.
    Unique,
    CurrentRun,
    FilenameRunTag,
    FilenameOrderTag,
    /// Still ambiguous after every rule; first in key order.
    FirstInKey,
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TieBreak::Unique => "unique",
            TieBreak::CurrentRun => "current-run",
            TieBreak::FilenameRunTag => "filename-run-tag",
            TieBreak::FilenameOrderTag => "filename-order-tag",
            TieBreak::FirstInKey => "first-in-key",
        };
        f.write_str(s)
    }
}

/// Pick one order-key candidate for a file. `None` only when `candidates` is empty.
pub fn choose_candidate<'a>(
    candidates: &[&'a OrderKeyEntry],
    current_run: &str,
    raw_name: &str,
) -> Option<(&'a OrderKeyEntry, TieBreak)> {
    match candidates {
        [] => return None,
        [only] => return Some((*only, TieBreak::Unique)),
        _ => {}
    }
    let tags = Annotations::parse(raw_name);
    let run_tag = tags.run_tag();
    let order_tag = tags.order_tag();

    let keep = |rule: TieBreak, e: &OrderKeyEntry| match rule {
        TieBreak::CurrentRun => e.run_id == current_run,
        TieBreak::FilenameRunTag => run_tag.is_some_and(|t| e.run_id == t),
        TieBreak::FilenameOrderTag => order_tag.is_some_and(|t| e.order_number == t),
        TieBreak::Unique | TieBreak::FirstInKey => false,
    };

    let mut pool: Vec<&'a OrderKeyEntry> = candidates.to_vec();
    for rule in [TieBreak::CurrentRun, TieBreak::FilenameRunTag, TieBreak::FilenameOrderTag] {
        let narrowed: Vec<&'a OrderKeyEntry> = pool.iter().copied().filter(|e| keep(rule, e)).collect();
        match narrowed.len() {
            0 => {}
            1 => return Some((narrowed[0], rule)),
            _ => pool = narrowed,
        }
    }
    Some((pool[0], TieBreak::FirstInKey))
}

/// Where a file should go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Order { entry: OrderKeyEntry, folder: PathBuf },
    Pcr { pcr_number: String, folder: PathBuf },
    Controls { folder: PathBuf },
    Blank { folder: PathBuf },
}

impl Destination {
    pub fn folder(&self) -> &Path {
        match self {
            Destination::Order { folder, .. }
            | Destination::Pcr { folder, .. }
            | Destination::Controls { folder }
            | Destination::Blank { folder } => folder,
        }
    }
}

/// Outcome of resolving one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved { destination: Destination, tie_break: TieBreak },
    /// No order-key entry; the file stays where it is.
    Unresolved,
}

/// Maps classified files to destination folders, creating them on demand.
#[derive(Debug)]
pub struct DestinationResolver<'a> {
    key: &'a OrderKeyIndex,
}

impl<'a> DestinationResolver<'a> {
    pub fn new(key: &'a OrderKeyIndex) -> Self {
        Self { key }
    }

    /// Resolve and create (idempotently) the destination folder.
    pub fn resolve(&self, file: &ReactionFile, ctx: &RunContext, fs: &mut FsOps) -> Result<Resolution> {
        let resolution = self.plan(file, ctx, fs)?;
        if let Resolution::Resolved { destination, .. } = &resolution {
            fs.ensure_dir(destination.folder())?;
        }
        Ok(resolution)
    }

    /// Resolve without touching the filesystem beyond listing.
    pub fn plan(&self, file: &ReactionFile, ctx: &RunContext, fs: &mut FsOps) -> Result<Resolution> {
        let run_folder = ctx.canonical_run_folder();
        let (destination, tie_break) = match &file.class {
            ReactionClass::Pcr { pcr_number } => (
                Destination::Pcr { pcr_number: pcr_number.clone(), folder: pcr_folder_path(&ctx.data_folder, pcr_number) },
                TieBreak::Unique,
            ),
            ReactionClass::Control => {
                (Destination::Controls { folder: run_folder.join(folders::CONTROLS) }, TieBreak::Unique)
            }
            ReactionClass::Blank => (Destination::Blank { folder: run_folder.join(folders::BLANK) }, TieBreak::Unique),
            ReactionClass::Customer => {
                let candidates = self.key.lookup(&file.normalized);
                let Some((entry, tie_break)) = choose_candidate(&candidates, &ctx.run_id, &file.raw_name) else {
                    debug!("No order for {} (normalized {})", file.raw_name, file.normalized);
                    return Ok(Resolution::Unresolved);
                };
                match tie_break {
                    TieBreak::FirstInKey => warn!(
                        "Ambiguous match for {}: {} candidates, taking order {} ({})",
                        file.raw_name,
                        candidates.len(),
                        entry.order_number,
                        entry.account
                    ),
                    TieBreak::Unique => {}
                    rule => debug!("{} matched order {} by {}", file.raw_name, entry.order_number, rule),
                }
                let folder = self.order_folder(entry, &ctx.data_folder, fs)?;
                (Destination::Order { entry: entry.clone(), folder }, tie_break)
            }
        };
        Ok(Resolution::Resolved { destination, tie_break })
    }

    /// Existing order folder (canonical run folder first, then `Not Ready`), or the path to create.
    pub fn order_folder(&self, entry: &OrderKeyEntry, data_folder: &Path, fs: &mut FsOps) -> Result<PathBuf> {
        let run_folder = run_folder_path(data_folder, &entry.run_id);
        let wanted = order_folder_name(entry);
        for parent in [run_folder.clone(), data_folder.join(folders::NOT_READY)] {
            if !parent.is_dir() {
                continue;
            }
            if let Some(found) = find_order_folder(&fs.subdirs(&parent)?, &entry.run_id, &entry.order_number, &wanted) {
                return Ok(parent.join(found));
            }
        }
        Ok(run_folder.join(wanted))
    }
}

/// Exact name (case-insensitive), else any `RunFolder-{run}_*_{order}` folder.
fn find_order_folder<'n>(names: &'n [String], run_id: &str, order: &str, wanted: &str) -> Option<&'n String> {
    let prefix = format!("{}{}_", folders::RUN_FOLDER_PREFIX, run_id).to_lowercase();
    let suffix = format!("_{order}");
    names.iter().find(|n| n.eq_ignore_ascii_case(wanted)).or_else(|| {
        names.iter().find(|n| n.to_lowercase().starts_with(&prefix) && n.ends_with(&suffix))
    })
}

#[cfg(test)]
mod resolve_tests {
    use super::*;
    use crate::classify::ReactionClassifier;
    use crate::config::IntakeConfig;
    use crate::naming::NameNormalizer;

    fn entry(run: &str, account: &str, order: &str, name: &str) -> OrderKeyEntry {
        OrderKeyEntry {
            run_id: run.into(),
            account: account.into(),
            order_number: order.into(),
            raw_sample_name: name.into(),
        }
    }

    #[test]
    fn tie_break_precedence() {
        let a = entry("19999", "Smith", "100001", "GeneX");
        let b = entry("20000", "Jones", "100002", "GeneX");
        let c = entry("20001", "Lee", "100003", "GeneX");
        let all = [&a, &b, &c];

        assert_eq!(choose_candidate(&[&a], "1", "GeneX.ab1"), Some((&a, TieBreak::Unique)));
        assert_eq!(choose_candidate(&all, "20000", "GeneX.ab1"), Some((&b, TieBreak::CurrentRun)));
        assert_eq!(choose_candidate(&all, "55555", "GeneX{I-20001}.ab1"), Some((&c, TieBreak::FilenameRunTag)));
        assert_eq!(choose_candidate(&all, "55555", "GeneX{O-100001}.ab1"), Some((&a, TieBreak::FilenameOrderTag)));
        assert_eq!(choose_candidate(&all, "55555", "GeneX.ab1"), Some((&a, TieBreak::FirstInKey)));
        assert_eq!(choose_candidate(&[], "20000", "GeneX.ab1"), None);
    }

    #[test]
    fn current_run_ties_fall_through_to_filename_tags() {
        let a = entry("20000", "Smith", "100001", "GeneX");
        let b = entry("20000", "Jones", "100002", "GeneX");
        let c = entry("20001", "Lee", "100002", "GeneX");
        let got = choose_candidate(&[&a, &b, &c], "20000", "GeneX{O-100002}.ab1");
        assert_eq!(got, Some((&b, TieBreak::FilenameOrderTag)));
        let got = choose_candidate(&[&a, &b, &c], "20000", "GeneX.ab1");
        assert_eq!(got, Some((&a, TieBreak::FirstInKey)));
    }

    #[test]
    fn folder_names() {
        let e = entry("20000", "O'Brien Lab", "100001", "x");
        assert_eq!(order_folder_name(&e), "RunFolder-20000_OBrienLab_100001");
        assert_eq!(pcr_folder_path(Path::new("/d"), "PCR12"), Path::new("/d/PCRFolder-PCR12"));
    }

    #[test]
    fn resolves_each_class_and_creates_folders() {
        let dir = tempfile::tempdir().unwrap();
        let key = OrderKeyIndex::from_entries(vec![entry("20000", "Smith", "100001", "GeneX_M13F")], &NameNormalizer::default());
        let resolver = DestinationResolver::new(&key);
        let classifier = ReactionClassifier::from_config(&IntakeConfig::default());
        let ctx = RunContext::new(dir.path(), "20000");
        let src = ctx.canonical_run_folder();
        let mut fs = FsOps::new();

        let r = resolver.resolve(&classifier.reaction_file(&src, "GeneX_M13F.ab1"), &ctx, &mut fs).unwrap();
        let Resolution::Resolved { destination, tie_break } = r else { panic!("unresolved") };
        assert_eq!(tie_break, TieBreak::Unique);
        assert_eq!(destination.folder(), src.join("RunFolder-20000_Smith_100001"));
        assert!(destination.folder().is_dir());

        let r = resolver.resolve(&classifier.reaction_file(&src, "{pcr12_exp1}GeneY.ab1"), &ctx, &mut fs).unwrap();
        assert!(matches!(r, Resolution::Resolved { destination: Destination::Pcr { ref pcr_number, .. }, .. } if pcr_number == "PCR12"));
        assert!(dir.path().join("PCRFolder-PCR12").is_dir());

        let r = resolver.resolve(&classifier.reaction_file(&src, "pGEM_M13F.ab1"), &ctx, &mut fs).unwrap();
        assert!(matches!(r, Resolution::Resolved { destination: Destination::Controls { .. }, .. }));
        let r = resolver.resolve(&classifier.reaction_file(&src, "01A__.ab1"), &ctx, &mut fs).unwrap();
        assert!(matches!(r, Resolution::Resolved { destination: Destination::Blank { .. }, .. }));
        assert!(src.join("Controls").is_dir() && src.join("Blank").is_dir());

        let r = resolver.resolve(&classifier.reaction_file(&src, "Unknown.ab1"), &ctx, &mut fs).unwrap();
        assert_eq!(r, Resolution::Unresolved);
    }

    #[test]
    fn reuses_parked_order_folder() {
        let dir = tempfile::tempdir().unwrap();
        let parked = dir.path().join("Not Ready").join("RunFolder-20000_Smith Lab_100001");
        std::fs::create_dir_all(&parked).unwrap();
        let e = entry("20000", "Smith", "100001", "GeneX");
        let key = OrderKeyIndex::from_entries(vec![e.clone()], &NameNormalizer::default());
        let resolver = DestinationResolver::new(&key);
        let mut fs = FsOps::new();
        assert_eq!(resolver.order_folder(&e, dir.path(), &mut fs).unwrap(), parked);
    }
}
