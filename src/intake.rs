//! Intake engine.
//!
//! One sorting pass walks every run folder under the data folder, one at a
//! time, and every top-level `.ab1` in it, one at a time:
//!
//! ```text
//! discover → canonicalize → classify → resolve → place → move → cleanup
//! ```
//!
//! Only an unusable data folder aborts a pass (the order key is loaded before
//! an engine can exist). Per-file and per-folder failures land in the
//! [`SortSummary`] and the pass carries on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::classify::{ReactionClass, ReactionClassifier, ReactionFile};
use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result};
use crate::fsops::FsOps;
use crate::lifecycle::{self, CleanupReport, RunFolder};
use crate::naming::{self, NameNormalizer};
use crate::order_key::OrderKeyIndex;
use crate::placement::{PlacementKind, PlacementPolicy};
use crate::readiness::{OrderReadinessTracker, ReadinessReport};
use crate::reinject::{ReinjectLoadReport, ReinjectRegistry};
use crate::resolve::{Destination, DestinationResolver, Resolution, RunContext, TieBreak};

/// One file that was moved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovedFile {
    pub from: PathBuf,
    pub to: PathBuf,
    pub class: ReactionClass,
    pub kind: PlacementKind,
}

/// A customer file whose order was picked by a tie-break rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AmbiguousMatch {
    pub raw_name: String,
    pub order_number: String,
    pub rule: TieBreak,
}

/// Result of one sorting pass.
#[derive(Clone, Debug, Default)]
pub struct SortSummary {
    pub moved: Vec<MovedFile>,
    /// Customer files with no order-key entry, left in place.
    pub unresolved: Vec<PathBuf>,
    /// Files whose resolution or move failed, left in place.
    pub failed: Vec<(PathBuf, String)>,
    pub ambiguous: Vec<AmbiguousMatch>,
    /// Files seen per class label.
    pub class_counts: BTreeMap<&'static str, usize>,
    pub cleanups: Vec<CleanupReport>,
}

impl SortSummary {
    pub fn moved_to_main(&self) -> usize {
        self.moved.iter().filter(|m| m.kind == PlacementKind::Canonical).count()
    }

    pub fn diverted(&self, kind: PlacementKind) -> usize {
        self.moved.iter().filter(|m| m.kind == kind).count()
    }

    pub fn files_seen(&self) -> usize {
        self.class_counts.values().sum()
    }
}

/// Sorts run folders against one order key.
#[derive(Debug)]
pub struct IntakeEngine {
    config: IntakeConfig,
    key: OrderKeyIndex,
    reinjects: ReinjectRegistry,
    classifier: ReactionClassifier,
}

impl IntakeEngine {
    pub fn new(config: IntakeConfig, key: OrderKeyIndex, reinjects: ReinjectRegistry) -> Self {
        let classifier = ReactionClassifier::from_config(&config);
        Self { config, key, reinjects, classifier }
    }

    /// Load the order key (fatal on failure) and the reinject worksheets (best-effort).
    pub fn load(config: IntakeConfig, key_path: &Path) -> Result<(Self, ReinjectLoadReport)> {
        let normalizer = NameNormalizer::from_config(&config);
        let key = OrderKeyIndex::load(key_path, &normalizer)?;
        let (reinjects, report) = ReinjectRegistry::load(&config, &key.run_ids(), &normalizer);
        Ok((Self::new(config, key, reinjects), report))
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn key(&self) -> &OrderKeyIndex {
        &self.key
    }

    pub fn classifier(&self) -> &ReactionClassifier {
        &self.classifier
    }

    /// Sort every run folder under `data_folder`.
    pub fn sort(&self, data_folder: &Path) -> Result<SortSummary> {
        validate_data_folder(data_folder)?;
        let mut fs = FsOps::new();
        let mut summary = SortSummary::default();

        let runs = lifecycle::discover_run_folders(data_folder, &mut fs)?;
        info!("Found {} run folder(s) in {}", runs.len(), data_folder.display());

        for run in runs {
            // Listings are cached per run-folder pass.
            fs.clear();
            let run = match lifecycle::canonicalize(run.clone(), &mut fs) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Could not rename {}: {}", run.path.display(), e);
                    summary.failed.push((run.path.clone(), e.to_string()));
                    run
                }
            };
            self.sort_run_folder(data_folder, &run, &mut fs, &mut summary);
            summary.cleanups.push(lifecycle::cleanup(&run, &mut fs));
        }

        info!(
            "Sorted {} file(s): {} moved, {} diverted (collision), {} diverted (reinject), {} unresolved, {} failed",
            summary.files_seen(),
            summary.moved_to_main(),
            summary.diverted(PlacementKind::Collision),
            summary.diverted(PlacementKind::Reinject),
            summary.unresolved.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Readiness sweep over the data folder.
    pub fn readiness(&self, data_folder: &Path) -> Result<ReadinessReport> {
        validate_data_folder(data_folder)?;
        OrderReadinessTracker::new(&self.key, &self.config).sweep(data_folder, &mut FsOps::new())
    }

    fn sort_run_folder(&self, data_folder: &Path, run: &RunFolder, fs: &mut FsOps, summary: &mut SortSummary) {
        let files = match fs.files(&run.path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Could not list {}: {}", run.path.display(), e);
                summary.failed.push((run.path.clone(), e.to_string()));
                return;
            }
        };
        let ctx = RunContext::new(data_folder, run.run_id.clone());
        let resolver = DestinationResolver::new(&self.key);
        let policy = PlacementPolicy::new(&self.reinjects, self.classifier.normalizer());

        let ab1: Vec<String> = files.into_iter().filter(|n| naming::is_ab1(n)).collect();
        debug!("{}: {} reaction file(s)", run.path.display(), ab1.len());
        for raw in ab1 {
            let file = self.classifier.reaction_file(&run.path, &raw);
            *summary.class_counts.entry(file.class.as_str()).or_default() += 1;
            if let Err(e) = self.sort_file(&file, &ctx, &resolver, &policy, fs, summary) {
                warn!("Could not sort {}: {}", file.path().display(), e);
                summary.failed.push((file.path(), e.to_string()));
            }
        }
    }

    fn sort_file(
        &self,
        file: &ReactionFile,
        ctx: &RunContext,
        resolver: &DestinationResolver<'_>,
        policy: &PlacementPolicy<'_>,
        fs: &mut FsOps,
        summary: &mut SortSummary,
    ) -> Result<()> {
        let (destination, tie_break) = match resolver.resolve(file, ctx, fs)? {
            Resolution::Resolved { destination, tie_break } => (destination, tie_break),
            Resolution::Unresolved => {
                warn!("No order found for {}, leaving it in place", file.raw_name);
                summary.unresolved.push(file.path());
                return Ok(());
            }
        };
        if let Destination::Order { entry, .. } = &destination {
            if tie_break != TieBreak::Unique {
                summary.ambiguous.push(AmbiguousMatch {
                    raw_name: file.raw_name.clone(),
                    order_number: entry.order_number.clone(),
                    rule: tie_break,
                });
            }
        }

        let placement = policy.place(destination.folder(), file, fs);
        if let Some(parent) = placement.target.parent() {
            fs.ensure_dir(parent)?;
        }
        fs.rename(&file.path(), &placement.target)?;
        debug!("{} -> {} ({})", file.raw_name, placement.target.display(), placement.kind);
        summary.moved.push(MovedFile {
            from: file.path(),
            to: placement.target,
            class: file.class.clone(),
            kind: placement.kind,
        });
        Ok(())
    }
}

fn validate_data_folder(data_folder: &Path) -> Result<()> {
    if data_folder.is_dir() {
        Ok(())
    } else {
        Err(IntakeError::InvalidDataFolder(data_folder.to_path_buf()))
    }
}
