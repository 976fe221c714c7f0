//! Main-slot vs Alternate Injections placement.
//!
//! The first non-reinject copy of a sample owns `<dest>/<stripped name>`.
//! Anything that would overwrite it, and every known non-preemptive reinject,
//! goes to `<dest>/Alternate Injections/<raw name>` instead. Nothing is ever
//! overwritten: a clash inside Alternate Injections gets a ` (n)` counter.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::classify::{ReactionClass, ReactionFile};
use crate::data::folders;
use crate::fsops::FsOps;
use crate::naming::{self, NameNormalizer};
use crate::reinject::ReinjectRegistry;

/// Why a file landed where it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlacementKind {
    /// Main slot.
    Canonical,
    /// Main slot was taken.
    Collision,
    /// Known reinject without the preemptive marker.
    Reinject,
}

impl PlacementKind {
    pub fn is_diverted(self) -> bool {
        !matches!(self, PlacementKind::Canonical)
    }
}

impl fmt::Display for PlacementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlacementKind::Canonical => "canonical",
            PlacementKind::Collision => "collision",
            PlacementKind::Reinject => "reinject",
        })
    }
}

/// Final path for one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    pub target: PathBuf,
    pub kind: PlacementKind,
}

/// Name a file takes in the main slot: annotations stripped, raw name if nothing is left.
pub fn canonical_file_name(raw_name: &str, normalizer: &NameNormalizer) -> String {
    let stripped = normalizer.strip_annotations(raw_name);
    if naming::strip_extension(&stripped).trim().is_empty() {
        raw_name.to_string()
    } else {
        stripped
    }
}

/// `<dest>/Alternate Injections/<raw>`, or `<raw> (n).ab1` when that is taken.
fn alternate_path(dest: &Path, raw_name: &str, fs: &mut FsOps) -> PathBuf {
    let alt = dest.join(folders::ALTERNATE_INJECTIONS);
    let first = alt.join(raw_name);
    if !fs.exists(&first) {
        return first;
    }
    let stem = naming::strip_extension(raw_name);
    let ext = &raw_name[stem.len()..];
    (2..)
        .map(|n| alt.join(format!("{stem} ({n}){ext}")))
        .find(|p| !fs.exists(p))
        .unwrap_or(first)
}

/// Decides the final path of a resolved file.
#[derive(Debug)]
pub struct PlacementPolicy<'a> {
    reinjects: &'a ReinjectRegistry,
    normalizer: &'a NameNormalizer,
}

impl<'a> PlacementPolicy<'a> {
    pub fn new(reinjects: &'a ReinjectRegistry, normalizer: &'a NameNormalizer) -> Self {
        Self { reinjects, normalizer }
    }

    /// Place `file` inside the already-resolved `dest` folder.
    ///
    /// Reinject diversion applies to customer and PCR reactions only; controls
    /// and blanks are rerun on every plate.
    pub fn place(&self, dest: &Path, file: &ReactionFile, fs: &mut FsOps) -> Placement {
        let main = dest.join(canonical_file_name(&file.raw_name, self.normalizer));
        if fs.exists(&main) {
            return Placement { target: alternate_path(dest, &file.raw_name, fs), kind: PlacementKind::Collision };
        }
        let reinject_eligible = matches!(file.class, ReactionClass::Customer | ReactionClass::Pcr { .. });
        if reinject_eligible && self.reinjects.is_diverting(&file.normalized) {
            return Placement { target: alternate_path(dest, &file.raw_name, fs), kind: PlacementKind::Reinject };
        }
        Placement { target: main, kind: PlacementKind::Canonical }
    }
}

#[cfg(test)]
mod placement_tests {
    use super::*;
    use crate::classify::ReactionClassifier;
    use crate::config::IntakeConfig;
    use std::fs;

    struct Fixture {
        dir: tempfile::TempDir,
        classifier: ReactionClassifier,
        normalizer: NameNormalizer,
    }

    fn fixture() -> Fixture {
        Fixture {
            dir: tempfile::tempdir().unwrap(),
            classifier: ReactionClassifier::from_config(&IntakeConfig::default()),
            normalizer: NameNormalizer::default(),
        }
    }

    #[test]
    fn first_copy_takes_the_main_slot_second_is_diverted() {
        let fx = fixture();
        let dest = fx.dir.path().join("order");
        fs::create_dir_all(&dest).unwrap();
        let reg = ReinjectRegistry::empty();
        let policy = PlacementPolicy::new(&reg, &fx.normalizer);
        let mut ops = FsOps::new();

        let first = fx.classifier.reaction_file(fx.dir.path(), "{01A}GeneX.ab1");
        let p1 = policy.place(&dest, &first, &mut ops);
        assert_eq!(p1, Placement { target: dest.join("GeneX.ab1"), kind: PlacementKind::Canonical });
        fs::write(&p1.target, b"").unwrap();
        ops.invalidate(&dest);

        let second = fx.classifier.reaction_file(fx.dir.path(), "{05E}GeneX.ab1");
        let p2 = policy.place(&dest, &second, &mut ops);
        assert_eq!(p2.kind, PlacementKind::Collision);
        assert_eq!(p2.target, dest.join("Alternate Injections").join("{05E}GeneX.ab1"));
    }

    #[test]
    fn alternate_slot_clash_gets_a_counter() {
        let fx = fixture();
        let dest = fx.dir.path().join("order");
        fs::create_dir_all(dest.join("Alternate Injections")).unwrap();
        fs::write(dest.join("GeneX.ab1"), b"").unwrap();
        fs::write(dest.join("Alternate Injections").join("GeneX.ab1"), b"").unwrap();
        let reg = ReinjectRegistry::empty();
        let policy = PlacementPolicy::new(&reg, &fx.normalizer);
        let f = fx.classifier.reaction_file(fx.dir.path(), "GeneX.ab1");
        let p = policy.place(&dest, &f, &mut FsOps::new());
        assert_eq!(p.target, dest.join("Alternate Injections").join("GeneX (2).ab1"));
    }

    #[test]
    fn reinjects_divert_unless_preemptive() {
        let fx = fixture();
        let dest = fx.dir.path().join("order");
        fs::create_dir_all(&dest).unwrap();
        let reg = ReinjectRegistry::from_raw_names(["GeneX", "{!P}GeneY"], "{!P}", &fx.normalizer);
        let policy = PlacementPolicy::new(&reg, &fx.normalizer);
        let mut ops = FsOps::new();

        let x = fx.classifier.reaction_file(fx.dir.path(), "GeneX{I-20000}.ab1");
        let p = policy.place(&dest, &x, &mut ops);
        assert_eq!(p.kind, PlacementKind::Reinject);
        assert_eq!(p.target, dest.join("Alternate Injections").join("GeneX{I-20000}.ab1"));

        let y = fx.classifier.reaction_file(fx.dir.path(), "{!P}GeneY.ab1");
        let p = policy.place(&dest, &y, &mut ops);
        assert_eq!(p, Placement { target: dest.join("GeneY.ab1"), kind: PlacementKind::Canonical });
    }

    #[test]
    fn blank_with_nothing_left_keeps_raw_name() {
        let n = NameNormalizer::default();
        assert_eq!(canonical_file_name("{07H}.ab1", &n), "{07H}.ab1");
        assert_eq!(canonical_file_name("01A__.ab1", &n), "01A__.ab1");
        assert_eq!(canonical_file_name("{01A}Gene_Premixed{I-1}.ab1", &n), "Gene.ab1");
    }
}
