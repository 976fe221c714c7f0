//! Reaction classification.
//!
//! Each `.ab1` file is assigned to exactly one [`ReactionClass`] from its raw
//! name alone. Rules are evaluated in order and the first match wins:
//!
//! 1. **PCR**: a brace group `{pcr<digits>...}` (case-insensitive) anywhere in the name.
//! 2. **Blank**: a plate blank `01A__.ab1` or a single-reaction blank `{07H}.ab1`.
//! 3. **Control**: the stripped name is on the control list (case-insensitive).
//! 4. **Customer**: everything else, so no reaction is ever dropped silently.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::IntakeConfig;
use crate::naming::{self, Annotations, NameNormalizer};

static PCR_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\{pcr(\d+)[^}]*\}").expect("static regex"));
static PLATE_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{2}[A-H]__\.ab1$").expect("static regex"));
static REACTION_BLANK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\{\d+[A-H]\}\.ab1$").expect("static regex"));

/// Category of a reaction file.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReactionClass {
    /// Customer PCR product; `pcr_number` is e.g. `"PCR12"`.
    Pcr { pcr_number: String },
    /// Empty well.
    Blank,
    /// Lab control reaction.
    Control,
    /// Customer sequencing reaction, resolved through the order key.
    Customer,
}

impl ReactionClass {
    /// Stable lowercase label for tables and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionClass::Pcr { .. } => "pcr",
            ReactionClass::Blank => "blank",
            ReactionClass::Control => "control",
            ReactionClass::Customer => "customer",
        }
    }
}

impl fmt::Display for ReactionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactionClass::Pcr { pcr_number } => write!(f, "pcr({pcr_number})"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// One physical capillary read found in a run folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionFile {
    /// File name exactly as found on disk.
    pub raw_name: String,
    /// Folder the file currently sits in.
    pub source_folder: PathBuf,
    /// Run id from a filename tag, if any.
    pub run_id: Option<String>,
    /// Name after normalization (extension stripped); the matching key.
    pub normalized: String,
    /// Assigned category.
    pub class: ReactionClass,
}

impl ReactionFile {
    /// Current full path.
    pub fn path(&self) -> PathBuf {
        self.source_folder.join(&self.raw_name)
    }
}

/// Extract `"PCR<digits>"` from a brace-delimited PCR tag.
///
/// ```
/// assert_eq!(capsort::classify::pcr_number("{pcr12_exp1}GeneY.ab1").as_deref(), Some("PCR12"));
/// assert_eq!(capsort::classify::pcr_number("GeneY_pcr12.ab1"), None);
/// ```
pub fn pcr_number(raw_name: &str) -> Option<String> {
    PCR_TAG.captures(raw_name).map(|c| format!("PCR{}", &c[1]))
}

/// `true` for plate blanks (`01A__.ab1`) and single-reaction blanks (`{07H}.ab1`).
pub fn is_blank(raw_name: &str) -> bool {
    PLATE_BLANK.is_match(raw_name) || REACTION_BLANK.is_match(raw_name)
}

/// Ordered-rule classifier.
#[derive(Clone, Debug)]
pub struct ReactionClassifier {
    normalizer: NameNormalizer,
    controls: HashSet<String>,
}

impl ReactionClassifier {
    pub fn new(normalizer: NameNormalizer, control_names: &[String]) -> Self {
        let controls = control_names.iter().map(|c| c.to_lowercase()).collect();
        Self { normalizer, controls }
    }

    pub fn from_config(config: &IntakeConfig) -> Self {
        Self::new(NameNormalizer::from_config(config), &config.control_names)
    }

    /// Category for a raw file name.
    pub fn classify(&self, raw_name: &str) -> ReactionClass {
        if let Some(pcr_number) = pcr_number(raw_name) {
            return ReactionClass::Pcr { pcr_number };
        }
        if is_blank(raw_name) {
            return ReactionClass::Blank;
        }
        let stripped = self.normalizer.strip_annotations(raw_name);
        let stem = naming::strip_extension(&stripped).to_lowercase();
        if self.controls.contains(&stem) {
            return ReactionClass::Control;
        }
        ReactionClass::Customer
    }

    /// Classify a file found in `folder`.
    pub fn reaction_file(&self, folder: &Path, raw_name: &str) -> ReactionFile {
        ReactionFile {
            raw_name: raw_name.to_string(),
            source_folder: folder.to_path_buf(),
            run_id: Annotations::parse(raw_name).run_tag().map(str::to_string),
            normalized: self.normalizer.normalize(raw_name, true),
            class: self.classify(raw_name),
        }
    }

    pub fn normalizer(&self) -> &NameNormalizer {
        &self.normalizer
    }
}
