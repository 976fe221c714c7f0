//! Sample-name normalization.
//!
//! Reaction files and order-key rows spell the same sample differently: the
//! instrument software rewrites punctuation when it exports the plate, and lab
//! staff annotate file names with `{...}` groups (well, run, order, PCR or
//! reinject tags). Both sides are pushed through the same [`NameNormalizer`]
//! so that they compare equal.
//!
//! # Transforms
//! 1. [`adjust_chars`]: fixed character substitution table.
//! 2. [`NameNormalizer::strip_annotations`]: drop neutralized suffixes and every
//!    `{...}` group.
//! 3. [`strip_extension`]: drop a trailing `.ab1` (filesystem names only).
//!
//! [`NameNormalizer::normalize`] composes them and is idempotent.
//!
//! # Examples
//! ```
//! use capsort::naming::NameNormalizer;
//! let n = NameNormalizer::default();
//! assert_eq!(n.normalize("{01A}Gene X_M13F_Premixed{I-20000}.ab1", true), "GeneX_M13F");
//! assert_eq!(n.normalize("Gene X/M13F", false), "GeneX-M13F");
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::config::IntakeConfig;
use crate::data::{controls, markers};

static BRACE_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^}]*)\}").expect("static regex"));
static RUN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:i|bioi|run|runfolder)-(\d+)$").expect("static regex"));
static ORDER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(?:o|order)-(\d+)$").expect("static regex"));

/// Apply the instrument's character substitution table.
///
/// Spaces, quotes, `?` and `,` are removed; `+` becomes `&`; `* | / \ : < >`
/// become `-`. The output never contains an input character of the table, so
/// applying it twice is a no-op.
pub fn adjust_chars(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            ' ' | '"' | '\'' | '?' | ',' => {}
            '+' => out.push('&'),
            '*' | '|' | '/' | '\\' | ':' | '<' | '>' => out.push('-'),
            other => out.push(other),
        }
    }
    out
}

/// Remove trailing `.ab1` extensions (case-insensitive).
pub fn strip_extension(name: &str) -> &str {
    let ext = markers::AB1_EXTENSION;
    let mut s = name;
    while s.len() >= ext.len() && s.is_char_boundary(s.len() - ext.len()) && s[s.len() - ext.len()..].eq_ignore_ascii_case(ext) {
        s = &s[..s.len() - ext.len()];
    }
    s
}

/// `true` if the name ends with `.ab1` (case-insensitive).
pub fn is_ab1(name: &str) -> bool {
    strip_extension(name).len() != name.len()
}

/// `true` if the name carries any brace annotation.
pub fn has_braces(name: &str) -> bool {
    name.contains('{') || name.contains('}')
}

/// Turns raw sample names into a canonical comparable form.
#[derive(Clone, Debug)]
pub struct NameNormalizer {
    suffixes: Vec<String>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(controls::NEUTRALIZED_SUFFIXES.iter().map(|s| s.to_string()).collect())
    }
}

impl NameNormalizer {
    /// Build a normalizer removing the given suffixes.
    pub fn new(suffixes: Vec<String>) -> Self {
        let suffixes = suffixes.into_iter().filter(|s| !s.is_empty()).collect();
        Self { suffixes }
    }

    /// Build from the configured suffix list.
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self::new(config.neutralized_suffixes.clone())
    }

    /// Drop neutralized suffixes, then every `{...}` group; repeated until stable.
    ///
    /// `"{01A}Sample_Primer_RTI{5_25}{I-12345}.ab1"` becomes `"Sample_Primer.ab1"`.
    pub fn strip_annotations(&self, name: &str) -> String {
        let mut cur = name.to_string();
        loop {
            let mut next = cur.clone();
            for s in &self.suffixes {
                next = next.replace(s.as_str(), "");
            }
            let next = BRACE_GROUP.replace_all(&next, "").into_owned();
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }

    /// Full normalization used for matching.
    ///
    /// `strip_ext` is `true` for filesystem names and `false` for order-key names.
    pub fn normalize(&self, raw: &str, strip_ext: bool) -> String {
        let mut cur = raw.to_string();
        loop {
            let mut next = self.strip_annotations(&adjust_chars(&cur));
            if strip_ext {
                next = strip_extension(&next).to_string();
            }
            if next == cur {
                return cur;
            }
            cur = next;
        }
    }
}

/// The `{...}` groups found in a raw file name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations {
    groups: Vec<String>,
}

impl Annotations {
    /// Collect every brace group, in order of appearance.
    pub fn parse(raw: &str) -> Self {
        let groups = BRACE_GROUP.captures_iter(raw).map(|c| c[1].trim().to_string()).collect();
        Self { groups }
    }

    /// Raw group contents, without braces.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Run identifier tagged as `{I-20000}`, `{BioI-20000}` or `{RunFolder-20000}`.
    pub fn run_tag(&self) -> Option<&str> {
        self.groups.iter().find_map(|g| RUN_TAG.captures(g).and_then(|c| c.get(1)).map(|m| m.as_str()))
    }

    /// Order number tagged as `{O-100001}` or `{Order-100001}`.
    pub fn order_tag(&self) -> Option<&str> {
        self.groups.iter().find_map(|g| ORDER_TAG.captures(g).and_then(|c| c.get(1)).map(|m| m.as_str()))
    }
}
