//! Default control-sample names.
//!
//! Controls are run on every plate (positive pGEM template, negative water) and
//! are matched after annotation and extension stripping, case-insensitively.
//! Sites override this list through `control_names` in the config file.

/// Built-in control list.
pub const CONTROL_NAMES: &[&str] = &[
    "pGEM",
    "pGEM_M13F",
    "pGEM_M13F-20",
    "pGEM_M13R",
    "pGEM_M13R-27",
    "pGEM_T7",
    "pGEM_T7Promoter",
    "pGEM_SP6",
    "water",
    "water_M13F",
    "water_M13F-20",
    "water_M13R",
    "water_M13R-27",
    "water_T7",
];

/// Substrings removed before comparison (ordering options, not sample identity).
pub const NEUTRALIZED_SUFFIXES: &[&str] = &["_Premixed", "_RTI"];

/// Raw-name marker for a scheduled (preemptive) reinject.
pub const PREEMPTIVE_MARKER: &str = "{!P}";
