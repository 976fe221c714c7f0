//! Artifact names left behind by the external base-caller.
//!
//! The base-caller writes a fixed project layout into every folder it processes.
//! Its presence is the only durable record that a folder was handed off, so the
//! readiness gate keys on these names rather than on any state of its own.
//!
//! - **Processing markers**: three project subfolders plus the project ini.
//!   All four present means the folder has been processed.
//! - **Output suffixes**: the five per-project text exports. All five present
//!   means the hand-off completed with usable reads.

/// Subfolder/file names that only exist after the worker ran on a folder.
pub const PROCESSING_MARKERS: [&str; 4] = ["chromat_dir", "edit_dir", "phd_dir", "mseq4.ini"];

/// Text exports written on successful completion.
///
/// Order matters: `.raw.seq.txt` also ends with `.seq.txt`, so a file is
/// attributed to the first suffix it matches.
pub const OUTPUT_SUFFIXES: [&str; 5] = [
    ".raw.qual.txt",
    ".raw.seq.txt",
    ".seq.info.txt",
    ".seq.qual.txt",
    ".seq.txt",
];

/// Raw capillary read extension.
pub const AB1_EXTENSION: &str = ".ab1";

/// Fragment-analysis trace extension; folders holding these are not sequencing orders.
pub const FSA_EXTENSION: &str = ".fsa";
