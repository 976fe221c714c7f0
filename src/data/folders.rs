//! Folder naming conventions under the data folder.
//!
//! ```text
//! <data>/
//!   RunFolder-20000/                      canonical run container
//!     RunFolder-20000_Smith_100001/       order folder
//!       Alternate Injections/             collision holding area
//!     Controls/
//!     Blank/
//!   PCRFolder-PCR12/                      PCR product folder
//!   Not Ready/                            parked incomplete orders
//! ```

/// Prefix of run and order folders.
pub const RUN_FOLDER_PREFIX: &str = "RunFolder-";
/// Prefix of PCR product folders.
pub const PCR_FOLDER_PREFIX: &str = "PCRFolder-";
/// Control destination inside a run folder.
pub const CONTROLS: &str = "Controls";
/// Blank destination inside a run folder.
pub const BLANK: &str = "Blank";
/// Collision holding area inside any destination.
pub const ALTERNATE_INJECTIONS: &str = "Alternate Injections";
/// Holding area for incomplete orders, directly under the data folder.
pub const NOT_READY: &str = "Not Ready";

/// Subfolders the run-folder cleanup knows how to merge.
pub const WELL_KNOWN_SUBFOLDERS: [&str; 3] = [CONTROLS, BLANK, ALTERNATE_INJECTIONS];
