#![forbid(unsafe_code)]
//! # capsort
//!
//! Intake of capillary-electrophoresis reaction files (`.ab1`) for a Sanger
//! sequencing service: classify each reaction, route it to its customer order
//! folder using the daily order key, keep duplicates and reinjects out of the
//! main slot, and gate order folders for hand-off to the base-calling worker.
//!
//! ## Pipeline
//! - [`order_key::OrderKeyIndex`]: tab-delimited order key, indexed by normalized sample name.
//! - [`naming::NameNormalizer`]: makes file names and key names comparable.
//! - [`classify::ReactionClassifier`]: PCR, blank, control or customer.
//! - [`reinject::ReinjectRegistry`]: recent reinject worksheets.
//! - [`resolve::DestinationResolver`]: destination folder and multi-match tie-breaks.
//! - [`placement::PlacementPolicy`]: main slot vs `Alternate Injections`.
//! - [`readiness::OrderReadinessTracker`]: `NotReady` / `ReadyForProcessing` / `Processed`.
//! - [`lifecycle`]: run-folder canonicalisation and cleanup.
//! - [`intake::IntakeEngine`]: drives a full sorting pass.
//!
//! ## Example
//! ```rust
//! use capsort::{IntakeConfig, ReactionClass, ReactionClassifier};
//! let c = ReactionClassifier::from_config(&IntakeConfig::default());
//! assert_eq!(c.classify("01A__.ab1"), ReactionClass::Blank);
//! assert_eq!(c.classify("{pcr12_exp1}GeneY.ab1"), ReactionClass::Pcr { pcr_number: "PCR12".into() });
//! assert_eq!(c.classify("GeneX_M13F.ab1"), ReactionClass::Customer);
//! ```

pub mod audit;
pub mod classify;
pub mod config;
pub mod error;
pub mod fsops;
pub mod intake;
pub mod lifecycle;
pub mod naming;
pub mod order_key;
pub mod placement;
pub mod readiness;
pub mod reinject;
pub mod resolve;
pub mod data { pub mod controls; pub mod folders; pub mod markers; }

pub use classify::{ReactionClass, ReactionClassifier, ReactionFile};
pub use config::{ConfigSource, IntakeConfig};
pub use error::{IntakeError, KeyLoadError, Result};
pub use intake::{IntakeEngine, SortSummary};
pub use lifecycle::CleanupReport;
pub use naming::NameNormalizer;
pub use order_key::{OrderKeyEntry, OrderKeyIndex};
pub use placement::{Placement, PlacementKind, PlacementPolicy};
pub use readiness::{HandoffOutcome, OrderReadinessTracker, ReadinessAssessment, ReadinessReport, ReadinessState};
pub use reinject::{ReinjectRecord, ReinjectRegistry};
pub use resolve::{Destination, DestinationResolver, Resolution, RunContext, TieBreak};

/// Crate version, for log banners and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
