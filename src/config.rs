//! Intake configuration.
//!
//! All tables and lists the engine needs (control names, artifact markers,
//! reinject locations) live in one immutable [`IntakeConfig`] that is built
//! once and handed to each component's constructor.
//!
//! # Sources, highest priority first
//! 1. `--config <FILE>` on the command line
//! 2. `CAPSORT_CONFIG` environment variable
//! 3. `./capsort.toml` in the working directory, if present
//! 4. Built-in defaults
//!
//! Every key is optional; an empty file yields [`IntakeConfig::default`].
//!
//! ```toml
//! key_file = "P:/order_key.txt"
//! reinject_dirs = ["P:/Data/Reinjects"]
//! reinject_window_days = 7
//! completeness_only_accounts = ["andreev"]
//!
//! [logging]
//! level = "debug"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::{controls, markers};
use crate::error::{IntakeError, Result};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "CAPSORT_CONFIG";
/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "capsort.toml";

/// Engine configuration. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntakeConfig {
    /// Order key path; the CLI `--key` flag overrides it.
    pub key_file: Option<PathBuf>,
    /// Directories scanned for reinject worksheets.
    pub reinject_dirs: Vec<PathBuf>,
    /// Only worksheets modified within this many days are read.
    pub reinject_window_days: u32,
    /// First worksheet row holding a sample (1-indexed, inclusive).
    pub reinject_first_row: usize,
    /// Last worksheet row holding a sample (1-indexed, inclusive).
    pub reinject_last_row: usize,
    /// Worksheet column holding the raw sample name (1-indexed).
    pub reinject_name_column: usize,
    /// Raw-name marker of a preemptive reinject.
    pub preemptive_marker: String,
    /// Control sample names, compared case-insensitively.
    pub control_names: Vec<String>,
    /// Substrings removed during annotation stripping.
    pub neutralized_suffixes: Vec<String>,
    /// Artifacts whose complete presence marks a folder as processed.
    pub processing_markers: Vec<String>,
    /// The five text exports written by a successful hand-off.
    pub output_suffixes: Vec<String>,
    /// Accounts whose orders are count-checked but never handed off.
    pub completeness_only_accounts: Vec<String>,
    /// Logging options for the binary.
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            key_file: None,
            reinject_dirs: Vec::new(),
            reinject_window_days: 7,
            reinject_first_row: 6,
            reinject_last_row: 101,
            reinject_name_column: 2,
            preemptive_marker: controls::PREEMPTIVE_MARKER.to_string(),
            control_names: controls::CONTROL_NAMES.iter().map(|s| s.to_string()).collect(),
            neutralized_suffixes: controls::NEUTRALIZED_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            processing_markers: markers::PROCESSING_MARKERS.iter().map(|s| s.to_string()).collect(),
            output_suffixes: markers::OUTPUT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            completeness_only_accounts: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where the active config was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    WorkingDirectory(PathBuf),
    Defaults,
}

impl ConfigSource {
    /// First hit in priority order. `env_value` is the raw `CAPSORT_CONFIG` value.
    pub fn locate(cli_path: Option<&Path>, env_value: Option<String>) -> Self {
        if let Some(p) = cli_path {
            return Self::CommandLine(p.to_path_buf());
        }
        if let Some(p) = env_value.filter(|v| !v.trim().is_empty()) {
            return Self::Environment(PathBuf::from(p));
        }
        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::WorkingDirectory(local.to_path_buf());
        }
        Self::Defaults
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::CommandLine(p) | Self::Environment(p) | Self::WorkingDirectory(p) => Some(p),
            Self::Defaults => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandLine(p) => write!(f, "command line: {}", p.display()),
            Self::Environment(p) => write!(f, "{}: {}", CONFIG_ENV, p.display()),
            Self::WorkingDirectory(p) => write!(f, "{}", p.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

impl IntakeConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: IntakeConfig = toml::from_str(s).map_err(|e| IntakeError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IntakeError::io(path, e))?;
        Self::from_toml_str(&text).map_err(|e| match e {
            IntakeError::Config(msg) => IntakeError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Resolve the config from CLI argument → environment → working directory → defaults.
    ///
    /// Returns where the config came from so the caller can log it once logging is up.
    pub fn resolve(cli_path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let source = ConfigSource::locate(cli_path, std::env::var(CONFIG_ENV).ok());
        let config = match source.path() {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok((config, source))
    }

    fn validate(&self) -> Result<()> {
        if self.reinject_first_row == 0 || self.reinject_name_column == 0 {
            return Err(IntakeError::Config("reinject rows and columns are 1-indexed".into()));
        }
        if self.reinject_last_row < self.reinject_first_row {
            return Err(IntakeError::Config(format!(
                "reinject_last_row ({}) is before reinject_first_row ({})",
                self.reinject_last_row, self.reinject_first_row
            )));
        }
        if self.processing_markers.is_empty() {
            return Err(IntakeError::Config("processing_markers must not be empty".into()));
        }
        Ok(())
    }

    /// `true` if orders for this account are never handed to the worker.
    pub fn is_completeness_only(&self, account: &str) -> bool {
        let a = account.to_ascii_lowercase();
        self.completeness_only_accounts.iter().any(|c| a.contains(&c.to_ascii_lowercase()))
    }
}
