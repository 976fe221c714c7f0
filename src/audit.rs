//! Order audit.
//!
//! Cross-checks every order folder against the order key: which expected
//! samples have a reaction file, which are missing, which files do not belong
//! to the order, and whether the worker's text exports are all there.

use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::IntakeConfig;
use crate::data::folders;
use crate::error::{IntakeError, Result};
use crate::fsops::FsOps;
use crate::naming::{self, NameNormalizer};
use crate::order_key::OrderKeyIndex;
use crate::readiness::{FolderKind, FolderSnapshot, OrderReadinessTracker};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditStatus {
    Completed,
    Attention,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuditStatus::Completed => "Completed",
            AuditStatus::Attention => "Attention",
        })
    }
}

/// Audit of one order folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderAudit {
    pub folder: PathBuf,
    pub run_id: String,
    pub account: String,
    pub order_number: String,
    pub expected: usize,
    pub matched: usize,
    /// Key sample names with no reaction file.
    pub missing: Vec<String>,
    /// Reaction files with no key entry in this order.
    pub unexpected: Vec<String>,
    pub outputs_present: BTreeSet<String>,
    pub handoff_exempt: bool,
    pub status: AuditStatus,
}

/// Audit one order folder.
///
/// `Completed` needs every expected sample matched and, unless the account is
/// completeness-only, every output suffix present.
pub fn audit_folder(
    folder: &Path,
    key: &OrderKeyIndex,
    config: &IntakeConfig,
    normalizer: &NameNormalizer,
    fs: &mut FsOps,
) -> Result<Option<OrderAudit>> {
    let name = folder.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let Some(FolderKind::Order { run_id, account, order_number }) = FolderKind::parse(name) else {
        return Ok(None);
    };
    let entries = fs.list(folder)?.to_vec();
    let snapshot = FolderSnapshot::from_entries(&entries, config);

    let mut files: Vec<(String, String)> = entries
        .iter()
        .filter(|e| !e.is_dir && naming::is_ab1(&e.name))
        .map(|e| (normalizer.normalize(&e.name, true), e.name.clone()))
        .collect();

    let mut missing = Vec::new();
    let mut matched = 0;
    let expected: Vec<_> = key.entries_for_order(&order_number).collect();
    for entry in &expected {
        let want = normalizer.normalize(&entry.raw_sample_name, false);
        match files.iter().position(|(n, _)| *n == want) {
            Some(i) => {
                files.swap_remove(i);
                matched += 1;
            }
            None => missing.push(entry.raw_sample_name.clone()),
        }
    }
    let expected_len = expected.len();
    let mut unexpected: Vec<String> = files.into_iter().map(|(_, raw)| raw).collect();
    unexpected.sort();

    let handoff_exempt = config.is_completeness_only(&account);
    let outputs_ok = handoff_exempt || snapshot.outputs_present.len() == snapshot.outputs_expected;
    let status = if expected_len > 0 && missing.is_empty() && outputs_ok {
        AuditStatus::Completed
    } else {
        AuditStatus::Attention
    };

    Ok(Some(OrderAudit {
        folder: folder.to_path_buf(),
        run_id,
        account,
        order_number,
        expected: expected_len,
        matched,
        missing,
        unexpected,
        outputs_present: snapshot.outputs_present,
        handoff_exempt,
        status,
    }))
}

/// Audit every order folder under `data_folder`, including parked ones.
pub fn audit_data_folder(data_folder: &Path, key: &OrderKeyIndex, config: &IntakeConfig) -> Result<Vec<OrderAudit>> {
    if !data_folder.is_dir() {
        return Err(IntakeError::InvalidDataFolder(data_folder.to_path_buf()));
    }
    let normalizer = NameNormalizer::from_config(config);
    let mut fs = FsOps::new();
    let tracker = OrderReadinessTracker::new(key, config);

    let mut folders_to_check = tracker.active_folders(data_folder, &mut fs)?;
    let not_ready = data_folder.join(folders::NOT_READY);
    if not_ready.is_dir() {
        folders_to_check.extend(fs.subdirs(&not_ready)?.into_iter().map(|n| not_ready.join(n)));
    }

    let mut out = Vec::new();
    for f in folders_to_check {
        if let Some(a) = audit_folder(&f, key, config, &normalizer, &mut fs)? {
            out.push(a);
        }
    }
    let attention = out.iter().filter(|a| a.status == AuditStatus::Attention).count();
    info!("Audited {} order folder(s), {} need attention", out.len(), attention);
    Ok(out)
}

/// Write the audit as tab-delimited text with a header row.
pub fn write_tsv<W: Write>(audits: &[OrderAudit], out: W) -> std::result::Result<(), csv::Error> {
    let mut w = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
    w.write_record([
        "run_id", "account", "order", "expected", "matched", "missing", "unexpected", "outputs", "exempt", "status",
    ])?;
    for a in audits {
        w.write_record([
            a.run_id.clone(),
            a.account.clone(),
            a.order_number.clone(),
            a.expected.to_string(),
            a.matched.to_string(),
            a.missing.join(";"),
            a.unexpected.join(";"),
            a.outputs_present.iter().cloned().collect::<Vec<_>>().join(";"),
            a.handoff_exempt.to_string(),
            a.status.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}
