//! Order key loading and lookup.
//!
//! The order key is a tab-delimited export with one row per expected reaction:
//!
//! ```text
//! runId   accountName   orderNumber   rawSampleName   [ignored columns...]
//! 20000   Smith         100001        GeneX_M13F
//! ```
//!
//! Rows are parsed once into typed [`OrderKeyEntry`] records and indexed by the
//! normalized sample name. A name may map to several entries (same sample
//! ordered twice); the resolver breaks those ties.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::KeyLoadError;
use crate::naming::NameNormalizer;

/// One expected reaction from the order key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKeyEntry {
    /// Run identifier (digits only when the column carries a prefix such as `BioI-`).
    pub run_id: String,
    /// Customer account name.
    pub account: String,
    /// Order number.
    pub order_number: String,
    /// Sample name as typed by the customer.
    pub raw_sample_name: String,
}

/// Lookup from normalized sample name to candidate order entries.
#[derive(Clone, Debug, Default)]
pub struct OrderKeyIndex {
    entries: Vec<OrderKeyEntry>,
    by_name: HashMap<String, Vec<usize>>,
    by_order: HashMap<String, usize>,
}

/// Reduce `BioI-20000` / `RunFolder-20000` / ` 20000 ` to `20000`.
pub(crate) fn canonical_run_id(s: &str) -> String {
    let t = s.trim();
    match t.rfind('-') {
        Some(i) if t[i + 1..].chars().all(|c| c.is_ascii_digit()) && i + 1 < t.len() => t[i + 1..].to_string(),
        _ => t.to_string(),
    }
}

impl OrderKeyIndex {
    /// Load a tab-delimited key file.
    ///
    /// Missing files, unreadable files and rows with fewer than four columns
    /// (or an empty order number / sample name) are errors; the caller must
    /// abort rather than sort against a partial key. Blank lines are skipped.
    pub fn load(path: &Path, normalizer: &NameNormalizer) -> Result<Self, KeyLoadError> {
        if !path.is_file() {
            return Err(KeyLoadError::Missing(path.to_path_buf()));
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_path(path)
            .map_err(|source| KeyLoadError::Read { path: path.to_path_buf(), source })?;

        let mut entries = Vec::new();
        for rec in rdr.records() {
            let r = rec.map_err(|source| KeyLoadError::Read { path: path.to_path_buf(), source })?;
            let line = r.position().map(|p| p.line()).unwrap_or(0);
            if r.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            if r.len() < 4 {
                return Err(KeyLoadError::Malformed {
                    path: path.to_path_buf(),
                    line,
                    reason: format!("expected at least 4 tab-separated columns, found {}", r.len()),
                });
            }
            let entry = OrderKeyEntry {
                run_id: canonical_run_id(&r[0]),
                account: r[1].trim().to_string(),
                order_number: r[2].trim().to_string(),
                raw_sample_name: r[3].trim().to_string(),
            };
            if entry.order_number.is_empty() || entry.raw_sample_name.is_empty() {
                return Err(KeyLoadError::Malformed {
                    path: path.to_path_buf(),
                    line,
                    reason: "empty order number or sample name".to_string(),
                });
            }
            entries.push(entry);
        }
        let index = Self::from_entries(entries, normalizer);
        info!("Loaded order key {} ({} reactions, {} orders)", path.display(), index.len(), index.by_order.len());
        Ok(index)
    }

    /// Build an index from already-typed entries, preserving their order.
    pub fn from_entries(entries: Vec<OrderKeyEntry>, normalizer: &NameNormalizer) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_order: HashMap<String, usize> = HashMap::new();
        for (i, e) in entries.iter().enumerate() {
            let key = normalizer.normalize(&e.raw_sample_name, false);
            by_name.entry(key).or_default().push(i);
            *by_order.entry(e.order_number.clone()).or_insert(0) += 1;
        }
        let ambiguous = by_name.values().filter(|v| v.len() > 1).count();
        if ambiguous > 0 {
            debug!("{} sample names map to more than one order entry", ambiguous);
        }
        Self { entries, by_name, by_order }
    }

    /// Candidates for a normalized name, in key-file order.
    pub fn lookup(&self, normalized: &str) -> Vec<&OrderKeyEntry> {
        self.by_name
            .get(normalized)
            .map(|ix| ix.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    /// Number of reactions expected for an order.
    pub fn expected_count(&self, order_number: &str) -> usize {
        self.by_order.get(order_number).copied().unwrap_or(0)
    }

    /// All entries of one order, in key-file order.
    pub fn entries_for_order<'a>(&'a self, order_number: &'a str) -> impl Iterator<Item = &'a OrderKeyEntry> + 'a {
        self.entries.iter().filter(move |e| e.order_number == order_number)
    }

    /// Distinct run ids present in the key.
    pub fn run_ids(&self) -> Vec<String> {
        let mut v: Vec<String> = self.entries.iter().map(|e| e.run_id.clone()).collect();
        v.sort();
        v.dedup();
        v
    }

    /// Every entry, in key-file order.
    pub fn entries(&self) -> &[OrderKeyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod order_key_tests {
    use super::*;
    use std::io::Write;

    fn write_key(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let p = dir.path().join("order_key.txt");
        let mut f = std::fs::File::create(&p).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        p
    }

    #[test]
    fn loads_rows_and_groups_by_normalized_name() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_key(
            &dir,
            "20000\tSmith\t100001\tGeneX_M13F\textra\n\
             20000\tSmith\t100001\tGene Y/M13R\n\
             \n\
             BioI-20001\tJones\t100002\tGeneX_M13F\n",
        );
        let idx = OrderKeyIndex::load(&p, &NameNormalizer::default()).unwrap();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.expected_count("100001"), 2);
        assert_eq!(idx.expected_count("999999"), 0);
        let hits = idx.lookup("GeneX_M13F");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].account, "Smith");
        assert_eq!(hits[1].run_id, "20001");
        assert_eq!(idx.lookup("GeneY-M13R").len(), 1);
        assert!(idx.lookup("nothing").is_empty());
        assert_eq!(idx.run_ids(), vec!["20000".to_string(), "20001".to_string()]);
    }

    #[test]
    fn missing_file_is_fatal() {
        let r = OrderKeyIndex::load(Path::new("/nope/order_key.txt"), &NameNormalizer::default());
        assert!(matches!(r, Err(KeyLoadError::Missing(_))));
    }

    #[test]
    fn short_row_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_key(&dir, "20000\tSmith\t100001\tA\n20000\tSmith\n");
        match OrderKeyIndex::load(&p, &NameNormalizer::default()) {
            Err(KeyLoadError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn canonical_run_ids() {
        assert_eq!(canonical_run_id("BioI-20000"), "20000");
        assert_eq!(canonical_run_id(" 20000 "), "20000");
        assert_eq!(canonical_run_id("RunFolder-7"), "7");
        assert_eq!(canonical_run_id("abc-"), "abc-");
    }
}
