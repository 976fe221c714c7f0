use std::fs;
use std::path::{Path, PathBuf};

use capsort::readiness::HandoffOutcome;
use capsort::{
    IntakeConfig, IntakeEngine, KeyLoadError, NameNormalizer, OrderKeyIndex, PlacementKind, ReactionClass,
    ReactionClassifier, ReadinessState, ReinjectRegistry,
};

fn write(path: &Path, body: &str) {
    if let Some(p) = path.parent() {
        fs::create_dir_all(p).unwrap();
    }
    fs::write(path, body).unwrap();
}

fn touch_all(dir: &Path, names: &[&str]) {
    for n in names {
        write(&dir.join(n), "");
    }
}

fn key_file(dir: &Path, rows: &[&str]) -> PathBuf {
    let p = dir.join("order_key.txt");
    write(&p, &(rows.join("\n") + "\n"));
    p
}

fn engine(key: &Path, config: IntakeConfig) -> IntakeEngine {
    IntakeEngine::load(config, key).unwrap().0
}

#[test]
fn single_customer_file_is_routed_then_ready_then_processed() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tGeneX_M13F"]);
    touch_all(&data.join("RunFolder-20000"), &["GeneX_M13F.ab1"]);

    let e = engine(&key, IntakeConfig::default());
    let summary = e.sort(&data).unwrap();
    let order = data.join("RunFolder-20000").join("RunFolder-20000_Smith_100001");
    assert_eq!(summary.moved.len(), 1);
    assert_eq!(summary.moved[0].to, order.join("GeneX_M13F.ab1"));
    assert_eq!(summary.moved[0].kind, PlacementKind::Canonical);

    let report = e.readiness(&data).unwrap();
    assert_eq!(report.assessments.len(), 1);
    assert_eq!(report.assessments[0].state, ReadinessState::ReadyForProcessing);
    assert_eq!(report.assessments[0].outcome, HandoffOutcome::Pending);
    assert_eq!(report.handoff_queue().count(), 1);

    for m in ["chromat_dir", "edit_dir", "phd_dir"] {
        fs::create_dir(order.join(m)).unwrap();
    }
    write(&order.join("mseq4.ini"), "");
    let report = e.readiness(&data).unwrap();
    assert_eq!(report.assessments[0].state, ReadinessState::Processed);
    assert_eq!(report.assessments[0].outcome, HandoffOutcome::LowQuality);

    touch_all(&order, &["p.raw.qual.txt", "p.raw.seq.txt", "p.seq.info.txt", "p.seq.qual.txt", "p.seq.txt"]);
    let report = e.readiness(&data).unwrap();
    assert_eq!(report.assessments[0].outcome, HandoffOutcome::Complete);
}

#[test]
fn pcr_file_goes_to_its_pcr_folder() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tGeneX_M13F"]);
    touch_all(&data.join("RunFolder-20000"), &["{pcr12_exp1}GeneY.ab1"]);

    let c = ReactionClassifier::from_config(&IntakeConfig::default());
    assert_eq!(c.classify("{pcr12_exp1}GeneY.ab1"), ReactionClass::Pcr { pcr_number: "PCR12".into() });

    let summary = engine(&key, IntakeConfig::default()).sort(&data).unwrap();
    assert_eq!(summary.moved[0].to, data.join("PCRFolder-PCR12").join("GeneY.ab1"));
}

#[test]
fn three_of_three_is_ready_two_of_three_is_parked() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(
        tmp.path(),
        &["20000\tSmith\t100001\tA", "20000\tSmith\t100001\tB", "20000\tSmith\t100001\tC", "20000\tLee\t100002\tD"],
    );
    let run = data.join("RunFolder-20000");
    let complete = run.join("RunFolder-20000_Smith_100001");
    let partial = run.join("RunFolder-20000_Lee_100002");
    touch_all(&complete, &["A.ab1", "B.ab1", "C.ab1"]);
    fs::create_dir_all(&partial).unwrap();

    let report = engine(&key, IntakeConfig::default()).readiness(&data).unwrap();
    let state_of = |order: &str| {
        report.assessments.iter().find(|a| a.folder.to_string_lossy().ends_with(order)).map(|a| a.state)
    };
    assert_eq!(state_of("_100001"), Some(ReadinessState::ReadyForProcessing));
    assert_eq!(state_of("_100002"), Some(ReadinessState::NotReady));
    assert!(data.join("Not Ready").join("RunFolder-20000_Lee_100002").is_dir());

    // Remove one file: the complete order drops to 2 of 3 and is parked too.
    fs::remove_file(complete.join("C.ab1")).unwrap();
    let report = engine(&key, IntakeConfig::default()).readiness(&data).unwrap();
    assert!(report.parked.iter().any(|(from, _)| from == &complete));
    assert!(data.join("Not Ready").join("RunFolder-20000_Smith_100001").join("A.ab1").is_file());
}

#[test]
fn brace_names_block_readiness_even_with_matching_count() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tA", "20000\tSmith\t100001\tB"]);
    let order = data.join("RunFolder-20000").join("RunFolder-20000_Smith_100001");
    touch_all(&order, &["A.ab1", "{02B}B.ab1"]);

    let report = engine(&key, IntakeConfig::default()).readiness(&data).unwrap();
    assert_eq!(report.assessments[0].state, ReadinessState::NotReady);
    assert!(report.parked.is_empty());
    assert!(order.is_dir());
}

#[test]
fn duplicate_names_divert_the_second_copy() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tGeneX"]);
    touch_all(&data.join("RunFolder-20000"), &["{01A}GeneX.ab1", "{05E}GeneX.ab1"]);

    let summary = engine(&key, IntakeConfig::default()).sort(&data).unwrap();
    let order = data.join("RunFolder-20000").join("RunFolder-20000_Smith_100001");
    assert_eq!(summary.moved_to_main(), 1);
    assert_eq!(summary.diverted(PlacementKind::Collision), 1);
    assert!(order.join("GeneX.ab1").is_file());
    assert!(order.join("Alternate Injections").join("{05E}GeneX.ab1").is_file());
}

#[test]
fn reinjects_divert_unless_preemptive() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let reinject_dir = tmp.path().join("reinjects");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tGeneX", "20000\tSmith\t100001\tGeneY"]);
    let mut sheet = "h\th\n".repeat(5);
    sheet.push_str("A01\tGeneX\nB01\t{!P}GeneY\n");
    write(&reinject_dir.join("Reinject List_20000.txt"), &sheet);
    touch_all(&data.join("RunFolder-20000"), &["GeneX.ab1", "GeneY.ab1"]);

    let config = IntakeConfig { reinject_dirs: vec![reinject_dir], ..IntakeConfig::default() };
    let (e, report) = IntakeEngine::load(config, &key).unwrap();
    assert_eq!(report.worksheets_read.len(), 1);
    let summary = e.sort(&data).unwrap();

    let order = data.join("RunFolder-20000").join("RunFolder-20000_Smith_100001");
    assert_eq!(summary.diverted(PlacementKind::Reinject), 1);
    assert!(order.join("Alternate Injections").join("GeneX.ab1").is_file());
    assert!(!order.join("GeneX.ab1").exists());
    assert!(order.join("GeneY.ab1").is_file());
}

#[test]
fn missing_or_malformed_key_aborts_before_anything_moves() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    touch_all(&data.join("RunFolder-20000"), &["GeneX.ab1"]);

    let err = IntakeEngine::load(IntakeConfig::default(), &tmp.path().join("absent.txt")).unwrap_err();
    assert!(err.is_fatal());
    let bad = key_file(tmp.path(), &["20000\tSmith"]);
    let err = OrderKeyIndex::load(&bad, &NameNormalizer::default()).unwrap_err();
    assert!(matches!(err, KeyLoadError::Malformed { line: 1, .. }));
    assert!(data.join("RunFolder-20000").join("GeneX.ab1").is_file());
}

#[test]
fn stray_run_folder_is_merged_and_removed() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tGeneX", "20000\tSmith\t100001\tGeneY"]);
    touch_all(&data.join("RunFolder-20000"), &["GeneX.ab1"]);
    touch_all(&data.join("2024-05-01_RunFolder-20000_2"), &["GeneY.ab1", "pGEM.ab1"]);

    let summary = engine(&key, IntakeConfig::default()).sort(&data).unwrap();
    let run = data.join("RunFolder-20000");
    assert!(run.join("RunFolder-20000_Smith_100001").join("GeneY.ab1").is_file());
    assert!(run.join("Controls").join("pGEM.ab1").is_file());
    assert!(!data.join("2024-05-01_RunFolder-20000_2").exists());
    assert!(summary.cleanups.iter().any(|c| c.removed));
}

#[test]
fn late_file_joins_parked_order_which_is_then_restored() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let key = key_file(tmp.path(), &["20000\tSmith\t100001\tA", "20000\tSmith\t100001\tB"]);
    touch_all(&data.join("Not Ready").join("RunFolder-20000_Smith_100001"), &["A.ab1"]);
    touch_all(&data.join("RunFolder-20000"), &["B.ab1"]);

    let e = engine(&key, IntakeConfig::default());
    e.sort(&data).unwrap();
    assert!(data.join("Not Ready").join("RunFolder-20000_Smith_100001").join("B.ab1").is_file());

    let report = e.readiness(&data).unwrap();
    assert_eq!(report.restored.len(), 1);
    let home = data.join("RunFolder-20000").join("RunFolder-20000_Smith_100001");
    assert!(home.join("A.ab1").is_file() && home.join("B.ab1").is_file());
}

#[test]
fn reinject_registry_is_optional() {
    let n = NameNormalizer::default();
    assert!(!ReinjectRegistry::empty().is_diverting(&n.normalize("GeneX.ab1", true)));
}
