//! History ledger integration tests.

use std::fs;

use chrono::{Local, TimeZone};
use shotalign::{
    FrameSet, FrameSetGenerator, FrameSetOrigin, HistoryOrigin, HistoryStore, OutputRoot,
    ShotAlignError,
};

fn touch(root: &OutputRoot, folder: &str, names: &[&str]) {
    let directory = root.path().join(folder);
    fs::create_dir_all(&directory).expect("Failed to create run directory");
    for name in names {
        fs::write(directory.join(name), b"").expect("Failed to write file");
    }
}

#[test]
fn ledger_survives_reopen() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ledger = directory.path().join("nested/history.json");

    {
        let mut history = HistoryStore::open(&ledger).unwrap();
        assert!(history.is_empty());
        history
            .record(&FrameSet::from_frames(vec![5, 1, 3]), "first pass")
            .unwrap();
        history
            .record_run(&FrameSet::from_frames(vec![42]), "20240101_120000")
            .unwrap();
    }

    let history = HistoryStore::open(&ledger).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.find("first pass").unwrap().frames, vec![1, 3, 5]);

    let run = history.find("20240101_120000 (1 frames)").unwrap();
    assert_eq!(run.folder.as_deref(), Some("20240101_120000"));
    assert_eq!(run.origin, HistoryOrigin::Recorded);
}

#[test]
fn corrupt_ledger_is_reported() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let ledger = directory.path().join("history.json");
    fs::write(&ledger, "{ not json").unwrap();

    assert!(matches!(
        HistoryStore::open(&ledger),
        Err(ShotAlignError::Json(_))
    ));
}

#[test]
fn scan_imports_unknown_directories_once() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let root = OutputRoot::new(directory.path().join("screenshots"));
    touch(
        &root,
        "20240131_235958",
        &["000250_000246_VerA.png", "000100_000096_VerA.png", "000100_000120_VerB.png"],
    );
    touch(&root, "20240201_080000", &["000007_000008_A.png"]);
    touch(&root, "scratch", &["notes.txt"]);

    let mut history = HistoryStore::open(directory.path().join("history.json")).unwrap();
    history
        .record_run(&FrameSet::from_frames(vec![7]), "20240201_080000")
        .unwrap();

    assert_eq!(history.reconstruct_from_outputs(&root).unwrap(), 1);
    assert_eq!(history.reconstruct_from_outputs(&root).unwrap(), 0);

    let recovered = history.find("20240131_235958 (2 frames)").unwrap();
    assert_eq!(recovered.frames, vec![100, 250]);
    assert_eq!(recovered.origin, HistoryOrigin::Recovered);
    assert_eq!(
        recovered.created_at,
        Local.with_ymd_and_hms(2024, 1, 31, 23, 59, 58).unwrap()
    );
    assert_eq!(history.len(), 2);
}

#[test]
fn prune_drops_deleted_directories() {
    let directory = tempfile::tempdir().expect("Failed to create temp dir");
    let root = OutputRoot::new(directory.path());
    touch(&root, "20240101_000000", &["000001_000001_A.png"]);
    touch(&root, "20240102_000000", &["000002_000002_A.png"]);

    let mut history = HistoryStore::in_memory();
    history.reconstruct_from_outputs(&root).unwrap();
    history.record(&FrameSet::from_frames(vec![9]), "manual").unwrap();

    fs::remove_dir_all(directory.path().join("20240101_000000")).unwrap();
    assert_eq!(history.prune_missing(&root).unwrap(), 1);

    let labels: Vec<&str> = history.list().iter().map(|entry| entry.label.as_str()).collect();
    assert_eq!(labels, vec!["20240102_000000 (1 frames)", "manual"]);
    assert!(history.forget_folder("20240102_000000").unwrap());
    assert!(!history.forget_folder("20240102_000000").unwrap());
}

#[test]
fn replay_reproduces_recorded_frames() {
    let mut generator = FrameSetGenerator::with_seed(11);
    let original = generator.generate(40_000, 8, 1_000, 30_000).unwrap();

    let mut history = HistoryStore::in_memory();
    history.record(&original, "baseline").unwrap();

    let replayed = generator.replay(history.find("baseline").unwrap());
    assert_eq!(replayed.frames(), original.frames());
    assert_eq!(replayed.origin(), FrameSetOrigin::Replayed);
}
