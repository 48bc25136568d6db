use std::fs;
use std::io::Write;

use chrono::{DateTime, Duration, Utc};

use context_dag::compile::CompileRequest;
use context_dag::config::HistoryConfig;
use context_dag::content::Content;
use context_dag::error::{ErrorKind, HistoryError, StoreError};
use context_dag::history::History;
use context_dag::store::{BlobStore, CommitStore, FileBackend};
use context_dag::types::Priority;
use context_dag::SteppingClock;

fn open(root: &std::path::Path) -> History<FileBackend> {
    let backend = FileBackend::open(root).unwrap();
    History::open(backend, HistoryConfig::v0())
        .unwrap()
        .with_clock(SteppingClock::from_epoch())
}

/// Reopen with a clock that starts after everything the first session wrote.
fn reopen_later(root: &std::path::Path) -> History<FileBackend> {
    let start = DateTime::<Utc>::UNIX_EPOCH + Duration::hours(1);
    open(root).with_clock(SteppingClock::new(start, Duration::seconds(1)))
}

#[test]
fn history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, compiled) = {
        let mut h = open(dir.path());
        let a = h.append(Content::instruction("sys")).unwrap();
        let b = h.append(Content::user("hello")).unwrap();
        h.create_branch("feature", None, false).unwrap();
        h.annotate(&a, Priority::Pinned, Some("policy".into())).unwrap();
        let compiled = h.compile(&CompileRequest::new()).unwrap();
        (a, b, compiled)
    };

    let h = open(dir.path());
    assert_eq!(h.tip().unwrap(), Some(b.clone()));
    assert_eq!(h.branch_tip("feature").unwrap(), b);
    assert_eq!(h.priority_of(&a).unwrap(), Priority::Pinned);
    assert_eq!(h.annotations(&a).unwrap().len(), 1);
    assert_eq!(h.compile(&CompileRequest::new()).unwrap(), compiled);
}

#[test]
fn blobs_are_deduplicated_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(dir.path());
    h.append(Content::user("same")).unwrap();
    h.append(Content::user("same")).unwrap();

    assert_eq!(h.backend().blob_count().unwrap(), 1);
    assert_eq!(h.backend().commit_hashes().unwrap().len(), 2);
}

#[test]
fn tampered_blob_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(dir.path());
    let a = h.append(Content::user("original")).unwrap();
    let record = h.get_commit(&a).unwrap();

    let path = dir.path().join("blobs").join(format!("{}.json", record.content_hash));
    fs::write(&path, br#"{"content_type":"dialogue","role":"user","text":"forged"}"#).unwrap();

    let err = h.get_content(&a).unwrap_err();
    assert!(matches!(err, HistoryError::Integrity(_)));
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(h.compile(&CompileRequest::new()).is_err());
}

#[test]
fn tampered_commit_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(dir.path());
    let a = h.append(Content::user("a")).unwrap();
    let b = h.append(Content::user("b")).unwrap();

    // swap b's record into a's file
    let commits = dir.path().join("commits");
    fs::copy(commits.join(format!("{b}.json")), commits.join(format!("{a}.json"))).unwrap();

    let err = h.get_commit(&a).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn missing_blob_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(dir.path());
    let a = h.append(Content::user("a")).unwrap();
    let record = h.get_commit(&a).unwrap();
    fs::remove_file(dir.path().join("blobs").join(format!("{}.json", record.content_hash))).unwrap();

    let err = h.get_content(&a).unwrap_err();
    assert!(matches!(err, HistoryError::Integrity(_)));
}

#[test]
fn compile_over_missing_blob_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(dir.path());
    let a = h.append(Content::user("a")).unwrap();
    let record = h.get_commit(&a).unwrap();
    fs::remove_file(dir.path().join("blobs").join(format!("{}.json", record.content_hash))).unwrap();

    let err = h.compile(&CompileRequest::new()).unwrap_err();
    assert!(matches!(err, HistoryError::Integrity(_)));
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn divergent_duplicate_commit_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = open(dir.path());
    let a = h.append(Content::user("a")).unwrap();

    let mut backend = h.into_backend();
    let mut record = backend.get_commit(&a).unwrap();
    backend.put_commit(&record).unwrap();

    record.message = Some("rewritten".into());
    let err = backend.put_commit(&record).unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}

#[test]
fn torn_annotation_line_is_repaired_before_append() {
    let dir = tempfile::tempdir().unwrap();
    let a = {
        let mut h = open(dir.path());
        let a = h.append(Content::user("a")).unwrap();
        h.annotate(&a, Priority::Important, None).unwrap();
        a
    };

    let mut f = fs::OpenOptions::new()
        .append(true)
        .open(dir.path().join("annotations.jsonl"))
        .unwrap();
    f.write_all(br#"{"target":"#).unwrap();
    drop(f);

    {
        let mut h = reopen_later(dir.path());
        assert_eq!(h.priority_of(&a).unwrap(), Priority::Important);
        h.annotate(&a, Priority::Pinned, None).unwrap();
    }

    let h = open(dir.path());
    assert_eq!(h.priority_of(&a).unwrap(), Priority::Pinned);
    assert_eq!(h.annotations(&a).unwrap().len(), 2);
}

#[test]
fn complete_annotation_without_newline_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let a = {
        let mut h = open(dir.path());
        let a = h.append(Content::user("a")).unwrap();
        h.annotate(&a, Priority::Important, None).unwrap();
        a
    };

    let path = dir.path().join("annotations.jsonl");
    let trimmed = fs::read_to_string(&path).unwrap().trim_end().to_string();
    fs::write(&path, trimmed).unwrap();

    {
        let mut h = reopen_later(dir.path());
        assert_eq!(h.priority_of(&a).unwrap(), Priority::Important);
        h.annotate(&a, Priority::Skip, None).unwrap();
    }

    let h = open(dir.path());
    assert_eq!(h.annotations(&a).unwrap().len(), 2);
    assert_eq!(h.priority_of(&a).unwrap(), Priority::Skip);
}

#[test]
fn missing_commit_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let h = open(dir.path());
    let ghost = context_dag::types::CommitHash::from_canonical_bytes(b"ghost");
    let err = h.get_commit(&ghost).unwrap_err();
    assert!(matches!(err, HistoryError::CommitNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
