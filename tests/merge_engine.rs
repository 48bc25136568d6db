use context_dag::compile::CompileRequest;
use context_dag::content::{Content, ContentCategory};
use context_dag::error::{ErrorKind, HistoryError};
use context_dag::history::{History, MergeKind, MergeOptions};
use context_dag::resolver::{ConflictKind, Hazard, Resolution};
use context_dag::store::MemoryBackend;
use context_dag::types::{CommitHash, Operation, Priority};
use context_dag::SteppingClock;

fn history() -> History<MemoryBackend> {
    History::in_memory().with_clock(SteppingClock::from_epoch())
}

/// `a` on main, then `feature` and `main` each edit it differently.
fn concurrent_edits(h: &mut History<MemoryBackend>) -> CommitHash {
    let a = h.append(Content::user("question")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    h.edit(&a, Content::user("feature wording")).unwrap();
    h.switch("main").unwrap();
    h.edit(&a, Content::user("main wording")).unwrap();
    a
}

fn texts(h: &History<MemoryBackend>) -> Vec<String> {
    h.compile(&CompileRequest::new().aggregate(false))
        .unwrap()
        .messages
        .into_iter()
        .map(|m| m.content)
        .collect()
}

#[test]
fn scenario_merge_compiles_in_branch_blocks_order() {
    let mut h = history();
    let a = h.append(Content::instruction("You are helpful.")).unwrap();
    let b = h.append(Content::user("Hi")).unwrap();
    let c = h.append(Content::assistant("Hello!")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let d = h.append(Content::user("feature question")).unwrap();
    h.switch("main").unwrap();
    let e = h.append(Content::user("main question")).unwrap();

    let outcome = h.merge("feature", MergeOptions::default()).unwrap();
    assert_eq!(outcome.kind, MergeKind::Clean);
    assert_eq!(outcome.base, Some(c.clone()));
    let f = outcome.merge_commit.clone().unwrap();
    assert_eq!(h.tip().unwrap(), Some(f.clone()));

    let record = h.get_commit(&f).unwrap();
    assert_eq!(record.parents, vec![e.clone(), d.clone()]);
    assert_eq!(record.message.as_deref(), Some("Merge branch 'feature' into main"));

    let compiled = h.compile(&CompileRequest::new().at(f).aggregate(false)).unwrap();
    let order: Vec<CommitHash> = compiled.messages.iter().map(|m| m.commits[0].clone()).collect();
    assert_eq!(order, vec![a.clone(), b.clone(), c.clone(), e.clone(), d.clone()]);

    // aggregation joins E and D but keeps the same provenance order
    let aggregated = h.compile(&CompileRequest::new()).unwrap();
    assert_eq!(aggregated.messages.len(), 4);
    assert_eq!(aggregated.messages[3].content, "main question\n\nfeature question");
    assert_eq!(aggregated.commit_hashes, vec![a, b, c, e, d]);
}

#[test]
fn fast_forward_creates_no_commit() {
    let mut h = history();
    let a = h.append(Content::user("one")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let b = h.append(Content::user("two")).unwrap();
    h.switch("main").unwrap();

    let before = h.status().unwrap().commit_count;
    let outcome = h.merge("feature", MergeOptions::default()).unwrap();

    assert_eq!(outcome.kind, MergeKind::FastForward);
    assert_eq!(outcome.merge_commit, None);
    assert_eq!(outcome.base, Some(a));
    assert_eq!(h.tip().unwrap(), Some(b));
    assert_eq!(h.status().unwrap().commit_count, before);
}

#[test]
fn no_ff_forces_two_parent_commit() {
    let mut h = history();
    let a = h.append(Content::user("one")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let b = h.append(Content::user("two")).unwrap();
    h.switch("main").unwrap();

    let options = MergeOptions {
        no_ff: true,
        message: Some("keep the bubble".into()),
    };
    let outcome = h.merge("feature", options).unwrap();
    assert_eq!(outcome.kind, MergeKind::Clean);

    let merge = h.get_commit(&outcome.head).unwrap();
    assert_eq!(merge.parents, vec![a, b]);
    assert_eq!(merge.message.as_deref(), Some("keep the bubble"));
    assert!(h.get_content(&outcome.head).unwrap().is_structural());
}

#[test]
fn merging_an_ancestor_is_up_to_date() {
    let mut h = history();
    let a = h.append(Content::user("one")).unwrap();
    let b = h.append(Content::user("two")).unwrap();
    h.create_branch("old", Some(&a), false).unwrap();

    let outcome = h.merge("old", MergeOptions::default()).unwrap();
    assert_eq!(outcome.kind, MergeKind::UpToDate);
    assert_eq!(h.tip().unwrap(), Some(b));
}

#[test]
fn merge_of_unknown_branch_is_not_found() {
    let mut h = history();
    h.append(Content::user("one")).unwrap();
    let err = h.merge("ghost", MergeOptions::default()).unwrap_err();
    assert!(matches!(err, HistoryError::BranchNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn conflict_without_resolver_fails_closed() {
    let mut h = history();
    let a = concurrent_edits(&mut h);
    let before = h.status().unwrap();

    let err = h.merge("feature", MergeOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Hazard);
    let HistoryError::Unresolved { hazards } = &err else {
        panic!("expected Unresolved, got {err:?}");
    };
    assert_eq!(hazards.len(), 1);
    let Hazard::Merge(conflict) = &hazards[0] else {
        panic!("expected a merge hazard");
    };
    assert_eq!(conflict.kind, ConflictKind::ConcurrentEdit);
    assert_eq!(conflict.target, a);
    assert_eq!(conflict.base, Some(a.clone()));
    assert_eq!(conflict.original, Content::user("question"));
    assert_eq!(conflict.ours_content, Content::user("main wording"));
    assert_eq!(conflict.theirs_content, Content::user("feature wording"));
    assert_eq!(conflict.ours_commits.len(), 1);
    assert_eq!(conflict.theirs_commits.len(), 1);

    let after = h.status().unwrap();
    assert_eq!(after.tip, before.tip);
    assert_eq!(after.commit_count, before.commit_count);
    assert_eq!(after.blob_count, before.blob_count);
}

#[test]
fn resolved_conflict_lands_in_single_merge_commit() {
    let mut h = history().with_resolver(|_: &Hazard| Resolution::Resolved(Content::user("merged wording")));
    let a = concurrent_edits(&mut h);
    let before = h.status().unwrap().commit_count;

    let outcome = h.merge("feature", MergeOptions::default()).unwrap();
    assert_eq!(outcome.kind, MergeKind::Resolved);
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.resolutions, 1);
    assert_eq!(h.status().unwrap().commit_count, before + 1);

    let compiled = h.compile(&CompileRequest::new()).unwrap();
    assert_eq!(compiled.messages.len(), 1);
    assert_eq!(compiled.messages[0].content, "merged wording");
    assert_eq!(compiled.messages[0].commits, vec![a]);
    assert_eq!(compiled.messages[0].edits, vec![outcome.head]);
}

#[test]
fn abort_leaves_history_untouched() {
    let mut h = history().with_resolver(|_: &Hazard| Resolution::Abort);
    concurrent_edits(&mut h);
    let before = h.status().unwrap();

    let err = h.merge("feature", MergeOptions::default()).unwrap_err();
    assert!(matches!(err, HistoryError::Aborted { .. }));
    assert_eq!(err.hazards().len(), 1);

    let after = h.status().unwrap();
    assert_eq!(after.tip, before.tip);
    assert_eq!(after.commit_count, before.commit_count);
    assert_eq!(after.blob_count, before.blob_count);
}

#[test]
fn defer_reports_hazards_and_writes_nothing() {
    let mut h = history().with_resolver(|_: &Hazard| Resolution::Defer);
    concurrent_edits(&mut h);
    let before = h.status().unwrap().commit_count;

    let err = h.merge("feature", MergeOptions::default()).unwrap_err();
    let HistoryError::Deferred { hazards } = &err else {
        panic!("expected Deferred, got {err:?}");
    };
    assert_eq!(hazards.len(), 1);
    assert_eq!(h.status().unwrap().commit_count, before);
}

#[test]
fn skip_accepts_merge_without_override() {
    let mut h = history().with_resolver(|_: &Hazard| Resolution::Skip);
    concurrent_edits(&mut h);

    let outcome = h.merge("feature", MergeOptions::default()).unwrap();
    assert_eq!(outcome.kind, MergeKind::Resolved);
    assert_eq!(outcome.resolutions, 0);
    // the later of the two edits wins
    assert_eq!(texts(&h), vec!["main wording".to_string()]);
}

#[test]
fn edit_of_deleted_commit_conflicts() {
    let mut h = history();
    let a = h.append(Content::user("draft")).unwrap();
    h.append(Content::assistant("reply")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    h.edit(&a, Content::user("revised draft")).unwrap();
    h.switch("main").unwrap();
    h.delete(&a, Some("off topic".into())).unwrap();

    let err = h.merge("feature", MergeOptions::default()).unwrap_err();
    let Hazard::Merge(conflict) = &err.hazards()[0] else {
        panic!("expected a merge hazard");
    };
    assert_eq!(conflict.kind, ConflictKind::EditOfSkipped);
    assert_eq!(conflict.ours.operation, Operation::Delete);
    assert_eq!(conflict.theirs.operation, Operation::Edit);
}

#[test]
fn branch_local_edits_and_deletes_merge_clean() {
    let mut h = history();
    h.append(Content::instruction("sys")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    // reasoning defaults to skip; that alone is not a conflict
    let thought = h.append(Content::reasoning("think v1")).unwrap();
    h.edit(&thought, Content::reasoning("think v2")).unwrap();
    let scratch = h.append(Content::user("scratch")).unwrap();
    h.delete(&scratch, None).unwrap();
    h.switch("main").unwrap();
    h.append(Content::user("unrelated")).unwrap();

    let outcome = h.merge("feature", MergeOptions::default()).unwrap();
    assert_eq!(outcome.kind, MergeKind::Clean);
    assert_eq!(outcome.resolutions, 0);

    let compiled = h
        .compile(&CompileRequest::new().aggregate(false).include(ContentCategory::Reasoning))
        .unwrap();
    let texts: Vec<&str> = compiled.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["sys", "unrelated", "think v2"]);
}

#[test]
fn edit_of_skip_annotated_shared_commit_conflicts() {
    let mut h = history();
    let a = h.append(Content::user("tangent")).unwrap();
    h.annotate(&a, Priority::Skip, Some("off topic".into())).unwrap();
    h.create_branch("feature", None, true).unwrap();
    h.edit(&a, Content::user("tangent, rephrased")).unwrap();
    h.switch("main").unwrap();
    h.append(Content::user("next")).unwrap();

    let err = h.merge("feature", MergeOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Hazard);
    let Hazard::Merge(conflict) = &err.hazards()[0] else {
        panic!("expected a merge hazard");
    };
    assert_eq!(conflict.kind, ConflictKind::EditOfSkipped);
    assert_eq!(conflict.target, a);
    assert_eq!(conflict.theirs.operation, Operation::Edit);
}

#[test]
fn edit_of_shared_history_conflicts_with_other_side_append() {
    let mut h = history();
    let a = h.append(Content::user("shared")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let edit = h.edit(&a, Content::user("rewritten")).unwrap();
    h.switch("main").unwrap();
    let follow_up = h.append(Content::user("follow-up")).unwrap();

    let err = h.merge("feature", MergeOptions::default()).unwrap_err();
    assert_eq!(err.hazards().len(), 1);
    let Hazard::Merge(conflict) = &err.hazards()[0] else {
        panic!("expected a merge hazard");
    };
    assert_eq!(conflict.kind, ConflictKind::EditOfSharedHistory);
    assert_eq!(conflict.target, a);
    assert_eq!(conflict.ours_commits, vec![follow_up]);
    assert_eq!(conflict.theirs_commits, vec![edit]);
}

#[test]
fn scenario_pinned_commit_survives_conflicting_merge() {
    let mut h = history();
    let a = h.append(Content::user("keep me")).unwrap();
    h.annotate(&a, Priority::Pinned, Some("contract terms".into())).unwrap();
    h.create_branch("feature", None, true).unwrap();
    h.edit(&a, Content::user("tampered")).unwrap();
    h.switch("main").unwrap();
    h.append(Content::assistant("ack")).unwrap();

    // no resolver configured: the pinned edit must not raise a conflict
    let outcome = h.merge("feature", MergeOptions::default()).unwrap();
    assert_eq!(outcome.kind, MergeKind::Clean);
    assert!(outcome.conflicts.is_empty());

    assert_eq!(h.priority_of(&a).unwrap(), Priority::Pinned);
    assert_eq!(texts(&h), vec!["keep me".to_string(), "ack".to_string()]);
}
