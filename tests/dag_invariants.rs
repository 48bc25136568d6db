use std::collections::HashSet;

use context_dag::content::Content;
use context_dag::dag;
use context_dag::history::{History, MergeOptions};
use context_dag::store::{CommitStore, MemoryBackend};
use context_dag::types::CommitHash;
use context_dag::SteppingClock;
use proptest::prelude::*;

const BRANCHES: [&str; 3] = ["main", "left", "right"];

fn history() -> History<MemoryBackend> {
    History::in_memory().with_clock(SteppingClock::from_epoch())
}

#[derive(Debug, Clone)]
enum Step {
    Append(usize),
    Merge { into: usize, from: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0usize..3).prop_map(Step::Append),
        (0usize..3, 0usize..3).prop_map(|(into, from)| Step::Merge { into, from }),
    ]
}

/// Append-only histories never conflict, so every step succeeds.
fn build(steps: &[Step]) -> History<MemoryBackend> {
    let mut h = history();
    h.append(Content::user("root")).unwrap();
    h.create_branch("left", None, false).unwrap();
    h.create_branch("right", None, false).unwrap();

    for (i, step) in steps.iter().enumerate() {
        match *step {
            Step::Append(branch) => {
                h.switch(BRANCHES[branch]).unwrap();
                h.append(Content::user(format!("c{i}"))).unwrap();
            }
            Step::Merge { into, from } if into != from => {
                h.switch(BRANCHES[into]).unwrap();
                h.merge(BRANCHES[from], MergeOptions::default()).unwrap();
            }
            Step::Merge { .. } => {}
        }
    }
    h
}

fn tips(h: &History<MemoryBackend>) -> Vec<CommitHash> {
    BRANCHES.iter().map(|b| h.branch_tip(b).unwrap()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_merge_base_is_symmetric(steps in prop::collection::vec(step(), 0..24)) {
        let h = build(&steps);
        let tips = tips(&h);
        for a in &tips {
            for b in &tips {
                let ab = h.merge_base(a, b).unwrap();
                let ba = h.merge_base(b, a).unwrap();
                prop_assert_eq!(&ab, &ba);

                let base = ab.expect("every tip shares the root");
                prop_assert!(h.is_ancestor(&base, a).unwrap());
                prop_assert!(h.is_ancestor(&base, b).unwrap());
            }
        }
    }

    #[test]
    fn prop_parents_precede_children(steps in prop::collection::vec(step(), 0..24)) {
        let h = build(&steps);
        for hash in h.backend().commit_hashes().unwrap() {
            let record = h.get_commit(&hash).unwrap();
            for parent in &record.parents {
                prop_assert!(h.get_commit(parent).unwrap().created_at < record.created_at);
            }
        }
    }

    #[test]
    fn prop_linearize_emits_each_reachable_commit_once(steps in prop::collection::vec(step(), 0..24)) {
        let h = build(&steps);
        let tip = h.branch_tip("main").unwrap();
        let order = dag::linearize(h.backend(), &tip, &HashSet::new()).unwrap();

        let hashes: Vec<CommitHash> = order.iter().map(|r| r.hash.clone()).collect();
        let unique: HashSet<CommitHash> = hashes.iter().cloned().collect();
        prop_assert_eq!(unique.len(), hashes.len());
        prop_assert_eq!(unique, h.ancestors(&tip).unwrap());

        // every commit comes after all of its parents
        for (i, record) in order.iter().enumerate() {
            for parent in &record.parents {
                let at = hashes.iter().position(|x| x == parent).unwrap();
                prop_assert!(at < i);
            }
        }
    }
}

#[test]
fn linear_history_base_is_latest_shared_commit() {
    let mut h = history();
    h.append(Content::user("a")).unwrap();
    let b = h.append(Content::user("b")).unwrap();
    let c = h.append(Content::user("c")).unwrap();
    h.create_branch("side", Some(&b), true).unwrap();
    let d = h.append(Content::user("d")).unwrap();

    assert_eq!(h.merge_base(&c, &d).unwrap(), Some(b.clone()));
    assert_eq!(h.merge_base(&d, &c).unwrap(), Some(b.clone()));
    assert_eq!(h.merge_base(&b, &c).unwrap(), Some(b.clone()));
    assert_eq!(h.merge_base(&c, &c).unwrap(), Some(c));
}

#[test]
fn merge_base_walks_every_parent_of_a_merge() {
    let mut h = history();
    let a = h.append(Content::user("a")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let b = h.append(Content::user("b")).unwrap();
    h.switch("main").unwrap();
    h.append(Content::user("c")).unwrap();
    let merged = h.merge("feature", MergeOptions::default()).unwrap().head;

    // `b` is only reachable through the second parent
    h.switch("feature").unwrap();
    let e = h.append(Content::user("e")).unwrap();
    assert_eq!(h.merge_base(&merged, &e).unwrap(), Some(b.clone()));
    assert!(h.is_ancestor(&a, &merged).unwrap());
    assert!(!h.is_ancestor(&e, &merged).unwrap());
}

#[test]
fn linearize_places_side_block_before_merge() {
    let mut h = history();
    let a = h.append(Content::user("a")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let b = h.append(Content::user("b")).unwrap();
    let c = h.append(Content::user("c")).unwrap();
    h.switch("main").unwrap();
    let d = h.append(Content::user("d")).unwrap();
    let m = h.merge("feature", MergeOptions::default()).unwrap().head;

    let order: Vec<CommitHash> = dag::linearize(h.backend(), &m, &HashSet::new())
        .unwrap()
        .into_iter()
        .map(|r| r.hash)
        .collect();
    assert_eq!(order, vec![a.clone(), d.clone(), b.clone(), c.clone(), m.clone()]);

    let since = dag::commits_since(h.backend(), &m, Some(&d)).unwrap();
    let since: Vec<CommitHash> = since.into_iter().map(|r| r.hash).collect();
    assert_eq!(since, vec![b, c, m]);
}

#[test]
fn get_ancestors_first_parent_only_skips_side_branches() {
    let mut h = history();
    h.append(Content::user("a")).unwrap();
    h.create_branch("feature", None, true).unwrap();
    let side = h.append(Content::user("side")).unwrap();
    h.switch("main").unwrap();
    h.append(Content::user("main")).unwrap();
    let m = h.merge("feature", MergeOptions::default()).unwrap().head;

    let linear = h.backend().get_ancestors(&m, true, None).unwrap();
    assert_eq!(linear.len(), 3);
    assert!(linear.iter().all(|r| r.hash != side));

    let full = h.backend().get_ancestors(&m, false, None).unwrap();
    assert_eq!(full.len(), 4);
    assert_eq!(full[0].hash, m);

    let limited = h.backend().get_ancestors(&m, false, Some(2)).unwrap();
    assert_eq!(limited.len(), 2);
}
