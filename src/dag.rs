//! Traversals over the multi-parent commit graph.
//!
//! Commits are stored flat and keyed by hash, and parents always precede
//! children in time, so the graph is acyclic by construction. Every walk
//! still carries a visited set so diamonds are expanded once.

use std::collections::{HashSet, VecDeque};

use crate::error::StoreError;
use crate::store::CommitStore;
use crate::types::{CommitHash, CommitRecord};

/// `hash` and everything reachable from it through any parent edge.
pub fn get_all_ancestors<S: CommitStore + ?Sized>(
    store: &S,
    hash: &CommitHash,
) -> Result<HashSet<CommitHash>, StoreError> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([hash.clone()]);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let record = store.get_commit(&current)?;
        for parent in &record.parents {
            if !visited.contains(parent) {
                queue.push_back(parent.clone());
            }
        }
    }
    Ok(visited)
}

/// True when `ancestor == descendant` or `ancestor` is reachable from `descendant`.
pub fn is_ancestor<S: CommitStore + ?Sized>(
    store: &S,
    ancestor: &CommitHash,
    descendant: &CommitHash,
) -> Result<bool, StoreError> {
    if ancestor == descendant {
        return Ok(true);
    }
    let target = store.get_commit(ancestor)?;
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([descendant.clone()]);

    while let Some(current) = queue.pop_front() {
        if current == *ancestor {
            return Ok(true);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let record = store.get_commit(&current)?;
        // nothing older than the target can reach it
        if record.created_at < target.created_at {
            continue;
        }
        queue.extend(record.parents.iter().cloned());
    }
    Ok(false)
}

/// Lowest common ancestor of `a` and `b`.
///
/// Collects every ancestor of `a`, then walks `b` breadth-first and keeps the
/// commits found in that set. Hits that are themselves ancestors of another
/// hit are dropped; if more than one best candidate remains (criss-cross
/// history) the most recent wins, then the smallest hash. The result is the
/// same for `(a, b)` and `(b, a)`.
pub fn find_merge_base<S: CommitStore + ?Sized>(
    store: &S,
    a: &CommitHash,
    b: &CommitHash,
) -> Result<Option<CommitHash>, StoreError> {
    if a == b {
        return Ok(Some(a.clone()));
    }
    let ancestors_of_a = get_all_ancestors(store, a)?;

    let mut common: Vec<CommitRecord> = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([b.clone()]);
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let record = store.get_commit(&current)?;
        if ancestors_of_a.contains(&current) {
            // everything below a hit is common too, but never the best
            common.push(record);
            continue;
        }
        queue.extend(record.parents.iter().cloned());
    }

    if common.len() <= 1 {
        return Ok(common.pop().map(|r| r.hash));
    }

    let mut dominated: HashSet<CommitHash> = HashSet::new();
    for record in &common {
        let mut queue: VecDeque<CommitHash> = record.parents.iter().cloned().collect();
        while let Some(current) = queue.pop_front() {
            if !dominated.insert(current.clone()) {
                continue;
            }
            queue.extend(store.get_commit(&current)?.parents);
        }
    }

    let best = common
        .into_iter()
        .filter(|r| !dominated.contains(&r.hash))
        .max_by(|x, y| {
            x.created_at
                .cmp(&y.created_at)
                .then_with(|| y.hash.cmp(&x.hash))
        });
    Ok(best.map(|r| r.hash))
}

/// Root-to-tip order of everything reachable from `tip`, skipping `exclude`.
///
/// Linear stretches follow first parents. At a merge commit the first
/// parent's history comes first, then each further parent's not-yet-seen
/// commits as one block in their own order, then the merge commit itself.
pub fn linearize<S: CommitStore + ?Sized>(
    store: &S,
    tip: &CommitHash,
    exclude: &HashSet<CommitHash>,
) -> Result<Vec<CommitRecord>, StoreError> {
    let mut emitted = exclude.clone();
    let mut out = Vec::new();
    linearize_into(store, tip, &mut emitted, &mut out)?;
    Ok(out)
}

fn linearize_into<S: CommitStore + ?Sized>(
    store: &S,
    tip: &CommitHash,
    emitted: &mut HashSet<CommitHash>,
    out: &mut Vec<CommitRecord>,
) -> Result<(), StoreError> {
    let mut chain = Vec::new();
    let mut cursor = Some(tip.clone());
    while let Some(hash) = cursor {
        if emitted.contains(&hash) {
            break;
        }
        let record = store.get_commit(&hash)?;
        cursor = record.first_parent().cloned();
        chain.push(record);
    }

    for record in chain.into_iter().rev() {
        for side in record.parents.iter().skip(1) {
            linearize_into(store, side, emitted, out)?;
        }
        if emitted.insert(record.hash.clone()) {
            out.push(record);
        }
    }
    Ok(())
}

/// Commits reachable from `tip` but not from `base`, root-to-tip.
pub fn commits_since<S: CommitStore + ?Sized>(
    store: &S,
    tip: &CommitHash,
    base: Option<&CommitHash>,
) -> Result<Vec<CommitRecord>, StoreError> {
    let exclude = match base {
        Some(base) => get_all_ancestors(store, base)?,
        None => HashSet::new(),
    };
    linearize(store, tip, &exclude)
}
