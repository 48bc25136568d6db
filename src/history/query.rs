//! Read-only views over a history: log, diff, status, reachability.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::compile::resolve::PriorityResolver;
use crate::dag;
use crate::error::HistoryResult;
use crate::history::{BranchInfo, History};
use crate::store::Backend;
use crate::types::{Annotation, CommitHash, CommitRecord, Head, Priority};

/// Commits unique to each side of two revisions.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryDiff {
    pub base: Option<CommitHash>,
    /// Root-to-tip order.
    pub only_in_a: Vec<CommitRecord>,
    pub only_in_b: Vec<CommitRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub head: Head,
    pub tip: Option<CommitHash>,
    pub branches: Vec<BranchInfo>,
    pub commit_count: usize,
    pub blob_count: usize,
}

impl<B: Backend> History<B> {
    /// Newest first, starting at the tip. Empty on an unborn branch.
    pub fn log(&self, limit: Option<usize>, first_parent_only: bool) -> HistoryResult<Vec<CommitRecord>> {
        match self.tip()? {
            Some(tip) => Ok(self.backend.get_ancestors(&tip, first_parent_only, limit)?),
            None => Ok(Vec::new()),
        }
    }

    /// Every commit reachable from `hash`, itself included.
    pub fn ancestors(&self, hash: &CommitHash) -> HistoryResult<HashSet<CommitHash>> {
        self.get_commit(hash)?;
        Ok(dag::get_all_ancestors(&self.backend, hash)?)
    }

    pub fn is_ancestor(&self, ancestor: &CommitHash, descendant: &CommitHash) -> HistoryResult<bool> {
        self.get_commit(descendant)?;
        self.get_commit(ancestor)?;
        Ok(dag::is_ancestor(&self.backend, ancestor, descendant)?)
    }

    pub fn merge_base(&self, a: &CommitHash, b: &CommitHash) -> HistoryResult<Option<CommitHash>> {
        self.get_commit(a)?;
        self.get_commit(b)?;
        Ok(dag::find_merge_base(&self.backend, a, b)?)
    }

    /// `a` and `b` are branch names or full commit hashes.
    pub fn diff(&self, a: &str, b: &str) -> HistoryResult<HistoryDiff> {
        let a = self.resolve_revision(a)?;
        let b = self.resolve_revision(b)?;
        let base = dag::find_merge_base(&self.backend, &a, &b)?;
        Ok(HistoryDiff {
            only_in_a: dag::commits_since(&self.backend, &a, base.as_ref())?,
            only_in_b: dag::commits_since(&self.backend, &b, base.as_ref())?,
            base,
        })
    }

    pub fn status(&self) -> HistoryResult<Status> {
        Ok(Status {
            head: self.backend.head()?,
            tip: self.tip()?,
            branches: self.branches()?,
            commit_count: self.backend.commit_hashes()?.len(),
            blob_count: self.backend.blob_count()?,
        })
    }

    /// Stored commits no branch or HEAD can reach. Reported only; removing
    /// them is left to an external collector.
    pub fn unreachable_commits(&self) -> HistoryResult<Vec<CommitHash>> {
        let mut roots: BTreeSet<CommitHash> =
            self.backend.list_branches()?.into_iter().map(|(_, tip)| tip).collect();
        roots.extend(self.tip()?);

        let mut reachable = HashSet::new();
        for root in &roots {
            if !reachable.contains(root) {
                reachable.extend(dag::get_all_ancestors(&self.backend, root)?);
            }
        }
        Ok(self
            .backend
            .commit_hashes()?
            .into_iter()
            .filter(|hash| !reachable.contains(hash))
            .collect())
    }

    /// Full annotation history of a commit, oldest first.
    pub fn annotations(&self, hash: &CommitHash) -> HistoryResult<Vec<Annotation>> {
        self.get_commit(hash)?;
        Ok(self.backend.annotations_for(hash)?)
    }

    /// Current priority: latest annotation, else the category default.
    pub fn priority_of(&self, hash: &CommitHash) -> HistoryResult<Priority> {
        let content = self.get_content(hash)?;
        let include = BTreeSet::new();
        let resolver = PriorityResolver::new(&self.backend, &self.config.compile, &include, None);
        Ok(resolver.priority(hash, content.category())?)
    }
}
