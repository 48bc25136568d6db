use serde::Serialize;

use crate::dag;
use crate::error::{HistoryError, HistoryResult};
use crate::history::History;
use crate::store::Backend;
use crate::types::{BranchName, CommitHash, Head};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: BranchName,
    pub tip: CommitHash,
    pub current: bool,
}

impl<B: Backend> History<B> {
    /// Create `name` at `source` (default: the current tip).
    pub fn create_branch(
        &mut self,
        name: &str,
        source: Option<&CommitHash>,
        switch: bool,
    ) -> HistoryResult<BranchName> {
        let name = BranchName::new(name)?;
        if self.backend.get_branch(&name)?.is_some() {
            return Err(HistoryError::BranchExists(name.to_string()));
        }
        let source = match source {
            Some(hash) => {
                self.get_commit(hash)?;
                hash.clone()
            }
            None => self.require_tip()?,
        };

        self.backend.set_branch(&name, &source)?;
        if switch {
            self.backend.set_head(&Head::Attached(name.clone()))?;
        }
        self.cache.invalidate();
        tracing::info!(branch = %name, at = %source.short(), switch, "created branch");
        Ok(name)
    }

    /// Delete a branch. The checked-out branch can never be deleted; an
    /// unmerged one only with `force`.
    pub fn delete_branch(&mut self, name: &str, force: bool) -> HistoryResult<()> {
        let name = BranchName::new(name)?;
        let tip = self
            .backend
            .get_branch(&name)?
            .ok_or_else(|| HistoryError::BranchNotFound(name.to_string()))?;

        if self.backend.head()?.branch() == Some(&name) {
            return Err(HistoryError::CurrentBranch(name.to_string()));
        }
        if !force && !self.reachable_elsewhere(&name, &tip)? {
            return Err(HistoryError::UnmergedBranch(name.to_string()));
        }

        self.backend.remove_branch(&name)?;
        self.cache.invalidate();
        tracing::info!(branch = %name, force, "deleted branch");
        Ok(())
    }

    fn reachable_elsewhere(&self, name: &BranchName, tip: &CommitHash) -> HistoryResult<bool> {
        let mut others: Vec<CommitHash> = self
            .backend
            .list_branches()?
            .into_iter()
            .filter(|(other, _)| other != name)
            .map(|(_, hash)| hash)
            .collect();
        if let Head::Detached(hash) = self.backend.head()? {
            others.push(hash);
        }
        for other in &others {
            if dag::is_ancestor(&self.backend, tip, other)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Attach HEAD to an existing branch. Commit data is untouched.
    pub fn switch(&mut self, name: &str) -> HistoryResult<()> {
        let name = BranchName::new(name)?;
        if self.backend.get_branch(&name)?.is_none() {
            return Err(HistoryError::BranchNotFound(name.to_string()));
        }
        self.backend.set_head(&Head::Attached(name.clone()))?;
        self.cache.invalidate();
        tracing::debug!(branch = %name, "switched");
        Ok(())
    }

    /// Detach HEAD at an arbitrary commit.
    pub fn checkout(&mut self, hash: &CommitHash) -> HistoryResult<()> {
        self.get_commit(hash)?;
        self.backend.set_head(&Head::Detached(hash.clone()))?;
        self.cache.invalidate();
        tracing::debug!(commit = %hash, "detached HEAD");
        Ok(())
    }

    /// Move the current branch (or detached HEAD) to `hash`. Commits left
    /// behind stay stored until garbage collection.
    pub fn reset(&mut self, hash: &CommitHash) -> HistoryResult<()> {
        self.get_commit(hash)?;
        let previous = self.tip()?;
        self.advance_head(hash)?;
        tracing::info!(
            to = %hash.short(),
            from = previous.as_ref().map(|p| p.short()).unwrap_or("<unborn>"),
            "reset"
        );
        Ok(())
    }

    pub fn current_branch(&self) -> HistoryResult<Option<BranchName>> {
        Ok(self.backend.head()?.branch().cloned())
    }

    pub fn branches(&self) -> HistoryResult<Vec<BranchInfo>> {
        let current = self.current_branch()?;
        Ok(self
            .backend
            .list_branches()?
            .into_iter()
            .map(|(name, tip)| BranchInfo {
                current: current.as_ref() == Some(&name),
                name,
                tip,
            })
            .collect())
    }

    pub fn branch_tip(&self, name: &str) -> HistoryResult<CommitHash> {
        let name = BranchName::new(name)?;
        self.backend
            .get_branch(&name)?
            .ok_or_else(|| HistoryError::BranchNotFound(name.to_string()))
    }

    /// Branch name first, then a full commit hash.
    pub fn resolve_revision(&self, revision: &str) -> HistoryResult<CommitHash> {
        if let Ok(name) = BranchName::new(revision) {
            if let Some(hash) = self.backend.get_branch(&name)? {
                return Ok(hash);
            }
        }
        match CommitHash::parse(revision) {
            Some(hash) => {
                self.get_commit(&hash)?;
                Ok(hash)
            }
            None => Err(HistoryError::BranchNotFound(revision.to_string())),
        }
    }
}
