//! Hazard descriptions and the injected resolver callback.
//!
//! Merge, rebase and cherry-pick never guess at structural ambiguity. Each
//! ambiguous spot becomes a [`Hazard`] handed to the configured [`Resolver`];
//! the mutation stays unwritten until every hazard has an answer.

use serde::Serialize;

use crate::content::Content;
use crate::types::{CommitHash, CommitRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides edit the same target with different content.
    ConcurrentEdit,
    /// One side edits a commit the other side deleted or marked skip.
    EditOfSkipped,
    /// One side edits shared history while the other appended on top of it.
    EditOfSharedHistory,
}

/// A flagged merge conflict.
///
/// `ours` is always the commit from the branch being merged into, `theirs`
/// the commit from the incoming branch.
#[derive(Debug, Clone, Serialize)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    /// Commit whose rendered content is contested.
    pub target: CommitHash,
    pub original: Content,
    pub ours: CommitRecord,
    pub ours_content: Content,
    pub theirs: CommitRecord,
    pub theirs_content: Content,
    pub base: Option<CommitHash>,
    pub ours_commits: Vec<CommitHash>,
    pub theirs_commits: Vec<CommitHash>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayKind {
    CherryPick,
    Rebase,
}

/// An EDIT or DELETE being replayed onto a line that lacks its target.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayHazard {
    pub kind: ReplayKind,
    pub commit: CommitRecord,
    pub content: Content,
    pub missing_target: CommitHash,
    /// Tip the commit is being replayed onto, if any.
    pub destination: Option<CommitHash>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "hazard", rename_all = "snake_case")]
pub enum Hazard {
    Merge(MergeConflict),
    Replay(ReplayHazard),
}

impl Hazard {
    pub fn target(&self) -> &CommitHash {
        match self {
            Hazard::Merge(conflict) => &conflict.target,
            Hazard::Replay(hazard) => &hazard.missing_target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Use this content. Merges record it as an override of the target;
    /// replays commit it as a plain APPEND.
    Resolved(Content),
    /// Merges: accept without override. Replays: drop the commit.
    Skip,
    /// Fail the whole operation.
    Abort,
    /// Leave it for later; the operation fails with nothing written.
    Defer,
}

/// Decides hazards. Called synchronously while the mutation is held open.
pub trait Resolver {
    fn resolve(&mut self, hazard: &Hazard) -> Resolution;
}

impl<F> Resolver for F
where
    F: FnMut(&Hazard) -> Resolution,
{
    fn resolve(&mut self, hazard: &Hazard) -> Resolution {
        self(hazard)
    }
}
