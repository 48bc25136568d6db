use thiserror::Error;

use crate::resolver::Hazard;
use crate::types::{BranchNameError, CommitHash};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("Integrity error: {0}")]
    Integrity(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}

/// Error classes callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any mutation; fix the input and retry.
    Validation,
    /// Merge/replay hazard that was not resolved.
    Hazard,
    /// Broken core invariant. Never downgraded.
    Integrity,
    NotFound,
    /// Storage or serialization failure outside the core's control.
    Backend,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Invalid branch name: {0}")]
    InvalidBranchName(#[from] BranchNameError),
    #[error("Branch already exists: {0}")]
    BranchExists(String),
    #[error("Branch not found: {0}")]
    BranchNotFound(String),
    #[error("Commit not found: {0}")]
    CommitNotFound(CommitHash),
    #[error("Cannot delete the checked-out branch: {0}")]
    CurrentBranch(String),
    #[error("Branch {0} is not merged; use force to delete it")]
    UnmergedBranch(String),
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("History has no commits on the current head")]
    EmptyHistory,
    #[error("Rebase range contains merge commit {0}")]
    MergeInRebaseRange(CommitHash),
    #[error("{} unresolved hazard(s) and no resolver configured", hazards.len())]
    Unresolved { hazards: Vec<Hazard> },
    #[error("Operation aborted by resolver")]
    Aborted { hazard: Box<Hazard> },
    #[error("Resolver deferred {} hazard(s)", hazards.len())]
    Deferred { hazards: Vec<Hazard> },
    #[error("Integrity error: {0}")]
    Integrity(String),
    #[error("Store error: {0}")]
    Store(StoreError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for HistoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Integrity(msg) => HistoryError::Integrity(msg),
            other => HistoryError::Store(other),
        }
    }
}

impl HistoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HistoryError::InvalidBranchName(_)
            | HistoryError::BranchExists(_)
            | HistoryError::CurrentBranch(_)
            | HistoryError::UnmergedBranch(_)
            | HistoryError::InvalidEdit(_)
            | HistoryError::InvalidArgument(_)
            | HistoryError::EmptyHistory
            | HistoryError::MergeInRebaseRange(_) => ErrorKind::Validation,
            HistoryError::Unresolved { .. }
            | HistoryError::Aborted { .. }
            | HistoryError::Deferred { .. } => ErrorKind::Hazard,
            HistoryError::Integrity(_) => ErrorKind::Integrity,
            HistoryError::BranchNotFound(_)
            | HistoryError::CommitNotFound(_)
            | HistoryError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            HistoryError::Store(StoreError::Integrity(_)) => ErrorKind::Integrity,
            HistoryError::Store(_) | HistoryError::Serialization(_) => ErrorKind::Backend,
        }
    }

    /// Hazards carried by hazard-class errors.
    pub fn hazards(&self) -> &[Hazard] {
        match self {
            HistoryError::Unresolved { hazards } | HistoryError::Deferred { hazards } => hazards,
            HistoryError::Aborted { hazard } => std::slice::from_ref(hazard.as_ref()),
            _ => &[],
        }
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
