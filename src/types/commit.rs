use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::Metadata;
use crate::types::identifiers::{BranchName, CommitHash, ContentHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Append,
    Edit,
    Delete,
}

impl Operation {
    /// EDIT and DELETE both point at an earlier commit.
    pub fn has_target(&self) -> bool {
        matches!(self, Operation::Edit | Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Append => "APPEND",
            Operation::Edit => "EDIT",
            Operation::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Immutable DAG node.
///
/// `hash` covers `content_hash`, `parents` (in order), `operation`,
/// `created_at` and `target`. `message` and `metadata` are descriptive only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub hash: CommitHash,
    pub parents: Vec<CommitHash>,
    pub content_hash: ContentHash,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<CommitHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl CommitRecord {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn first_parent(&self) -> Option<&CommitHash> {
        self.parents.first()
    }
}

/// Inclusion priority of a commit at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Skip,
    Normal,
    Important,
    Pinned,
}

/// Append-only priority record. The most recent one for a target wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub target: CommitHash,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// HEAD: attached to a branch or pinned to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum Head {
    Attached(BranchName),
    Detached(CommitHash),
}

impl Head {
    pub fn branch(&self) -> Option<&BranchName> {
        match self {
            Head::Attached(name) => Some(name),
            Head::Detached(_) => None,
        }
    }
}
