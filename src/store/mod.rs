//! Persistence contracts.
//!
//! Blobs, commits and annotations are append-only; refs are the only
//! mutable state. Any type implementing all four traits is a [`Backend`].

pub mod fs;
pub mod memory;

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::content::Content;
use crate::error::StoreError;
use crate::types::{Annotation, BranchName, CommitHash, CommitRecord, ContentHash, Head};

pub use fs::FileBackend;
pub use memory::MemoryBackend;

pub trait BlobStore {
    /// Store a payload. Idempotent: storing identical content twice stores it once.
    fn put_blob(&mut self, content: &Content) -> Result<ContentHash, StoreError>;

    fn get_blob(&self, hash: &ContentHash) -> Result<Content, StoreError>;

    fn contains_blob(&self, hash: &ContentHash) -> Result<bool, StoreError>;

    fn blob_count(&self) -> Result<usize, StoreError>;

    /// Payload a commit points at. A stored commit with no blob is an
    /// integrity failure, not a missing key.
    fn blob_for(&self, record: &CommitRecord) -> Result<Content, StoreError> {
        self.get_blob(&record.content_hash).map_err(|e| match e {
            StoreError::NotFound { .. } => StoreError::Integrity(format!(
                "commit {} references missing blob {}",
                record.hash, record.content_hash
            )),
            other => other,
        })
    }
}

pub trait CommitStore {
    /// No-op if an identical record exists; `Integrity` if the hash exists
    /// with different fields.
    fn put_commit(&mut self, record: &CommitRecord) -> Result<(), StoreError>;

    fn get_commit(&self, hash: &CommitHash) -> Result<CommitRecord, StoreError>;

    fn contains_commit(&self, hash: &CommitHash) -> Result<bool, StoreError>;

    /// Every stored commit hash, sorted.
    fn commit_hashes(&self) -> Result<Vec<CommitHash>, StoreError>;

    /// Records reachable from `hash`, starting with `hash` itself.
    ///
    /// `first_parent_only` follows position-0 parents (linear log);
    /// otherwise every parent is followed breadth-first.
    fn get_ancestors(
        &self,
        hash: &CommitHash,
        first_parent_only: bool,
        limit: Option<usize>,
    ) -> Result<Vec<CommitRecord>, StoreError> {
        let limit = limit.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([hash.clone()]);

        while let Some(current) = queue.pop_front() {
            if out.len() >= limit {
                break;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            let record = self.get_commit(&current)?;
            if first_parent_only {
                queue.extend(record.first_parent().cloned());
            } else {
                queue.extend(record.parents.iter().cloned());
            }
            out.push(record);
        }
        Ok(out)
    }
}

pub trait RefStore {
    fn get_branch(&self, name: &BranchName) -> Result<Option<CommitHash>, StoreError>;

    fn set_branch(&mut self, name: &BranchName, hash: &CommitHash) -> Result<(), StoreError>;

    /// Returns whether the branch existed.
    fn remove_branch(&mut self, name: &BranchName) -> Result<bool, StoreError>;

    /// All branches sorted by name.
    fn list_branches(&self) -> Result<Vec<(BranchName, CommitHash)>, StoreError>;

    fn head(&self) -> Result<Head, StoreError>;

    fn set_head(&mut self, head: &Head) -> Result<(), StoreError>;
}

pub trait AnnotationStore {
    fn append_annotation(&mut self, annotation: &Annotation) -> Result<(), StoreError>;

    /// All annotations for `target` in append order.
    fn annotations_for(&self, target: &CommitHash) -> Result<Vec<Annotation>, StoreError>;

    /// Most recent annotation at or before `as_of`. Equal timestamps resolve
    /// to the one appended last.
    fn latest_annotation(
        &self,
        target: &CommitHash,
        as_of: Option<&DateTime<Utc>>,
    ) -> Result<Option<Annotation>, StoreError> {
        let mut latest: Option<Annotation> = None;
        for annotation in self.annotations_for(target)? {
            if as_of.is_some_and(|t| annotation.created_at > *t) {
                continue;
            }
            if latest
                .as_ref()
                .map_or(true, |l| annotation.created_at >= l.created_at)
            {
                latest = Some(annotation);
            }
        }
        Ok(latest)
    }
}

pub trait Backend: BlobStore + CommitStore + RefStore + AnnotationStore {}

impl<T> Backend for T where T: BlobStore + CommitStore + RefStore + AnnotationStore {}

/// Shared `put_commit` rule for backends.
pub(crate) fn check_existing_commit(
    existing: &CommitRecord,
    incoming: &CommitRecord,
) -> Result<(), StoreError> {
    if existing == incoming {
        Ok(())
    } else {
        tracing::warn!(commit = %incoming.hash, "commit hash collision with divergent fields");
        Err(StoreError::Integrity(format!(
            "commit {} already stored with different fields",
            incoming.hash
        )))
    }
}
