use std::collections::{BTreeMap, HashMap};

use crate::content::Content;
use crate::error::StoreError;
use crate::hashing::content_hash;
use crate::store::{check_existing_commit, AnnotationStore, BlobStore, CommitStore, RefStore};
use crate::types::{Annotation, BranchName, CommitHash, CommitRecord, ContentHash, Head};

/// Arena-style in-process backend. Records are keyed by hash; parents are
/// hash values, never pointers.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    blobs: HashMap<ContentHash, Content>,
    commits: HashMap<CommitHash, CommitRecord>,
    branches: BTreeMap<BranchName, CommitHash>,
    head: Head,
    annotations: HashMap<CommitHash, Vec<Annotation>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            blobs: HashMap::new(),
            commits: HashMap::new(),
            branches: BTreeMap::new(),
            head: Head::Attached(BranchName::main()),
            annotations: HashMap::new(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for MemoryBackend {
    fn put_blob(&mut self, content: &Content) -> Result<ContentHash, StoreError> {
        let hash = content_hash(content)?;
        self.blobs.entry(hash.clone()).or_insert_with(|| content.clone());
        Ok(hash)
    }

    fn get_blob(&self, hash: &ContentHash) -> Result<Content, StoreError> {
        self.blobs
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::not_found("blob", hash))
    }

    fn contains_blob(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.blobs.contains_key(hash))
    }

    fn blob_count(&self) -> Result<usize, StoreError> {
        Ok(self.blobs.len())
    }
}

impl CommitStore for MemoryBackend {
    fn put_commit(&mut self, record: &CommitRecord) -> Result<(), StoreError> {
        match self.commits.get(&record.hash) {
            Some(existing) => check_existing_commit(existing, record),
            None => {
                self.commits.insert(record.hash.clone(), record.clone());
                Ok(())
            }
        }
    }

    fn get_commit(&self, hash: &CommitHash) -> Result<CommitRecord, StoreError> {
        self.commits
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::not_found("commit", hash))
    }

    fn contains_commit(&self, hash: &CommitHash) -> Result<bool, StoreError> {
        Ok(self.commits.contains_key(hash))
    }

    fn commit_hashes(&self) -> Result<Vec<CommitHash>, StoreError> {
        let mut hashes: Vec<CommitHash> = self.commits.keys().cloned().collect();
        hashes.sort();
        Ok(hashes)
    }
}

impl RefStore for MemoryBackend {
    fn get_branch(&self, name: &BranchName) -> Result<Option<CommitHash>, StoreError> {
        Ok(self.branches.get(name).cloned())
    }

    fn set_branch(&mut self, name: &BranchName, hash: &CommitHash) -> Result<(), StoreError> {
        self.branches.insert(name.clone(), hash.clone());
        Ok(())
    }

    fn remove_branch(&mut self, name: &BranchName) -> Result<bool, StoreError> {
        Ok(self.branches.remove(name).is_some())
    }

    fn list_branches(&self) -> Result<Vec<(BranchName, CommitHash)>, StoreError> {
        Ok(self
            .branches
            .iter()
            .map(|(name, hash)| (name.clone(), hash.clone()))
            .collect())
    }

    fn head(&self) -> Result<Head, StoreError> {
        Ok(self.head.clone())
    }

    fn set_head(&mut self, head: &Head) -> Result<(), StoreError> {
        self.head = head.clone();
        Ok(())
    }
}

impl AnnotationStore for MemoryBackend {
    fn append_annotation(&mut self, annotation: &Annotation) -> Result<(), StoreError> {
        self.annotations
            .entry(annotation.target.clone())
            .or_default()
            .push(annotation.clone());
        Ok(())
    }

    fn annotations_for(&self, target: &CommitHash) -> Result<Vec<Annotation>, StoreError> {
        Ok(self.annotations.get(target).cloned().unwrap_or_default())
    }
}
