//! JSON-on-disk backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! blobs/<content-hash>.json     canonical JSON of the payload
//! commits/<commit-hash>.json    commit record
//! refs.json                     branches + HEAD
//! annotations.jsonl             one annotation per line, append-only
//! ```
//!
//! Whole-file writes go to a temp file, are synced, then renamed into place.
//! Reads of blobs and commits recompute their hash and fail with
//! `StoreError::Integrity` on mismatch.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::content::Content;
use crate::error::StoreError;
use crate::hashing::{canonical_json, commit_hash, content_hash};
use crate::store::{check_existing_commit, AnnotationStore, BlobStore, CommitStore, RefStore};
use crate::types::{Annotation, BranchName, CommitHash, CommitRecord, ContentHash, Head};

const BLOBS_DIR: &str = "blobs";
const COMMITS_DIR: &str = "commits";
const REFS_FILE: &str = "refs.json";
const ANNOTATIONS_FILE: &str = "annotations.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefsFile {
    head: Head,
    branches: BTreeMap<BranchName, CommitHash>,
}

#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    refs: RefsFile,
    annotations: HashMap<CommitHash, Vec<Annotation>>,
}

impl FileBackend {
    /// Open a store rooted at `root`, creating the layout if it is missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(BLOBS_DIR))?;
        fs::create_dir_all(root.join(COMMITS_DIR))?;

        let refs_path = root.join(REFS_FILE);
        let refs = if refs_path.exists() {
            let f = File::open(&refs_path)?;
            serde_json::from_reader(f)?
        } else {
            let refs = RefsFile {
                head: Head::Attached(BranchName::main()),
                branches: BTreeMap::new(),
            };
            write_atomic(&refs_path, &serde_json::to_vec_pretty(&refs)?)?;
            refs
        };

        let annotations = load_annotations(&root.join(ANNOTATIONS_FILE))?;

        tracing::debug!(root = %root.display(), branches = refs.branches.len(), "opened file backend");

        Ok(Self {
            root,
            refs,
            annotations,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(BLOBS_DIR).join(format!("{}.json", hash.as_str()))
    }

    fn commit_path(&self, hash: &CommitHash) -> PathBuf {
        self.root.join(COMMITS_DIR).join(format!("{}.json", hash.as_str()))
    }

    fn persist_refs(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.refs)?;
        write_atomic(&self.root.join(REFS_FILE), &bytes)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn load_annotations(path: &Path) -> Result<HashMap<CommitHash, Vec<Annotation>>, StoreError> {
    let mut index: HashMap<CommitHash, Vec<Annotation>> = HashMap::new();
    if !path.exists() {
        return Ok(index);
    }

    let bytes = fs::read(path)?;
    let complete = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);

    for line in bytes[..complete].split(|b| *b == b'\n') {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let annotation: Annotation = serde_json::from_slice(line)?;
        index.entry(annotation.target.clone()).or_default().push(annotation);
    }

    // Bytes after the last newline come from an append that never completed.
    // Repair the file so the next append starts on a fresh line.
    let tail = &bytes[complete..];
    if !tail.is_empty() {
        match serde_json::from_slice::<Annotation>(tail) {
            Ok(annotation) => {
                let mut f = OpenOptions::new().append(true).open(path)?;
                f.write_all(b"\n")?;
                f.sync_all()?;
                index.entry(annotation.target.clone()).or_default().push(annotation);
            }
            Err(e) => {
                tracing::warn!(error = %e, dropped = tail.len(), "truncating incomplete trailing annotation line");
                let f = OpenOptions::new().write(true).open(path)?;
                f.set_len(complete as u64)?;
                f.sync_all()?;
            }
        }
    }
    Ok(index)
}

impl BlobStore for FileBackend {
    fn put_blob(&mut self, content: &Content) -> Result<ContentHash, StoreError> {
        let bytes = canonical_json(content)?;
        let hash = ContentHash::from_canonical_bytes(&bytes);
        let path = self.blob_path(&hash);
        if !path.exists() {
            write_atomic(&path, &bytes)?;
        }
        Ok(hash)
    }

    fn get_blob(&self, hash: &ContentHash) -> Result<Content, StoreError> {
        let path = self.blob_path(hash);
        if !path.exists() {
            return Err(StoreError::not_found("blob", hash));
        }
        let bytes = fs::read(&path)?;
        let content: Content = serde_json::from_slice(&bytes)?;

        let actual = content_hash(&content)?;
        if &actual != hash {
            tracing::warn!(expected = %hash, actual = %actual, "blob hash mismatch");
            return Err(StoreError::Integrity(format!(
                "blob {} hashes to {}",
                hash, actual
            )));
        }
        Ok(content)
    }

    fn contains_blob(&self, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.blob_path(hash).exists())
    }

    fn blob_count(&self) -> Result<usize, StoreError> {
        count_json_files(&self.root.join(BLOBS_DIR))
    }
}

fn count_json_files(dir: &Path) -> Result<usize, StoreError> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

impl CommitStore for FileBackend {
    fn put_commit(&mut self, record: &CommitRecord) -> Result<(), StoreError> {
        let path = self.commit_path(&record.hash);
        if path.exists() {
            let existing = self.get_commit(&record.hash)?;
            return check_existing_commit(&existing, record);
        }
        write_atomic(&path, &serde_json::to_vec_pretty(record)?)
    }

    fn get_commit(&self, hash: &CommitHash) -> Result<CommitRecord, StoreError> {
        let path = self.commit_path(hash);
        if !path.exists() {
            return Err(StoreError::not_found("commit", hash));
        }
        let f = File::open(&path)?;
        let record: CommitRecord = serde_json::from_reader(f)?;

        let actual = commit_hash(
            &record.content_hash,
            &record.parents,
            record.operation,
            &record.created_at,
            record.target.as_ref(),
        )?;
        if &actual != hash || record.hash != *hash {
            tracing::warn!(expected = %hash, actual = %actual, "commit hash mismatch");
            return Err(StoreError::Integrity(format!(
                "commit file {} hashes to {}",
                hash, actual
            )));
        }
        Ok(record)
    }

    fn contains_commit(&self, hash: &CommitHash) -> Result<bool, StoreError> {
        Ok(self.commit_path(hash).exists())
    }

    fn commit_hashes(&self) -> Result<Vec<CommitHash>, StoreError> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(self.root.join(COMMITS_DIR))? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            if let Some(hash) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(CommitHash::parse)
            {
                hashes.push(hash);
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

impl RefStore for FileBackend {
    fn get_branch(&self, name: &BranchName) -> Result<Option<CommitHash>, StoreError> {
        Ok(self.refs.branches.get(name).cloned())
    }

    fn set_branch(&mut self, name: &BranchName, hash: &CommitHash) -> Result<(), StoreError> {
        let previous = self.refs.branches.insert(name.clone(), hash.clone());
        if let Err(e) = self.persist_refs() {
            // keep memory consistent with disk
            match previous {
                Some(prev) => self.refs.branches.insert(name.clone(), prev),
                None => self.refs.branches.remove(name),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_branch(&mut self, name: &BranchName) -> Result<bool, StoreError> {
        let Some(previous) = self.refs.branches.remove(name) else {
            return Ok(false);
        };
        if let Err(e) = self.persist_refs() {
            self.refs.branches.insert(name.clone(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn list_branches(&self) -> Result<Vec<(BranchName, CommitHash)>, StoreError> {
        Ok(self
            .refs
            .branches
            .iter()
            .map(|(name, hash)| (name.clone(), hash.clone()))
            .collect())
    }

    fn head(&self) -> Result<Head, StoreError> {
        Ok(self.refs.head.clone())
    }

    fn set_head(&mut self, head: &Head) -> Result<(), StoreError> {
        let previous = std::mem::replace(&mut self.refs.head, head.clone());
        if let Err(e) = self.persist_refs() {
            self.refs.head = previous;
            return Err(e);
        }
        Ok(())
    }
}

impl AnnotationStore for FileBackend {
    fn append_annotation(&mut self, annotation: &Annotation) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(annotation)?;
        line.push(b'\n');

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(ANNOTATIONS_FILE))?;
        f.write_all(&line)?;
        f.sync_all()?;

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
