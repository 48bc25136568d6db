//! The history facade: the only entry point that mutates a history.
//!
//! `History` owns its backend, HEAD, clock, counting service and resolver.
//! Nothing is process-global, so any number of histories can be open at once.
//! Every mutation runs to completion before returning and either fully
//! applies or leaves the stores untouched.

pub mod branch;
pub mod merge;
pub mod query;
pub mod replay;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::cache::{CacheKey, CompileCache};
use crate::clock::{Clock, SystemClock};
use crate::compile::{ApproxTokenCounter, CompileRequest, CompileResult, ContextCompiler, TokenCounter};
use crate::config::HistoryConfig;
use crate::content::{Content, Metadata};
use crate::dag;
use crate::error::{HistoryError, HistoryResult, StoreError};
use crate::hashing::commit_hash;
use crate::resolver::Resolver;
use crate::store::{Backend, MemoryBackend};
use crate::types::{Annotation, CommitHash, CommitRecord, ContentHash, Head, Operation, Priority};

pub use branch::BranchInfo;
pub use merge::{MergeKind, MergeOptions, MergeOutcome};
pub use query::{HistoryDiff, Status};
pub use replay::{CherryPickOutcome, RebaseOutcome, ReplayedCommit};

/// Descriptive fields for a new commit. Not part of its hash.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub message: Option<String>,
    pub metadata: Metadata,
}

impl CommitOptions {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            metadata: Metadata::new(),
        }
    }
}

pub struct History<B: Backend> {
    backend: B,
    config: HistoryConfig,
    clock: Box<dyn Clock>,
    counter: Box<dyn TokenCounter>,
    resolver: Option<Box<dyn Resolver>>,
    cache: CompileCache,
}

impl History<MemoryBackend> {
    pub fn in_memory() -> Self {
        // A fresh memory backend always satisfies `open`'s checks.
        Self::assemble(MemoryBackend::new(), HistoryConfig::v0())
    }
}

impl<B: Backend> History<B> {
    /// Wrap a backend. An empty backend gets HEAD attached to the configured
    /// default branch.
    pub fn open(mut backend: B, config: HistoryConfig) -> HistoryResult<Self> {
        if backend.list_branches()?.is_empty() {
            let wanted = Head::Attached(config.default_branch.clone());
            if matches!(backend.head()?, Head::Attached(_)) && backend.head()? != wanted {
                backend.set_head(&wanted)?;
            }
        }
        Ok(Self::assemble(backend, config))
    }

    fn assemble(backend: B, config: HistoryConfig) -> Self {
        Self {
            backend,
            config,
            clock: Box::new(SystemClock),
            counter: Box::new(ApproxTokenCounter),
            resolver: None,
            cache: CompileCache::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_counter(mut self, counter: impl TokenCounter + 'static) -> Self {
        self.counter = Box::new(counter);
        self.cache.invalidate();
        self
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn set_resolver(&mut self, resolver: Option<Box<dyn Resolver>>) {
        self.resolver = resolver;
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn head(&self) -> HistoryResult<Head> {
        Ok(self.backend.head()?)
    }

    /// Commit HEAD currently resolves to; `None` on an unborn branch.
    pub fn tip(&self) -> HistoryResult<Option<CommitHash>> {
        match self.backend.head()? {
            Head::Attached(branch) => Ok(self.backend.get_branch(&branch)?),
            Head::Detached(hash) => Ok(Some(hash)),
        }
    }

    pub(crate) fn require_tip(&self) -> HistoryResult<CommitHash> {
        self.tip()?.ok_or(HistoryError::EmptyHistory)
    }

    pub fn get_commit(&self, hash: &CommitHash) -> HistoryResult<CommitRecord> {
        self.backend.get_commit(hash).map_err(|e| match e {
            StoreError::NotFound { .. } => HistoryError::CommitNotFound(hash.clone()),
            other => other.into(),
        })
    }

    /// Payload of a commit. A commit whose blob is missing is an integrity failure.
    pub fn get_content(&self, hash: &CommitHash) -> HistoryResult<Content> {
        let record = self.get_commit(hash)?;
        self.load_blob(&record)
    }

    pub(crate) fn load_blob(&self, record: &CommitRecord) -> HistoryResult<Content> {
        Ok(self.backend.blob_for(record)?)
    }

    // ---- commit engine ----

    /// Record `content` as a new APPEND on HEAD.
    pub fn commit(&mut self, content: Content, options: CommitOptions) -> HistoryResult<CommitRecord> {
        self.create_commit(&content, Operation::Append, None, options)
    }

    pub fn append(&mut self, content: Content) -> HistoryResult<CommitHash> {
        Ok(self.commit(content, CommitOptions::default())?.hash)
    }

    /// Supersede `target` with `content`. The original stays in the DAG.
    pub fn edit(&mut self, target: &CommitHash, content: Content) -> HistoryResult<CommitHash> {
        Ok(self.edit_with(target, content, CommitOptions::default())?.hash)
    }

    pub fn edit_with(
        &mut self,
        target: &CommitHash,
        content: Content,
        options: CommitOptions,
    ) -> HistoryResult<CommitRecord> {
        self.create_commit(&content, Operation::Edit, Some(target), options)
    }

    /// Hide `target` from compiled output from now on.
    pub fn delete(&mut self, target: &CommitHash, reason: Option<String>) -> HistoryResult<CommitHash> {
        let tombstone = Content::Tombstone { reason };
        let record = self.write_checked(&tombstone, Operation::Delete, Some(target), CommitOptions::default())?;
        Ok(record.hash)
    }

    fn create_commit(
        &mut self,
        content: &Content,
        operation: Operation,
        target: Option<&CommitHash>,
        options: CommitOptions,
    ) -> HistoryResult<CommitRecord> {
        if content.is_structural() {
            return Err(HistoryError::InvalidArgument(
                "merge records and tombstones are written by the engine only".into(),
            ));
        }
        self.write_checked(content, operation, target, options)
    }

    fn write_checked(
        &mut self,
        content: &Content,
        operation: Operation,
        target: Option<&CommitHash>,
        options: CommitOptions,
    ) -> HistoryResult<CommitRecord> {
        let tip = self.tip()?;
        if operation.has_target() {
            let target = target.ok_or_else(|| {
                HistoryError::InvalidEdit(format!("{operation} requires a target commit"))
            })?;
            self.validate_target(target, tip.as_ref())?;
        }

        let parents: Vec<CommitHash> = tip.into_iter().collect();
        let record = self.write_commit(content, parents, operation, target.cloned(), options)?;
        tracing::debug!(
            commit = %record.hash,
            operation = %record.operation,
            category = ?content.category(),
            "committed"
        );
        Ok(record)
    }

    pub(crate) fn validate_target(
        &self,
        target: &CommitHash,
        tip: Option<&CommitHash>,
    ) -> HistoryResult<()> {
        let record = self.get_commit(target)?;
        if record.operation != Operation::Append {
            return Err(HistoryError::InvalidEdit(format!(
                "target {} is itself an {}; edit the original instead",
                target.short(),
                record.operation
            )));
        }
        if record.is_merge() {
            return Err(HistoryError::InvalidEdit(format!(
                "target {} is a merge commit",
                target.short()
            )));
        }
        let reachable = match tip {
            Some(tip) => dag::is_ancestor(&self.backend, target, tip)?,
            None => false,
        };
        if !reachable {
            return Err(HistoryError::InvalidEdit(format!(
                "target {} is not in the current history",
                target.short()
            )));
        }
        Ok(())
    }

    /// Store blob + commit and move HEAD. Callers have validated already.
    pub(crate) fn write_commit(
        &mut self,
        content: &Content,
        parents: Vec<CommitHash>,
        operation: Operation,
        target: Option<CommitHash>,
        options: CommitOptions,
    ) -> HistoryResult<CommitRecord> {
        let mut floor = None;
        for parent in &parents {
            let created = self.get_commit(parent)?.created_at;
            floor = floor.max(Some(created));
        }
        let created_at = self.next_timestamp(floor);

        let content_hash = self.backend.put_blob(content)?;
        let record = build_record(content_hash, parents, operation, target, options, created_at)?;
        self.backend.put_commit(&record)?;
        self.advance_head(&record.hash)?;
        Ok(record)
    }

    /// Clock reading, forced strictly after `floor` so children follow parents.
    pub(crate) fn next_timestamp(&self, floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = self.clock.now().trunc_subsecs(6);
        match floor {
            Some(floor) if now <= floor => floor + Duration::microseconds(1),
            _ => now,
        }
    }

    /// Move whatever HEAD points at to `hash`.
    pub(crate) fn advance_head(&mut self, hash: &CommitHash) -> HistoryResult<()> {
        match self.backend.head()? {
            Head::Attached(branch) => self.backend.set_branch(&branch, hash)?,
            Head::Detached(_) => self.backend.set_head(&Head::Detached(hash.clone()))?,
        }
        self.cache.invalidate();
        Ok(())
    }

    // ---- annotations ----

    pub fn annotate(
        &mut self,
        target: &CommitHash,
        priority: Priority,
        reason: Option<String>,
    ) -> HistoryResult<Annotation> {
        self.get_commit(target)?;
        let annotation = Annotation {
            target: target.clone(),
            priority,
            created_at: self.clock.now().trunc_subsecs(6),
            reason,
        };
        self.backend.append_annotation(&annotation)?;
        self.cache.invalidate();
        tracing::debug!(commit = %target, priority = ?priority, "annotated");
        Ok(annotation)
    }

    // ---- compile ----

    /// Compile from a single snapshot of HEAD.
    pub fn compile(&self, request: &CompileRequest) -> HistoryResult<CompileResult> {
        let head_tip = self.tip()?;
        ContextCompiler::new(&self.config.compile, self.counter.as_ref()).compile(
            &self.backend,
            head_tip.as_ref(),
            request,
        )
    }

    /// `compile`, memoized when `HistoryConfig::cache_compiles` is set.
    pub fn compile_cached(&mut self, request: &CompileRequest) -> HistoryResult<CompileResult> {
        if !self.config.cache_compiles {
            return self.compile(request);
        }
        let head_tip = self.tip()?;
        let key = CacheKey::derive(&self.config.compile, head_tip.as_ref(), request)?;
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }
        let result = ContextCompiler::new(&self.config.compile, self.counter.as_ref()).compile(
            &self.backend,
            head_tip.as_ref(),
            request,
        )?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }
}

pub(crate) fn build_record(
    content_hash: ContentHash,
    parents: Vec<CommitHash>,
    operation: Operation,
    target: Option<CommitHash>,
    options: CommitOptions,
    created_at: DateTime<Utc>,
) -> HistoryResult<CommitRecord> {
    let hash = commit_hash(&content_hash, &parents, operation, &created_at, target.as_ref())?;
    Ok(CommitRecord {
        hash,
        parents,
        content_hash,
        operation,
        target,
        message: options.message,
        metadata: options.metadata,
        created_at,
    })
}
