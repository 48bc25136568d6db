//! Context compiler: turns a slice of the commit DAG into ordered messages.
//!
//! Stateless and read-only. Pipeline:
//!
//! 1. select the tip (`up_to`, explicit tip, or the caller's HEAD snapshot)
//! 2. walk root-to-tip in branch-blocks order, dropping commits after `as_of`
//! 3. resolve supersession (latest EDIT/DELETE/merge resolution per target)
//! 4. resolve priority (time-bounded annotation, else category default)
//! 5. map to roles
//! 6. aggregate consecutive same-role messages
//! 7. apply an explicit ordering, collecting warnings
//! 8. count
//!
//! Identical snapshot and request always give byte-identical output.

pub mod aggregate;
pub mod counting;
pub mod reorder;
pub mod resolve;

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CompileConfig;
use crate::content::{ContentCategory, Role};
use crate::dag;
use crate::error::HistoryError;
use crate::store::Backend;
use crate::types::{CommitHash, Priority};

pub use aggregate::aggregate;
pub use counting::{ApproxTokenCounter, TokenCounter};
pub use reorder::{reorder, CompileWarning, WarningKind};
use resolve::{collect_overrides, renders_standalone, Node, OverrideKind, PriorityResolver};

/// Parameters of one compile. Serializable so it can key a cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Compile from this commit instead of HEAD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<CommitHash>,
    /// Ignore commits and annotations created after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
    /// Stop at this commit. Must be reachable from the tip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_to: Option<CommitHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<CommitHash>>,
    /// Overrides `CompileConfig::aggregate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<bool>,
    /// Categories whose default skip is lifted to normal.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub include_categories: BTreeSet<ContentCategory>,
}

impl CompileRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, tip: CommitHash) -> Self {
        self.tip = Some(tip);
        self
    }

    pub fn as_of(mut self, instant: DateTime<Utc>) -> Self {
        self.as_of = Some(instant);
        self
    }

    pub fn up_to(mut self, hash: CommitHash) -> Self {
        self.up_to = Some(hash);
        self
    }

    pub fn ordered(mut self, order: Vec<CommitHash>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn aggregate(mut self, enabled: bool) -> Self {
        self.aggregate = Some(enabled);
        self
    }

    pub fn include(mut self, category: ContentCategory) -> Self {
        self.include_categories.insert(category);
        self
    }
}

/// One output message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledMessage {
    pub role: Role,
    pub content: String,
    /// Commits whose position this message occupies.
    pub commits: Vec<CommitHash>,
    /// EDIT or merge commits whose content was substituted in.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<CommitHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub tip: Option<CommitHash>,
    pub messages: Vec<CompiledMessage>,
    pub token_count: usize,
    pub token_source: String,
    /// Provenance: every commit that contributed, in output order.
    pub commit_hashes: Vec<CommitHash>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CompileWarning>,
}

pub struct ContextCompiler<'a> {
    config: &'a CompileConfig,
    counter: &'a dyn TokenCounter,
}

impl<'a> ContextCompiler<'a> {
    pub fn new(config: &'a CompileConfig, counter: &'a dyn TokenCounter) -> Self {
        Self { config, counter }
    }

    /// Compile from `head_tip` (the caller's single snapshot of HEAD) unless
    /// the request names its own tip.
    pub fn compile<B: Backend + ?Sized>(
        &self,
        store: &B,
        head_tip: Option<&CommitHash>,
        request: &CompileRequest,
    ) -> Result<CompileResult, HistoryError> {
        let tip = self.select_tip(store, head_tip, request)?;
        let Some(tip) = tip else {
            return Ok(self.finish(None, Vec::new(), Vec::new()));
        };

        // 2. Walk
        let as_of = request.as_of.as_ref();
        let mut nodes = Vec::new();
        for record in dag::linearize(store, &tip, &HashSet::new())? {
            if as_of.is_some_and(|t| record.created_at > *t) {
                continue;
            }
            let content = store.blob_for(&record)?;
            nodes.push(Node { record, content });
        }

        // 3. Supersession
        let overrides = collect_overrides(&nodes);
        let edit_targets: HashMap<CommitHash, CommitHash> = nodes
            .iter()
            .filter(|n| n.record.operation.has_target())
            .filter_map(|n| Some((n.record.hash.clone(), n.record.target.clone()?)))
            .collect();

        // 4 + 5. Priority and roles
        let priorities =
            PriorityResolver::new(store, self.config, &request.include_categories, as_of);
        let mut messages = Vec::new();
        for node in nodes.iter().filter(|n| renders_standalone(n)) {
            let hash = &node.record.hash;
            let priority = priorities.priority(hash, node.content.category())?;
            if priority == Priority::Skip {
                continue;
            }

            let mut edits = Vec::new();
            let content = match overrides.get(hash) {
                // pinned content is never altered
                _ if priority == Priority::Pinned => &node.content,
                Some(o) => match &o.kind {
                    OverrideKind::Replace(replacement) => {
                        edits.push(o.source.clone());
                        replacement
                    }
                    OverrideKind::Remove => continue,
                },
                None => &node.content,
            };

            let role = content
                .explicit_role()
                .unwrap_or_else(|| self.config.role_for(content.category()));
            messages.push(CompiledMessage {
                role,
                content: content.render(),
                commits: vec![hash.clone()],
                edits,
            });
        }

        // 6. Aggregate
        if request.aggregate.unwrap_or(self.config.aggregate) {
            messages = aggregate(messages, &self.config.separator);
        }

        // 7. Reorder
        let mut warnings = Vec::new();
        if let Some(order) = &request.order {
            let (reordered, found) = reorder(messages, order, &edit_targets);
            messages = reordered;
            warnings = found;
            for warning in &warnings {
                tracing::debug!(commit = %warning.commit, kind = ?warning.kind, "reorder warning");
            }
        }

        Ok(self.finish(Some(tip), messages, warnings))
    }

    fn select_tip<B: Backend + ?Sized>(
        &self,
        store: &B,
        head_tip: Option<&CommitHash>,
        request: &CompileRequest,
    ) -> Result<Option<CommitHash>, HistoryError> {
        let tip = request.tip.as_ref().or(head_tip);
        for hash in tip.into_iter().chain(request.up_to.as_ref()) {
            if !store.contains_commit(hash)? {
                return Err(HistoryError::CommitNotFound(hash.clone()));
            }
        }
        match (&request.up_to, tip) {
            (Some(up_to), Some(tip)) => {
                if !dag::is_ancestor(store, up_to, tip)? {
                    return Err(HistoryError::InvalidArgument(format!(
                        "up_to {} is not reachable from {}",
                        up_to.short(),
                        tip.short()
                    )));
                }
                Ok(Some(up_to.clone()))
            }
            (Some(up_to), None) => Ok(Some(up_to.clone())),
            (None, tip) => Ok(tip.cloned()),
        }
    }

    // 8. Count
    fn finish(
        &self,
        tip: Option<CommitHash>,
        messages: Vec<CompiledMessage>,
        warnings: Vec<CompileWarning>,
    ) -> CompileResult {
        let token_count = self.counter.count_messages(&messages);
        let commit_hashes = messages
            .iter()
            .flat_map(|m| m.commits.iter().chain(m.edits.iter()).cloned())
            .collect();
        CompileResult {
            tip,
            messages,
            token_count,
            token_source: self.counter.source().to_string(),
            commit_hashes,
            warnings,
        }
    }
}
