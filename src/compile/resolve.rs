use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::CompileConfig;
use crate::content::{Content, ContentCategory};
use crate::error::StoreError;
use crate::store::AnnotationStore;
use crate::types::{CommitHash, CommitRecord, Operation, Priority};

/// A commit in the compiled slice together with its payload.
#[derive(Debug, Clone)]
pub struct Node {
    pub record: CommitRecord,
    pub content: Content,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverrideKind {
    Replace(Content),
    Remove,
}

/// Winning supersession for one target.
#[derive(Debug, Clone)]
pub struct Override {
    /// EDIT, DELETE or merge commit that supplied it.
    pub source: CommitHash,
    pub kind: OverrideKind,
    created_at: DateTime<Utc>,
    seq: usize,
}

/// Target -> latest override. Ties on time go to the later position in the walk.
pub fn collect_overrides(nodes: &[Node]) -> HashMap<CommitHash, Override> {
    let present: HashSet<&CommitHash> = nodes.iter().map(|n| &n.record.hash).collect();
    let mut latest: HashMap<CommitHash, Override> = HashMap::new();

    let mut offer = |target: &CommitHash, candidate: Override| {
        if !present.contains(target) {
            return;
        }
        let wins = latest.get(target).map_or(true, |current| {
            (candidate.created_at, candidate.seq) > (current.created_at, current.seq)
        });
        if wins {
            latest.insert(target.clone(), candidate);
        }
    };

    for (seq, node) in nodes.iter().enumerate() {
        let record = &node.record;
        match (record.operation, record.target.as_ref(), &node.content) {
            (Operation::Edit, Some(target), content) => offer(
                target,
                Override {
                    source: record.hash.clone(),
                    kind: OverrideKind::Replace(content.clone()),
                    created_at: record.created_at,
                    seq,
                },
            ),
            (Operation::Delete, Some(target), _) => offer(
                target,
                Override {
                    source: record.hash.clone(),
                    kind: OverrideKind::Remove,
                    created_at: record.created_at,
                    seq,
                },
            ),
            (_, _, Content::Merge(merge)) => {
                for resolution in &merge.resolutions {
                    offer(
                        &resolution.target,
                        Override {
                            source: record.hash.clone(),
                            kind: OverrideKind::Replace(resolution.content.clone()),
                            created_at: record.created_at,
                            seq,
                        },
                    );
                }
            }
            _ => {}
        }
    }
    latest
}

/// Whether a node is a standalone output candidate at all.
pub fn renders_standalone(node: &Node) -> bool {
    node.record.operation == Operation::Append
        && !node.record.is_merge()
        && !node.content.is_structural()
}

/// Resolves current priorities, bounded by `as_of`.
pub struct PriorityResolver<'a, A: AnnotationStore + ?Sized> {
    annotations: &'a A,
    config: &'a CompileConfig,
    include_categories: &'a BTreeSet<ContentCategory>,
    as_of: Option<&'a DateTime<Utc>>,
}

impl<'a, A: AnnotationStore + ?Sized> PriorityResolver<'a, A> {
    pub fn new(
        annotations: &'a A,
        config: &'a CompileConfig,
        include_categories: &'a BTreeSet<ContentCategory>,
        as_of: Option<&'a DateTime<Utc>>,
    ) -> Self {
        Self {
            annotations,
            config,
            include_categories,
            as_of,
        }
    }

    /// Latest annotation, else the category default. An included category
    /// lifts a default of skip to normal; annotations still win.
    pub fn priority(
        &self,
        hash: &CommitHash,
        category: ContentCategory,
    ) -> Result<Priority, StoreError> {
        if let Some(annotation) = self.annotations.latest_annotation(hash, self.as_of)? {
            return Ok(annotation.priority);
        }
        let default = self.config.default_priority(category);
        if default == Priority::Skip && self.include_categories.contains(&category) {
            Ok(Priority::Normal)
        } else {
            Ok(default)
        }
    }
}
