//! Cherry-pick and rebase.
//!
//! Both go through `plan_replay`, which stages every new commit in
//! memory (resolver answers included) before anything touches the stores.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::content::Content;
use crate::dag;
use crate::error::{HistoryError, HistoryResult};
use crate::hashing::content_hash;
use crate::history::{build_record, CommitOptions, History};
use crate::resolver::{Hazard, ReplayHazard, ReplayKind, Resolution};
use crate::store::Backend;
use crate::types::{CommitHash, CommitRecord, Operation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayedCommit {
    pub original: CommitHash,
    /// `None` when the resolver chose to skip it.
    pub replacement: Option<CommitHash>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CherryPickOutcome {
    pub source: CommitHash,
    pub commit: Option<CommitRecord>,
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RebaseOutcome {
    pub onto: CommitHash,
    pub replayed: Vec<ReplayedCommit>,
    pub head: CommitHash,
}

/// Commits staged for writing, in order, plus the resulting tip.
struct ReplayPlan {
    staged: Vec<(Content, CommitRecord)>,
    replayed: Vec<ReplayedCommit>,
    tip: Option<CommitHash>,
}

impl<B: Backend> History<B> {
    /// Copy one commit onto HEAD.
    ///
    /// An EDIT or DELETE keeps its operation when its target is reachable
    /// from HEAD. Otherwise the resolver decides: resolved content lands as a
    /// plain APPEND, skip drops the commit.
    pub fn cherry_pick(&mut self, hash: &CommitHash) -> HistoryResult<CherryPickOutcome> {
        let source = self.get_commit(hash)?;
        if source.is_merge() {
            return Err(HistoryError::InvalidArgument(format!(
                "cannot cherry-pick merge commit {}",
                hash.short()
            )));
        }

        let destination = self.tip()?;
        let plan = self.plan_replay(ReplayKind::CherryPick, &[source], destination)?;
        let commit = plan.staged.last().map(|(_, record)| record.clone());
        self.write_plan(plan)?;

        match &commit {
            Some(record) => tracing::info!(source = %hash, commit = %record.hash, "cherry-picked"),
            None => tracing::info!(source = %hash, "cherry-pick skipped by resolver"),
        }
        Ok(CherryPickOutcome {
            source: hash.clone(),
            skipped: commit.is_none(),
            commit,
        })
    }

    /// Replay the commits unique to HEAD onto `onto` (a branch or commit) and
    /// move HEAD to the new tip.
    ///
    /// EDIT and DELETE commits whose target lies outside the replayed range
    /// go to the resolver, as do commits aimed at something it skipped.
    pub fn rebase(&mut self, onto: &str) -> HistoryResult<RebaseOutcome> {
        let onto_tip = self.resolve_revision(onto)?;
        let current = self.require_tip()?;
        let base = dag::find_merge_base(&self.backend, &current, &onto_tip)?;

        if base.as_ref() == Some(&onto_tip) {
            tracing::debug!(onto = %onto_tip.short(), "rebase is a no-op");
            return Ok(RebaseOutcome {
                onto: onto_tip,
                replayed: Vec::new(),
                head: current,
            });
        }

        let range = dag::commits_since(&self.backend, &current, base.as_ref())?;
        if let Some(merge) = range.iter().find(|r| r.is_merge()) {
            return Err(HistoryError::MergeInRebaseRange(merge.hash.clone()));
        }

        let plan = self.plan_replay(ReplayKind::Rebase, &range, Some(onto_tip.clone()))?;
        let replayed = plan.replayed.clone();
        let head = plan.tip.clone().unwrap_or_else(|| onto_tip.clone());
        self.write_plan(plan)?;

        tracing::info!(
            onto = %onto_tip.short(),
            replayed = replayed.len(),
            head = %head.short(),
            "rebased"
        );
        Ok(RebaseOutcome {
            onto: onto_tip,
            replayed,
            head,
        })
    }

    /// Stage `commits` one after another on top of `destination`.
    fn plan_replay(
        &mut self,
        kind: ReplayKind,
        commits: &[CommitRecord],
        destination: Option<CommitHash>,
    ) -> HistoryResult<ReplayPlan> {
        let mut plan = ReplayPlan {
            staged: Vec::new(),
            replayed: Vec::new(),
            tip: destination.clone(),
        };
        let mut floor: Option<DateTime<Utc>> = match &destination {
            Some(hash) => Some(self.get_commit(hash)?.created_at),
            None => None,
        };
        let mut mapping: HashMap<CommitHash, CommitHash> = HashMap::new();
        let mut deferred = Vec::new();

        for source in commits {
            let mut content = self.load_blob(source)?;
            let mut operation = source.operation;
            let mut target = None;

            if let Some(original) = source.target.as_ref().filter(|_| operation.has_target()) {
                let reachable = match (mapping.get(original), kind, &destination) {
                    (Some(_), _, _) => true,
                    // a rebased edit may only point into the replayed range
                    (None, ReplayKind::Rebase, _) | (None, _, None) => false,
                    (None, ReplayKind::CherryPick, Some(dest)) => {
                        dag::is_ancestor(&self.backend, original, dest)?
                    }
                };

                if reachable {
                    target = Some(mapping.get(original).unwrap_or(original).clone());
                } else {
                    let hazard = Hazard::Replay(ReplayHazard {
                        kind,
                        commit: source.clone(),
                        content: content.clone(),
                        missing_target: original.clone(),
                        destination: destination.clone(),
                    });
                    match self.ask_resolver(&hazard)? {
                        Resolution::Resolved(replacement) => {
                            if replacement.is_structural() {
                                return Err(HistoryError::InvalidArgument(
                                    "resolver returned a structural payload".into(),
                                ));
                            }
                            content = replacement;
                            operation = Operation::Append;
                        }
                        Resolution::Skip => {
                            tracing::debug!(commit = %source.hash, "replay skipped by resolver");
                            plan.replayed.push(ReplayedCommit {
                                original: source.hash.clone(),
                                replacement: None,
                            });
                            continue;
                        }
                        Resolution::Abort => {
                            tracing::warn!(commit = %source.hash, "replay aborted by resolver");
                            return Err(HistoryError::Aborted {
                                hazard: Box::new(hazard),
                            });
                        }
                        Resolution::Defer => {
                            deferred.push(hazard);
                            continue;
                        }
                    }
                }
            }

            let created_at = self.next_timestamp(floor);
            let options = CommitOptions {
                message: source.message.clone(),
                metadata: source.metadata.clone(),
            };
            let parents: Vec<CommitHash> = plan.tip.iter().cloned().collect();
            let record = build_record(content_hash(&content)?, parents, operation, target, options, created_at)?;

            floor = Some(record.created_at);
            mapping.insert(source.hash.clone(), record.hash.clone());
            plan.replayed.push(ReplayedCommit {
                original: source.hash.clone(),
                replacement: Some(record.hash.clone()),
            });
            plan.tip = Some(record.hash.clone());
            plan.staged.push((content, record));
        }

        if !deferred.is_empty() {
            tracing::warn!(deferred = deferred.len(), "replay deferred by resolver");
            return Err(HistoryError::Deferred { hazards: deferred });
        }
        Ok(plan)
    }

    /// One resolver round trip. A missing resolver fails closed.
    fn ask_resolver(&mut self, hazard: &Hazard) -> HistoryResult<Resolution> {
        match self.resolver.as_mut() {
            Some(resolver) => Ok(resolver.resolve(hazard)),
            None => {
                tracing::warn!(commit = %hazard.target(), "replay hazard with no resolver configured");
                Err(HistoryError::Unresolved {
                    hazards: vec![hazard.clone()],
                })
            }
        }
    }

    fn write_plan(&mut self, plan: ReplayPlan) -> HistoryResult<()> {
        for (content, record) in &plan.staged {
            let stored = self.backend.put_blob(content)?;
            if stored != record.content_hash {
                return Err(HistoryError::Integrity(format!(
                    "blob for {} stored as {}, expected {}",
                    record.hash, stored, record.content_hash
                )));
            }
            self.backend.put_commit(record)?;
        }
        if let Some(tip) = &plan.tip {
            self.advance_head(tip)?;
        }
        Ok(())
    }
}
