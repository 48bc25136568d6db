//! Merge engine.
//!
//! Decision procedure over the two tips and their merge-base:
//!
//! - source already contained in target: nothing to do
//! - target is an ancestor of source: fast-forward (unless `no_ff`)
//! - otherwise classify every commit added on each side since the base and
//!   flag conflicting edits; flagged conflicts go to the resolver
//!
//! All resolver answers are collected before anything is written. The result
//! is exactly one commit with parents `[target_tip, source_tip]` whose payload
//! records the resolutions.

use std::collections::HashSet;

use serde::Serialize;

use crate::content::{Content, MergeRecord, MergeResolution};
use crate::dag;
use crate::error::{HistoryError, HistoryResult};
use crate::history::{CommitOptions, History};
use crate::resolver::{ConflictKind, Hazard, MergeConflict, Resolution};
use crate::store::Backend;
use crate::types::{BranchName, CommitHash, CommitRecord, Head, Operation, Priority};

#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Create a merge commit even when a fast-forward is possible.
    pub no_ff: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeKind {
    UpToDate,
    FastForward,
    /// Merge commit, no conflicts flagged.
    Clean,
    /// Merge commit after the resolver answered every conflict.
    Resolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub kind: MergeKind,
    pub head: CommitHash,
    pub merge_commit: Option<CommitHash>,
    pub base: Option<CommitHash>,
    pub conflicts: Vec<MergeConflict>,
    pub resolutions: usize,
}

impl<B: Backend> History<B> {
    /// Merge branch `source` into whatever HEAD points at.
    pub fn merge(&mut self, source: &str, options: MergeOptions) -> HistoryResult<MergeOutcome> {
        let source_name = BranchName::new(source)?;
        let source_tip = self
            .backend
            .get_branch(&source_name)?
            .ok_or_else(|| HistoryError::BranchNotFound(source_name.to_string()))?;

        let Some(target_tip) = self.tip()? else {
            // unborn target: adopt the source history
            self.advance_head(&source_tip)?;
            tracing::info!(source = %source_name, "merge into unborn branch fast-forwarded");
            return Ok(MergeOutcome {
                kind: MergeKind::FastForward,
                head: source_tip,
                merge_commit: None,
                base: None,
                conflicts: Vec::new(),
                resolutions: 0,
            });
        };

        if dag::is_ancestor(&self.backend, &source_tip, &target_tip)? {
            return Ok(MergeOutcome {
                kind: MergeKind::UpToDate,
                head: target_tip,
                merge_commit: None,
                base: Some(source_tip),
                conflicts: Vec::new(),
                resolutions: 0,
            });
        }

        let base = dag::find_merge_base(&self.backend, &target_tip, &source_tip)?;

        if base.as_ref() == Some(&target_tip) && !options.no_ff {
            self.advance_head(&source_tip)?;
            tracing::info!(source = %source_name, to = %source_tip.short(), "fast-forward merge");
            return Ok(MergeOutcome {
                kind: MergeKind::FastForward,
                head: source_tip,
                merge_commit: None,
                base,
                conflicts: Vec::new(),
                resolutions: 0,
            });
        }

        let ours = dag::commits_since(&self.backend, &target_tip, base.as_ref())?;
        let theirs = dag::commits_since(&self.backend, &source_tip, base.as_ref())?;
        let conflicts = self.detect_conflicts(&ours, &theirs, base.as_ref())?;
        let resolutions = self.resolve_conflicts(&conflicts)?;

        let target_label = match self.backend.head()? {
            Head::Attached(branch) => branch.to_string(),
            Head::Detached(hash) => hash.short().to_string(),
        };
        let message = options
            .message
            .unwrap_or_else(|| format!("Merge branch '{source_name}' into {target_label}"));
        let resolution_count = resolutions.len();
        let payload = Content::Merge(MergeRecord {
            source: source_name.to_string(),
            target: target_label,
            resolutions,
        });

        let record = self.write_commit(
            &payload,
            vec![target_tip, source_tip],
            Operation::Append,
            None,
            CommitOptions::message(message),
        )?;

        let kind = if conflicts.is_empty() {
            MergeKind::Clean
        } else {
            MergeKind::Resolved
        };
        tracing::info!(
            source = %source_name,
            commit = %record.hash,
            kind = ?kind,
            conflicts = conflicts.len(),
            "merged"
        );
        Ok(MergeOutcome {
            kind,
            head: record.hash.clone(),
            merge_commit: Some(record.hash),
            base,
            conflicts,
            resolutions: resolution_count,
        })
    }

    /// Ask the resolver about every conflict. Nothing is written here.
    fn resolve_conflicts(&mut self, conflicts: &[MergeConflict]) -> HistoryResult<Vec<MergeResolution>> {
        if conflicts.is_empty() {
            return Ok(Vec::new());
        }
        let hazards: Vec<Hazard> = conflicts.iter().cloned().map(Hazard::Merge).collect();
        let Some(resolver) = self.resolver.as_mut() else {
            tracing::warn!(conflicts = hazards.len(), "merge conflicts with no resolver configured");
            return Err(HistoryError::Unresolved { hazards });
        };

        let mut resolutions = Vec::new();
        let mut deferred = Vec::new();
        for hazard in hazards {
            match resolver.resolve(&hazard) {
                Resolution::Resolved(content) => {
                    if content.is_structural() {
                        return Err(HistoryError::InvalidArgument(
                            "resolver returned a structural payload".into(),
                        ));
                    }
                    resolutions.push(MergeResolution {
                        target: hazard.target().clone(),
                        content,
                    });
                }
                Resolution::Skip => {}
                Resolution::Abort => {
                    tracing::warn!(commit = %hazard.target(), "merge aborted by resolver");
                    return Err(HistoryError::Aborted {
                        hazard: Box::new(hazard),
                    });
                }
                Resolution::Defer => deferred.push(hazard),
            }
        }

        if !deferred.is_empty() {
            tracing::warn!(deferred = deferred.len(), "merge deferred by resolver");
            return Err(HistoryError::Deferred { hazards: deferred });
        }
        Ok(resolutions)
    }

    /// Flag conflicting edits between the two sides. Edits aimed at pinned
    /// commits are inert and never conflict.
    pub(crate) fn detect_conflicts(
        &self,
        ours: &[CommitRecord],
        theirs: &[CommitRecord],
        base: Option<&CommitHash>,
    ) -> HistoryResult<Vec<MergeConflict>> {
        let ours_edits = self.live_edits(ours)?;
        let theirs_edits = self.live_edits(theirs)?;
        let ours_hashes: Vec<CommitHash> = ours.iter().map(|r| r.hash.clone()).collect();
        let theirs_hashes: Vec<CommitHash> = theirs.iter().map(|r| r.hash.clone()).collect();

        // (kind, target, ours, theirs)
        let mut flagged: Vec<(ConflictKind, CommitHash, CommitRecord, CommitRecord)> = Vec::new();
        let mut handled: HashSet<CommitHash> = HashSet::new();

        // (a) both sides edit the same target differently
        for o in ours_edits.iter().filter(|r| r.operation == Operation::Edit) {
            for t in theirs_edits.iter().filter(|r| r.operation == Operation::Edit) {
                if o.target == t.target && o.content_hash != t.content_hash {
                    if let Some(target) = &o.target {
                        if handled.insert(o.hash.clone()) | handled.insert(t.hash.clone()) {
                            flagged.push((ConflictKind::ConcurrentEdit, target.clone(), o.clone(), t.clone()));
                        }
                    }
                }
            }
        }

        // (b) edit of something the other side deleted or that is marked skip
        for (edits, other, ours_side) in [(&ours_edits, &theirs_edits, true), (&theirs_edits, &ours_edits, false)] {
            for edit in edits.iter().filter(|r| r.operation == Operation::Edit) {
                let Some(target) = &edit.target else { continue };
                if handled.contains(&edit.hash) {
                    continue;
                }
                let deleted = other
                    .iter()
                    .find(|r| r.operation == Operation::Delete && r.target.as_ref() == Some(target))
                    .cloned();
                let opponent = match deleted {
                    Some(delete) => Some(delete),
                    None if self.skip_annotated_shared(target, base)? => Some(self.get_commit(target)?),
                    None => None,
                };
                if let Some(opponent) = opponent {
                    handled.insert(edit.hash.clone());
                    let (o, t) = if ours_side { (edit.clone(), opponent) } else { (opponent, edit.clone()) };
                    flagged.push((ConflictKind::EditOfSkipped, target.clone(), o, t));
                }
            }
        }

        // (c) edit of shared history while the other side appended
        if let Some(base) = base {
            for (edits, other, ours_side) in [(&ours_edits, theirs, true), (&theirs_edits, ours, false)] {
                let Some(first_append) = other
                    .iter()
                    .find(|r| r.operation == Operation::Append && !r.is_merge())
                else {
                    continue;
                };
                for edit in edits.iter().filter(|r| r.operation == Operation::Edit) {
                    let Some(target) = &edit.target else { continue };
                    if handled.contains(&edit.hash) || !dag::is_ancestor(&self.backend, target, base)? {
                        continue;
                    }
                    handled.insert(edit.hash.clone());
                    let (o, t) = if ours_side { (edit, first_append) } else { (first_append, edit) };
                    flagged.push((ConflictKind::EditOfSharedHistory, target.clone(), o.clone(), t.clone()));
                }
            }
        }

        flagged
            .into_iter()
            .map(|(kind, target, o, t)| {
                self.build_conflict(kind, &target, &o, &t, base, &ours_hashes, &theirs_hashes)
            })
            .collect()
    }

    /// Explicitly annotated skip on a commit both sides can see. Category
    /// defaults do not count.
    fn skip_annotated_shared(&self, target: &CommitHash, base: Option<&CommitHash>) -> HistoryResult<bool> {
        let Some(base) = base else { return Ok(false) };
        let skipped = self
            .backend
            .latest_annotation(target, None)?
            .is_some_and(|a| a.priority == Priority::Skip);
        Ok(skipped && dag::is_ancestor(&self.backend, target, base)?)
    }

    /// EDIT/DELETE commits whose target is not pinned.
    fn live_edits(&self, side: &[CommitRecord]) -> HistoryResult<Vec<CommitRecord>> {
        let mut live = Vec::new();
        for record in side.iter().filter(|r| r.operation.has_target()) {
            let Some(target) = &record.target else { continue };
            if self.priority_of(target)? == Priority::Pinned {
                tracing::debug!(edit = %record.hash, pinned = %target, "edit of pinned commit is inert");
                continue;
            }
            live.push(record.clone());
        }
        Ok(live)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_conflict(
        &self,
        kind: ConflictKind,
        target: &CommitHash,
        ours: &CommitRecord,
        theirs: &CommitRecord,
        base: Option<&CommitHash>,
        ours_commits: &[CommitHash],
        theirs_commits: &[CommitHash],
    ) -> HistoryResult<MergeConflict> {
        Ok(MergeConflict {
            kind,
            target: target.clone(),
            original: self.get_content(target)?,
            ours: ours.clone(),
            ours_content: self.load_blob(ours)?,
            theirs: theirs.clone(),
            theirs_content: self.load_blob(theirs)?,
            base: base.cloned(),
            ours_commits: ours_commits.to_vec(),
            theirs_commits: theirs_commits.to_vec(),
        })
    }
}
