use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::compile::CompiledMessage;
use crate::content::Role;
use crate::types::CommitHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Ordered hash is not part of the compiled output.
    UnknownCommit,
    /// Hash, or a second hash of an aggregated message, already placed.
    DuplicateReference,
    /// An edit was ordered ahead of the commit it replaces.
    EditBeforeTarget,
    /// The leading system message no longer comes first.
    SystemMoved,
}

/// Non-fatal observation about a requested ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileWarning {
    pub kind: WarningKind,
    pub commit: CommitHash,
    pub message: String,
}

/// Move messages named in `order` to the front, in that order. Messages not
/// named keep their relative order after them.
///
/// Edit hashes resolve to the message of the commit they replace.
pub fn reorder(
    messages: Vec<CompiledMessage>,
    order: &[CommitHash],
    edit_targets: &HashMap<CommitHash, CommitHash>,
) -> (Vec<CompiledMessage>, Vec<CompileWarning>) {
    let mut warnings = Vec::new();

    let mut index: HashMap<&CommitHash, usize> = HashMap::new();
    for (i, message) in messages.iter().enumerate() {
        for hash in &message.commits {
            index.insert(hash, i);
        }
    }
    let position_in_order: HashMap<&CommitHash, usize> =
        order.iter().enumerate().rev().map(|(i, h)| (h, i)).collect();

    let mut placed: Vec<usize> = Vec::new();
    let mut placed_set: HashSet<usize> = HashSet::new();

    for (pos, hash) in order.iter().enumerate() {
        let resolved = if index.contains_key(hash) {
            hash
        } else if let Some(target) = edit_targets.get(hash) {
            if position_in_order.get(target).is_some_and(|&t| pos < t) {
                warnings.push(CompileWarning {
                    kind: WarningKind::EditBeforeTarget,
                    commit: hash.clone(),
                    message: format!("edit {} ordered before its target {}", hash.short(), target.short()),
                });
            }
            target
        } else {
            warnings.push(CompileWarning {
                kind: WarningKind::UnknownCommit,
                commit: hash.clone(),
                message: format!("{} is not in the compiled output", hash.short()),
            });
            continue;
        };

        let Some(&msg_idx) = index.get(resolved) else {
            warnings.push(CompileWarning {
                kind: WarningKind::UnknownCommit,
                commit: hash.clone(),
                message: format!("target of {} is not in the compiled output", hash.short()),
            });
            continue;
        };

        if !placed_set.insert(msg_idx) {
            warnings.push(CompileWarning {
                kind: WarningKind::DuplicateReference,
                commit: hash.clone(),
                message: format!("{} refers to an already placed message", hash.short()),
            });
            continue;
        }
        placed.push(msg_idx);
    }

    let leading_system = messages
        .first()
        .filter(|m| m.role == Role::System)
        .and_then(|m| m.commits.first().cloned());

    let mut slots: Vec<Option<CompiledMessage>> = messages.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(slots.len());
    for idx in placed {
        if let Some(message) = slots[idx].take() {
            out.push(message);
        }
    }
    out.extend(slots.into_iter().flatten());

    if let Some(system_hash) = leading_system {
        if out.first().map_or(true, |m| m.role != Role::System) {
            warnings.push(CompileWarning {
                kind: WarningKind::SystemMoved,
                commit: system_hash,
                message: "system message is no longer first".to_string(),
            });
        }
    }

    (out, warnings)
}
