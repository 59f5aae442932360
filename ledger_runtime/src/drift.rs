//! Drift detection: determinism verification and view comparison.
//!
//! Compares two projections (typically of two prefixes of the same log)
//! and reports what appeared and which commitments moved.

use std::collections::{BTreeMap, BTreeSet};

use ledger_kernel::domain::CommitmentState;
use ledger_kernel::operations::Operation;
use ledger_kernel::projector::LedgerView;
use thiserror::Error;

use crate::replay;

/// Two replays of the same log hashed differently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("determinism failure: replays hashed {first} and {second}")]
pub struct DeterminismFailure {
    pub first: String,
    pub second: String,
}

/// Replay the same operations twice and require identical hashes.
/// Returns the agreed hash.
pub fn verify_determinism(ops: &[Operation]) -> Result<String, DeterminismFailure> {
    let first = replay::rebuild_hash(ops);
    let second = replay::rebuild_hash(ops);
    if first != second {
        return Err(DeterminismFailure { first, second });
    }
    Ok(first)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub commitment: String,
    pub from: CommitmentState,
    pub to: CommitmentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriftReport {
    pub memory_count_a: usize,
    pub memory_count_b: usize,
    pub commitment_count_a: usize,
    pub commitment_count_b: usize,
    pub added_memories: Vec<String>,
    pub removed_memories: Vec<String>,
    pub added_commitments: Vec<String>,
    pub removed_commitments: Vec<String>,
    /// Commitments present in both views whose state differs, by id.
    pub state_changes: Vec<StateChange>,
    /// Commitments present in both views whose owner differs, by id.
    pub owner_changes: Vec<String>,
    /// Records present in both views that gained or lost annotations.
    pub annotation_changes: Vec<String>,
}

impl DriftReport {
    pub fn is_empty(&self) -> bool {
        self.added_memories.is_empty()
            && self.removed_memories.is_empty()
            && self.added_commitments.is_empty()
            && self.removed_commitments.is_empty()
            && self.state_changes.is_empty()
            && self.owner_changes.is_empty()
            && self.annotation_changes.is_empty()
    }
}

/// Structured comparison of two views. Lists are sorted by id.
pub fn compare_views(a: &LedgerView, b: &LedgerView) -> DriftReport {
    let mem_a: BTreeMap<&str, usize> = a
        .memories
        .iter()
        .map(|m| (m.id.as_str(), m.annotations.len()))
        .collect();
    let mem_b: BTreeMap<&str, usize> = b
        .memories
        .iter()
        .map(|m| (m.id.as_str(), m.annotations.len()))
        .collect();
    let cmt_a: BTreeMap<&str, _> = a.commitments.iter().map(|c| (c.id.as_str(), c)).collect();
    let cmt_b: BTreeMap<&str, _> = b.commitments.iter().map(|c| (c.id.as_str(), c)).collect();

    let (added_memories, removed_memories) = key_diff(&mem_a, &mem_b);
    let (added_commitments, removed_commitments) = key_diff(&cmt_a, &cmt_b);

    let mut state_changes = Vec::new();
    let mut owner_changes = Vec::new();
    let mut annotated = BTreeSet::new();

    for (id, before) in &cmt_a {
        let Some(after) = cmt_b.get(id) else { continue };
        if before.state != after.state {
            state_changes.push(StateChange {
                commitment: id.to_string(),
                from: before.state,
                to: after.state,
            });
        }
        if before.owner != after.owner {
            owner_changes.push(id.to_string());
        }
        if before.annotations.len() != after.annotations.len() {
            annotated.insert(id.to_string());
        }
    }
    for (id, before) in &mem_a {
        if mem_b.get(id).is_some_and(|after| after != before) {
            annotated.insert(id.to_string());
        }
    }

    DriftReport {
        memory_count_a: a.memories.len(),
        memory_count_b: b.memories.len(),
        commitment_count_a: a.commitments.len(),
        commitment_count_b: b.commitments.len(),
        added_memories,
        removed_memories,
        added_commitments,
        removed_commitments,
        state_changes,
        owner_changes,
        annotation_changes: annotated.into_iter().collect(),
    }
}

fn key_diff<V>(a: &BTreeMap<&str, V>, b: &BTreeMap<&str, V>) -> (Vec<String>, Vec<String>) {
    let added = b
        .keys()
        .filter(|k| !a.contains_key(*k))
        .map(|k| k.to_string())
        .collect();
    let removed = a
        .keys()
        .filter(|k| !b.contains_key(*k))
        .map(|k| k.to_string())
        .collect();
    (added, removed)
}
