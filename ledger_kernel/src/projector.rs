//! Ledger Kernel: Projector
//!
//! Pure, deterministic replay of present-tense entities from the
//! immutable past. Every function takes the workspace's operations in
//! log order and recomputes from scratch; nothing is cached between calls.
//!
//! Bulk projection indexes the log in one pass (target id -> annotations,
//! commitment id -> fold). Single-record lookups scan the log directly.
//! Both paths share the record builders below and must agree.

use std::collections::HashMap;

use crate::domain::{Annotation, Commitment, Memory};
use crate::operations::{CapturePayload, CommitPayload, Operation, OperationBody};
use crate::transitions::{derive_commitment_state, CommitmentFold};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Annotations attached to `target_id`, in log order.
pub fn project_annotations(ops: &[Operation], target_id: &str) -> Vec<Annotation> {
    ops.iter()
        .filter(|op| op.annotation_target() == Some(target_id))
        .filter_map(build_annotation)
        .collect()
}

/// One memory per `capture` operation, in log order.
pub fn project_memories(ops: &[Operation]) -> Vec<Memory> {
    let notes = index_annotations(ops);
    ops.iter()
        .filter_map(|op| match &op.body {
            OperationBody::Capture(p) => {
                Some(build_memory(op, p, notes_for(&notes, &op.id)))
            }
            _ => None,
        })
        .collect()
}

/// One commitment per `commit` operation, in log order, each with its
/// lifecycle replayed from the full history.
pub fn project_commitments(ops: &[Operation]) -> Vec<Commitment> {
    let notes = index_annotations(ops);
    let mut folds: HashMap<&str, CommitmentFold> = HashMap::new();
    for op in ops {
        if let Some(cmt) = op.commitment_ref() {
            folds.entry(cmt).or_default().apply(op);
        }
    }

    ops.iter()
        .filter_map(|op| match &op.body {
            OperationBody::Commit(p) => {
                let fold = folds.get(op.id.as_str()).cloned().unwrap_or_default();
                Some(build_commitment(op, p, fold, notes_for(&notes, &op.id)))
            }
            _ => None,
        })
        .collect()
}

/// The memory captured as `id`, if any.
pub fn get_memory(ops: &[Operation], id: &str) -> Option<Memory> {
    ops.iter().find_map(|op| match &op.body {
        OperationBody::Capture(p) if op.id == id => {
            Some(build_memory(op, p, project_annotations(ops, id)))
        }
        _ => None,
    })
}

/// The commitment opened as `id`, if any.
pub fn get_commitment(ops: &[Operation], id: &str) -> Option<Commitment> {
    ops.iter().find_map(|op| match &op.body {
        OperationBody::Commit(p) if op.id == id => Some(build_commitment(
            op,
            p,
            derive_commitment_state(ops, id),
            project_annotations(ops, id),
        )),
        _ => None,
    })
}

pub fn memory_exists(ops: &[Operation], id: &str) -> bool {
    ops.iter()
        .any(|op| op.id == id && matches!(op.body, OperationBody::Capture(_)))
}

pub fn commitment_exists(ops: &[Operation], id: &str) -> bool {
    ops.iter()
        .any(|op| op.id == id && matches!(op.body, OperationBody::Commit(_)))
}

/// True if `id` names a memory or a commitment.
pub fn record_exists(ops: &[Operation], id: &str) -> bool {
    memory_exists(ops, id) || commitment_exists(ops, id)
}

/// Full projection of one workspace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerView {
    pub memories: Vec<Memory>,
    pub commitments: Vec<Commitment>,
}

impl LedgerView {
    pub fn project(ops: &[Operation]) -> Self {
        Self {
            memories: project_memories(ops),
            commitments: project_commitments(ops),
        }
    }

    pub fn memory(&self, id: &str) -> Option<&Memory> {
        self.memories.iter().find(|m| m.id == id)
    }

    pub fn commitment(&self, id: &str) -> Option<&Commitment> {
        self.commitments.iter().find(|c| c.id == id)
    }
}

// ---------------------------------------------------------------------------
// Record builders (private)
// ---------------------------------------------------------------------------

fn build_annotation(op: &Operation) -> Option<Annotation> {
    match &op.body {
        OperationBody::Annotate(p) => Some(Annotation {
            id: op.id.clone(),
            body: p.body.clone(),
            kind: p.kind.clone(),
            actor: op.actor.clone(),
            timestamp: op.timestamp,
        }),
        _ => None,
    }
}

fn build_memory(op: &Operation, p: &CapturePayload, annotations: Vec<Annotation>) -> Memory {
    Memory {
        id: op.id.clone(),
        body: p.body.clone(),
        kind: p.kind.clone(),
        actor: op.actor.clone(),
        timestamp: op.timestamp,
        refs: p.refs.clone(),
        meta: p.meta.clone(),
        annotations,
    }
}

fn build_commitment(
    op: &Operation,
    p: &CommitPayload,
    fold: CommitmentFold,
    annotations: Vec<Annotation>,
) -> Commitment {
    Commitment {
        id: op.id.clone(),
        body: p.body.clone(),
        source: p.source.clone(),
        state: fold.state,
        owner: fold.owner,
        evidence: fold.evidence,
        closed_by: fold.closed_by,
        actor: op.actor.clone(),
        timestamp: op.timestamp,
        tags: p.tags.clone(),
        meta: p.meta.clone(),
        annotations,
    }
}

fn index_annotations(ops: &[Operation]) -> HashMap<&str, Vec<Annotation>> {
    let mut index: HashMap<&str, Vec<Annotation>> = HashMap::new();
    for op in ops {
        if let (Some(target), Some(note)) = (op.annotation_target(), build_annotation(op)) {
            index.entry(target).or_default().push(note);
        }
    }
    index
}

fn notes_for(index: &HashMap<&str, Vec<Annotation>>, id: &str) -> Vec<Annotation> {
    index.get(id).cloned().unwrap_or_default()
}
