//! Ledger Kernel: Aggregation Layer
//!
//! Statistics, timelines and cross-reference indexes built on top of the
//! projector. Pure functions over the workspace's operations in log order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::{Annotation, Commitment, CommitmentState};
use crate::operations::{Operation, OperationKind};
use crate::projector::{project_annotations, project_commitments, project_memories};
use crate::transitions::CommitmentFold;

/// Annotation kind used to link records held by external systems.
pub const EXTERNAL_REF_KIND: &str = "external_ref";

/// Default look-back for `closed_this_week`.
pub const DEFAULT_STATS_WINDOW_DAYS: i64 = 7;

// ---------------------------------------------------------------------------
// Workspace statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceStats {
    pub open_count: usize,
    pub claimed_count: usize,
    pub in_review_count: usize,
    pub closed_count: usize,
    pub closed_this_week: usize,
    pub total_memories: usize,
    pub active_actors: BTreeSet<String>,
}

/// Statistics with the default seven-day window ending at `now`.
pub fn compute_stats(ops: &[Operation], now: DateTime<Utc>) -> WorkspaceStats {
    compute_stats_with_window(ops, now, Duration::days(DEFAULT_STATS_WINDOW_DAYS))
}

/// `closed_this_week` counts closed commitments whose closing operation
/// (a `close`, or an `approve` carrying evidence) falls inside the window.
/// When a commitment was closed more than once, the last closing
/// operation is the one that produced its current state.
pub fn compute_stats_with_window(
    ops: &[Operation],
    now: DateTime<Utc>,
    window: Duration,
) -> WorkspaceStats {
    let commitments = project_commitments(ops);
    let since = now - window;

    let count = |state: CommitmentState| commitments.iter().filter(|c| c.state == state).count();

    let closed_this_week = commitments
        .iter()
        .filter(|c| c.state == CommitmentState::Closed && c.evidence.is_some())
        .filter_map(|c| last_closing_op(ops, &c.id))
        .filter(|op| op.timestamp >= since)
        .count();

    WorkspaceStats {
        open_count: count(CommitmentState::Open),
        claimed_count: count(CommitmentState::Claimed),
        in_review_count: count(CommitmentState::InReview),
        closed_count: count(CommitmentState::Closed),
        closed_this_week,
        total_memories: project_memories(ops).len(),
        active_actors: ops.iter().map(|op| op.actor.clone()).collect(),
    }
}

fn last_closing_op<'a>(ops: &'a [Operation], commitment_id: &str) -> Option<&'a Operation> {
    ops.iter()
        .rev()
        .find(|op| op.commitment_ref() == Some(commitment_id) && CommitmentFold::is_closing(op))
}

// ---------------------------------------------------------------------------
// Timelines and cross references
// ---------------------------------------------------------------------------

/// Every operation in the history of `commitment_id`: its `commit`, each
/// lifecycle operation and each annotation, oldest first. Ties keep log order.
pub fn commitment_timeline(ops: &[Operation], commitment_id: &str) -> Vec<Operation> {
    let mut timeline: Vec<Operation> = ops
        .iter()
        .filter(|op| op.kind() != OperationKind::Capture && op.references(commitment_id))
        .cloned()
        .collect();
    timeline.sort_by_key(|op| op.timestamp);
    timeline
}

/// Commitments opened from `memory_id`.
pub fn commitments_from_source(ops: &[Operation], memory_id: &str) -> Vec<Commitment> {
    project_commitments(ops)
        .into_iter()
        .filter(|c| c.source == memory_id)
        .collect()
}

/// Commitments whose derived evidence is `memory_id`.
pub fn commitments_with_evidence(ops: &[Operation], memory_id: &str) -> Vec<Commitment> {
    project_commitments(ops)
        .into_iter()
        .filter(|c| c.evidence.as_deref() == Some(memory_id))
        .collect()
}

/// Annotations on `target_id` that link an external record.
pub fn external_refs(ops: &[Operation], target_id: &str) -> Vec<Annotation> {
    project_annotations(ops, target_id)
        .into_iter()
        .filter(|a| a.kind.as_deref() == Some(EXTERNAL_REF_KIND))
        .collect()
}

/// The `limit` most recent operations, newest first.
pub fn recent_operations(ops: &[Operation], limit: usize) -> Vec<Operation> {
    ops.iter().rev().take(limit).cloned().collect()
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardColumn {
    Todo,
    InProgress,
    InReview,
    Done,
    Cancelled,
}

impl BoardColumn {
    pub fn for_state(state: CommitmentState) -> Self {
        match state {
            CommitmentState::Open => BoardColumn::Todo,
            CommitmentState::Claimed | CommitmentState::Reopened => BoardColumn::InProgress,
            CommitmentState::InReview => BoardColumn::InReview,
            CommitmentState::Closed => BoardColumn::Done,
            CommitmentState::Cancelled => BoardColumn::Cancelled,
        }
    }
}

/// Commitments grouped by board column.
///
/// Todo, done and cancelled list newest first; in-progress and in-review
/// list oldest first so the longest-running work sits on top.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Board {
    pub todo: Vec<Commitment>,
    pub in_progress: Vec<Commitment>,
    pub in_review: Vec<Commitment>,
    pub done: Vec<Commitment>,
    pub cancelled: Vec<Commitment>,
}

impl Board {
    pub fn column(&self, column: BoardColumn) -> &[Commitment] {
        match column {
            BoardColumn::Todo => &self.todo,
            BoardColumn::InProgress => &self.in_progress,
            BoardColumn::InReview => &self.in_review,
            BoardColumn::Done => &self.done,
            BoardColumn::Cancelled => &self.cancelled,
        }
    }
}

pub fn kanban_board(ops: &[Operation]) -> Board {
    let mut board = Board::default();
    for c in project_commitments(ops) {
        match BoardColumn::for_state(c.state) {
            BoardColumn::Todo => board.todo.push(c),
            BoardColumn::InProgress => board.in_progress.push(c),
            BoardColumn::InReview => board.in_review.push(c),
            BoardColumn::Done => board.done.push(c),
            BoardColumn::Cancelled => board.cancelled.push(c),
        }
    }

    let newest_first = |a: &Commitment, b: &Commitment| b.timestamp.cmp(&a.timestamp);
    let oldest_first = |a: &Commitment, b: &Commitment| a.timestamp.cmp(&b.timestamp);
    board.todo.sort_by(newest_first);
    board.in_progress.sort_by(oldest_first);
    board.in_review.sort_by(oldest_first);
    board.done.sort_by(newest_first);
    board.cancelled.sort_by(newest_first);
    board
}

// ---------------------------------------------------------------------------
// Per-actor activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorActivity {
    pub operations: usize,
    pub by_kind: BTreeMap<OperationKind, usize>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Commitments this actor closed (directly or by approval) that are
    /// still closed.
    pub closed_commitments: usize,
}

pub fn actor_activity(ops: &[Operation]) -> BTreeMap<String, ActorActivity> {
    let mut activity: BTreeMap<String, ActorActivity> = BTreeMap::new();
    for op in ops {
        let entry = activity
            .entry(op.actor.clone())
            .or_insert_with(|| ActorActivity {
                operations: 0,
                by_kind: BTreeMap::new(),
                first_seen: op.timestamp,
                last_seen: op.timestamp,
                closed_commitments: 0,
            });
        entry.operations += 1;
        *entry.by_kind.entry(op.kind()).or_insert(0) += 1;
        entry.first_seen = entry.first_seen.min(op.timestamp);
        entry.last_seen = entry.last_seen.max(op.timestamp);
    }

    for c in project_commitments(ops) {
        if let (CommitmentState::Closed, Some(closer)) = (c.state, c.closed_by.as_deref()) {
            if let Some(entry) = activity.get_mut(closer) {
                entry.closed_commitments += 1;
            }
        }
    }
    activity
}
