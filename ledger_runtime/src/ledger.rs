//! Ledger service: the write and read surfaces over a store.
//!
//! Concurrency: one `Mutex` around the store is the single serialization
//! point. It assigns insertion order and makes check-then-append guards
//! atomic. Reads load the log under the lock and project outside it.
//!
//! Write order:
//!   1. build and validate the operation (kernel writer)
//!   2. optional guards against the current log (config / expected state)
//!   3. append to the store
//!   4. notify subscribers, still under the lock, so they see log order
//!
//! Retries: the per-kind write functions mint a fresh id on every call.
//! To retry after a retryable store error, build the operation once with
//! `prepare` and hand the same value to `append` until it succeeds.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ledger_kernel::aggregation::{self, ActorActivity, Board, WorkspaceStats};
use ledger_kernel::domain::{Annotation, Commitment, CommitmentState, Memory};
use ledger_kernel::error::ValidationError;
use ledger_kernel::operations::{
    AnnotatePayload, CapturePayload, CommitPayload, Evidence, Operation, OperationBody,
    OperationKind, SubmitPayload,
};
use ledger_kernel::projector::{self, LedgerView};
use ledger_kernel::transitions::{allowed_operations, check_transition};
use ledger_kernel::writer::{evidence_of, new_operation, targets_commitment, validate_operation};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::file_store::FileStore;
use crate::replay;
use crate::store::{read_ordered, OperationStore};

/// Source of "now" for new operations and stats windows.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Operations buffered per subscriber before it is considered lagging.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 1024;

pub struct Ledger<S> {
    store: Mutex<S>,
    subscribers: Mutex<Vec<SyncSender<Operation>>>,
    config: LedgerConfig,
    clock: Clock,
}

impl Ledger<FileStore> {
    /// Open a durable ledger rooted at `config.data_dir`.
    pub fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        let store = FileStore::open(&config.data_dir)?.with_fsync(config.fsync);
        info!(data_dir = %config.data_dir.display(), "ledger opened");
        Ok(Self::new(store, config))
    }
}

impl<S: OperationStore> Ledger<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store: Mutex::new(store),
            subscribers: Mutex::new(Vec::new()),
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Receive every operation appended from now on, in log order.
    pub fn subscribe(&self) -> Result<Receiver<Operation>, LedgerError> {
        self.subscribe_with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// Like `subscribe`, buffering at most `capacity` unread operations.
    ///
    /// A subscriber whose buffer is full is dropped rather than blocking
    /// writers: its receiver drains what was buffered and then reports
    /// disconnection, after which the reader should re-read the log.
    pub fn subscribe_with_capacity(
        &self,
        capacity: usize,
    ) -> Result<Receiver<Operation>, LedgerError> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        self.subscribers
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .push(tx);
        Ok(rx)
    }

    // ── Write surface ──────────────────────────────────────────

    pub fn capture(
        &self,
        workspace_id: &str,
        actor: &str,
        body: impl Into<String>,
    ) -> Result<Operation, LedgerError> {
        self.capture_with(workspace_id, actor, CapturePayload::new(body))
    }

    /// Capture with the optional kind, refs and meta set.
    pub fn capture_with(
        &self,
        workspace_id: &str,
        actor: &str,
        payload: CapturePayload,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::Capture(payload))
    }

    pub fn commit(
        &self,
        workspace_id: &str,
        actor: &str,
        body: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Operation, LedgerError> {
        self.commit_with(workspace_id, actor, CommitPayload::new(body, source))
    }

    /// Commit with tags and meta set.
    pub fn commit_with(
        &self,
        workspace_id: &str,
        actor: &str,
        payload: CommitPayload,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::Commit(payload))
    }

    pub fn claim(
        &self,
        workspace_id: &str,
        actor: &str,
        commitment: &str,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::claim(commitment))
    }

    pub fn release(
        &self,
        workspace_id: &str,
        actor: &str,
        commitment: &str,
        reason: Option<String>,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::release(commitment, reason))
    }

    pub fn submit(
        &self,
        workspace_id: &str,
        actor: &str,
        commitment: &str,
    ) -> Result<Operation, LedgerError> {
        self.submit_with(workspace_id, actor, SubmitPayload::new(commitment))
    }

    /// Submit for review with offered evidence and a summary.
    pub fn submit_with(
        &self,
        workspace_id: &str,
        actor: &str,
        payload: SubmitPayload,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::Submit(payload))
    }

    pub fn approve(
        &self,
        workspace_id: &str,
        actor: &str,
        commitment: &str,
        evidence: &str,
    ) -> Result<Operation, LedgerError> {
        let evidence = require_evidence(OperationKind::Approve, commitment, evidence)?;
        self.record(
            workspace_id,
            actor,
            OperationBody::approve(commitment, Some(evidence)),
        )
    }

    /// Close `commitment`. Blank evidence is rejected before the log is touched.
    pub fn close(
        &self,
        workspace_id: &str,
        actor: &str,
        commitment: &str,
        evidence: &str,
    ) -> Result<Operation, LedgerError> {
        let evidence = require_evidence(OperationKind::Close, commitment, evidence)?;
        self.record(workspace_id, actor, OperationBody::close(commitment, evidence))
    }

    pub fn reopen(
        &self,
        workspace_id: &str,
        actor: &str,
        commitment: &str,
        reason: impl Into<String>,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::reopen(commitment, reason))
    }

    pub fn annotate(
        &self,
        workspace_id: &str,
        actor: &str,
        target: &str,
        body: impl Into<String>,
    ) -> Result<Operation, LedgerError> {
        self.annotate_with(workspace_id, actor, AnnotatePayload::new(target, body))
    }

    /// Annotate with a kind, refs and meta, e.g. an `external_ref` link.
    pub fn annotate_with(
        &self,
        workspace_id: &str,
        actor: &str,
        payload: AnnotatePayload,
    ) -> Result<Operation, LedgerError> {
        self.record(workspace_id, actor, OperationBody::Annotate(payload))
    }

    /// Validate, stamp and append an operation with an arbitrary payload.
    pub fn record(
        &self,
        workspace_id: &str,
        actor: &str,
        body: OperationBody,
    ) -> Result<Operation, LedgerError> {
        let op = self.prepare(workspace_id, actor, body)?;
        self.append_checked(op, None)
    }

    /// Validate and stamp an operation without appending it.
    pub fn prepare(
        &self,
        workspace_id: &str,
        actor: &str,
        body: OperationBody,
    ) -> Result<Operation, LedgerError> {
        let kind = body.kind();
        new_operation(workspace_id, actor, body, (self.clock)()).map_err(|err| {
            warn!(workspace = workspace_id, %kind, %err, "rejected invalid operation");
            LedgerError::from(err)
        })
    }

    /// Append an operation built by `prepare` (or by a foreign writer).
    ///
    /// Re-submitting an operation that is already stored with identical
    /// content succeeds without a second entry and without re-running the
    /// guards. Subscribers receive it again and should dedupe by id.
    pub fn append(&self, op: Operation) -> Result<Operation, LedgerError> {
        if let Err(err) = validate_operation(&op) {
            warn!(workspace = %op.workspace_id, id = %op.id, %err, "rejected invalid operation");
            return Err(err.into());
        }
        self.append_checked(op, None)
    }

    /// Append only if the targeted commitment is still in `expected`.
    ///
    /// The check and the append happen under the same lock, so two callers
    /// racing from the same observed state cannot both succeed. Operations
    /// that target no commitment ignore `expected`.
    pub fn record_expecting(
        &self,
        workspace_id: &str,
        actor: &str,
        body: OperationBody,
        expected: CommitmentState,
    ) -> Result<Operation, LedgerError> {
        let op = self.prepare(workspace_id, actor, body)?;
        self.append_checked(op, Some(expected))
    }

    fn append_checked(
        &self,
        op: Operation,
        expected: Option<CommitmentState>,
    ) -> Result<Operation, LedgerError> {
        let kind = op.kind();
        let workspace_id = op.workspace_id.as_str();

        let mut store = self.lock_store()?;
        if store.contains(workspace_id, &op.id)? {
            let sequence = store.append(&op)?;
            debug!(
                workspace = workspace_id,
                id = %op.id,
                %kind,
                sequence,
                "operation already recorded"
            );
            self.notify(&op);
            return Ok(op);
        }

        if expected.is_some() || self.needs_history(kind) {
            let ops = read_ordered(store.load(workspace_id)?);
            if let Err(err) = self.guard(&ops, &op, expected) {
                warn!(workspace = workspace_id, id = %op.id, %kind, %err, "rejected operation");
                return Err(err);
            }
        }

        let sequence = store.append(&op)?;
        debug!(workspace = workspace_id, id = %op.id, %kind, sequence, "appended operation");
        self.notify(&op);
        Ok(op)
    }

    fn needs_history(&self, kind: OperationKind) -> bool {
        let references_memory = matches!(
            kind,
            OperationKind::Commit | OperationKind::Close | OperationKind::Approve
        );
        (self.config.require_known_evidence && references_memory)
            || (self.config.enforce_transitions
                && (targets_commitment(kind) || kind == OperationKind::Annotate))
    }

    fn guard(
        &self,
        ops: &[Operation],
        op: &Operation,
        expected: Option<CommitmentState>,
    ) -> Result<(), LedgerError> {
        let unknown = |kind: &'static str, id: &str| LedgerError::UnknownRecord {
            workspace: op.workspace_id.clone(),
            kind,
            id: id.to_string(),
        };

        if self.config.require_known_evidence {
            let memory = match &op.body {
                OperationBody::Commit(p) => Some(p.source.as_str()),
                other => evidence_of(other),
            };
            if let Some(id) = memory {
                if !projector::memory_exists(ops, id) {
                    return Err(unknown("memory", id));
                }
            }
        }

        if let OperationBody::Annotate(p) = &op.body {
            if self.config.enforce_transitions && !projector::record_exists(ops, &p.target) {
                return Err(unknown("record", &p.target));
            }
        }

        let Some(commitment_id) = op.commitment_ref() else {
            return Ok(());
        };
        if expected.is_none() && !self.config.enforce_transitions {
            return Ok(());
        }
        let commitment = projector::get_commitment(ops, commitment_id)
            .ok_or_else(|| unknown("commitment", commitment_id))?;

        if let Some(expected) = expected {
            if commitment.state != expected {
                return Err(LedgerError::StateConflict {
                    commitment: commitment.id,
                    expected,
                    actual: commitment.state,
                });
            }
        }
        if self.config.enforce_transitions {
            check_transition(&commitment, op.kind(), &op.actor)?;
        }
        Ok(())
    }

    fn notify(&self, op: &Operation) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            warn!(id = %op.id, "subscriber list poisoned, notification dropped");
            return;
        };
        subscribers.retain(|tx| match tx.try_send(op.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(id = %op.id, "subscriber lagging, disconnected");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, S>, LedgerError> {
        self.store.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    // ── Read surface ───────────────────────────────────────────

    /// The workspace log in replay order.
    pub fn operations(&self, workspace_id: &str) -> Result<Vec<Operation>, LedgerError> {
        let raw = self.lock_store()?.load(workspace_id)?;
        Ok(read_ordered(raw))
    }

    /// Full replay of a workspace: the projected view and its hash.
    pub fn replay(&self, workspace_id: &str) -> Result<(LedgerView, String), LedgerError> {
        let ops = self.operations(workspace_id)?;
        let (view, hash) = replay::rebuild_view(&ops);
        info!(
            workspace = workspace_id,
            operations = ops.len(),
            memories = view.memories.len(),
            commitments = view.commitments.len(),
            %hash,
            "replayed workspace"
        );
        Ok((view, hash))
    }

    pub fn list_memories(&self, workspace_id: &str) -> Result<Vec<Memory>, LedgerError> {
        Ok(projector::project_memories(&self.operations(workspace_id)?))
    }

    pub fn get_memory(&self, workspace_id: &str, id: &str) -> Result<Option<Memory>, LedgerError> {
        Ok(projector::get_memory(&self.operations(workspace_id)?, id))
    }

    pub fn list_commitments(&self, workspace_id: &str) -> Result<Vec<Commitment>, LedgerError> {
        Ok(projector::project_commitments(&self.operations(workspace_id)?))
    }

    pub fn get_commitment(
        &self,
        workspace_id: &str,
        id: &str,
    ) -> Result<Option<Commitment>, LedgerError> {
        Ok(projector::get_commitment(&self.operations(workspace_id)?, id))
    }

    pub fn commitment_timeline(
        &self,
        workspace_id: &str,
        id: &str,
    ) -> Result<Vec<Operation>, LedgerError> {
        Ok(aggregation::commitment_timeline(&self.operations(workspace_id)?, id))
    }

    /// Stats with the configured window ending at the ledger clock's "now".
    pub fn workspace_stats(&self, workspace_id: &str) -> Result<WorkspaceStats, LedgerError> {
        let ops = self.operations(workspace_id)?;
        Ok(aggregation::compute_stats_with_window(
            &ops,
            (self.clock)(),
            self.config.stats_window(),
        ))
    }

    pub fn external_refs(
        &self,
        workspace_id: &str,
        id: &str,
    ) -> Result<Vec<Annotation>, LedgerError> {
        Ok(aggregation::external_refs(&self.operations(workspace_id)?, id))
    }

    pub fn commitments_from_source(
        &self,
        workspace_id: &str,
        memory_id: &str,
    ) -> Result<Vec<Commitment>, LedgerError> {
        Ok(aggregation::commitments_from_source(
            &self.operations(workspace_id)?,
            memory_id,
        ))
    }

    pub fn commitments_with_evidence(
        &self,
        workspace_id: &str,
        memory_id: &str,
    ) -> Result<Vec<Commitment>, LedgerError> {
        Ok(aggregation::commitments_with_evidence(
            &self.operations(workspace_id)?,
            memory_id,
        ))
    }

    pub fn kanban_board(&self, workspace_id: &str) -> Result<Board, LedgerError> {
        Ok(aggregation::kanban_board(&self.operations(workspace_id)?))
    }

    pub fn actor_activity(
        &self,
        workspace_id: &str,
    ) -> Result<BTreeMap<String, ActorActivity>, LedgerError> {
        Ok(aggregation::actor_activity(&self.operations(workspace_id)?))
    }

    pub fn recent_operations(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> Result<Vec<Operation>, LedgerError> {
        Ok(aggregation::recent_operations(
            &self.operations(workspace_id)?,
            limit,
        ))
    }

    /// Operations `actor` may apply to a commitment under the transition policy.
    /// `None` when the commitment does not exist.
    pub fn allowed_operations(
        &self,
        workspace_id: &str,
        commitment_id: &str,
        actor: &str,
    ) -> Result<Option<Vec<OperationKind>>, LedgerError> {
        Ok(self
            .get_commitment(workspace_id, commitment_id)?
            .map(|c| allowed_operations(&c, actor)))
    }
}

fn require_evidence(
    kind: OperationKind,
    commitment: &str,
    evidence: &str,
) -> Result<Evidence, LedgerError> {
    Evidence::new(evidence).map_err(|_| {
        warn!(%kind, commitment, "rejected closing operation without evidence");
        LedgerError::Validation(ValidationError::MissingEvidence { kind })
    })
}
