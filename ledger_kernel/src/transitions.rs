//! Ledger Kernel: Commitment State Machine
//!
//! ALL commitment state derivation lives here.
//!
//! The fold is last-writer-wins over the ordered operation sequence:
//! every lifecycle operation overwrites the effect of the previous one,
//! whatever the current state is. Legality of a transition is a policy
//! concern (`check_transition`) layered on top for writers that want it;
//! replay never consults it.
//!
//! | operation | state     | owner   | evidence         | closed_by |
//! |-----------|-----------|---------|------------------|-----------|
//! | claim     | claimed   | = actor | unchanged        | unchanged |
//! | release   | open      | none    | unchanged        | unchanged |
//! | submit    | in_review | kept    | unchanged        | unchanged |
//! | approve   | closed    | none    | = payload.evidence | = actor |
//! | close     | closed    | none    | = payload.evidence | = actor |
//! | reopen    | reopened  | kept    | unchanged        | unchanged |
//!
//! Both closing rows read an `Evidence` value, which cannot be empty.
//! An approve without evidence leaves the fold untouched.

use thiserror::Error;

use crate::domain::{Commitment, CommitmentState};
use crate::operations::{Operation, OperationBody, OperationKind};

// ---------------------------------------------------------------------------
// Fold
// ---------------------------------------------------------------------------

/// The replayed lifecycle fields of one commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentFold {
    pub state: CommitmentState,
    pub owner: Option<String>,
    pub evidence: Option<String>,
    pub closed_by: Option<String>,
}

impl Default for CommitmentFold {
    fn default() -> Self {
        Self {
            state: CommitmentState::Open,
            owner: None,
            evidence: None,
            closed_by: None,
        }
    }
}

impl CommitmentFold {
    /// The state entered on `commit`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one operation that targets this commitment.
    ///
    /// The caller is responsible for only passing operations whose
    /// `commitment_ref()` names this commitment.
    pub fn apply(&mut self, op: &Operation) {
        match &op.body {
            OperationBody::Claim(_) => {
                self.state = CommitmentState::Claimed;
                self.owner = Some(op.actor.clone());
            }
            OperationBody::Release(_) => {
                self.state = CommitmentState::Open;
                self.owner = None;
            }
            OperationBody::Submit(_) => {
                self.state = CommitmentState::InReview;
            }
            OperationBody::Approve(p) => match &p.evidence {
                Some(evidence) => {
                    self.state = CommitmentState::Closed;
                    self.owner = None;
                    self.evidence = Some(evidence.as_str().to_string());
                    self.closed_by = Some(op.actor.clone());
                }
                None => {
                    tracing::debug!(
                        op_id = %op.id,
                        commitment = %p.commitment,
                        "approve without evidence does not close"
                    );
                }
            },
            OperationBody::Close(p) => {
                self.state = CommitmentState::Closed;
                self.owner = None;
                self.evidence = Some(p.evidence.as_str().to_string());
                self.closed_by = Some(op.actor.clone());
            }
            OperationBody::Reopen(_) => {
                self.state = CommitmentState::Reopened;
            }
            OperationBody::Capture(_) | OperationBody::Commit(_) | OperationBody::Annotate(_) => {}
        }
    }

    /// True when `op` is the operation that put this fold into `closed`.
    pub fn is_closing(op: &Operation) -> bool {
        match &op.body {
            OperationBody::Close(_) => true,
            OperationBody::Approve(p) => p.evidence.is_some(),
            _ => false,
        }
    }
}

/// Fold every operation referencing `commitment_id`, in log order.
pub fn derive_commitment_state(ops: &[Operation], commitment_id: &str) -> CommitmentFold {
    let mut fold = CommitmentFold::new();
    for op in ops {
        if op.commitment_ref() == Some(commitment_id) {
            fold.apply(op);
        }
    }
    fold
}

// ---------------------------------------------------------------------------
// Transition policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The operation is not offered in the commitment's current state.
    IllegalState,
    /// Only the owner may perform this operation.
    NotOwner,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::IllegalState => f.write_str("not allowed in this state"),
            RejectReason::NotOwner => f.write_str("actor is not the owner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} rejected for {commitment} in state {state}: {reason}")]
pub struct TransitionRejected {
    pub commitment: String,
    pub kind: OperationKind,
    pub state: CommitmentState,
    pub reason: RejectReason,
}

/// Decide whether `actor` may apply `kind` to `commitment` right now.
///
///   claim                  open | reopened
///   release, submit, close claimed | reopened, actor is owner
///   approve                in_review
///   reopen                 in_review | closed
///   annotate               any state
pub fn check_transition(
    commitment: &Commitment,
    kind: OperationKind,
    actor: &str,
) -> Result<(), TransitionRejected> {
    let state = commitment.state;
    let reject = |reason| {
        Err(TransitionRejected {
            commitment: commitment.id.clone(),
            kind,
            state,
            reason,
        })
    };

    let state_ok = match kind {
        OperationKind::Claim => {
            matches!(state, CommitmentState::Open | CommitmentState::Reopened)
        }
        OperationKind::Release | OperationKind::Submit | OperationKind::Close => {
            matches!(state, CommitmentState::Claimed | CommitmentState::Reopened)
        }
        OperationKind::Approve => state == CommitmentState::InReview,
        OperationKind::Reopen => {
            matches!(state, CommitmentState::InReview | CommitmentState::Closed)
        }
        OperationKind::Annotate => true,
        OperationKind::Capture | OperationKind::Commit => false,
    };
    if !state_ok {
        return reject(RejectReason::IllegalState);
    }

    let owner_only = matches!(
        kind,
        OperationKind::Release | OperationKind::Submit | OperationKind::Close
    );
    if owner_only && commitment.owner.as_deref() != Some(actor) {
        return reject(RejectReason::NotOwner);
    }

    Ok(())
}

/// Operations `actor` may apply to `commitment`, in canonical kind order.
pub fn allowed_operations(commitment: &Commitment, actor: &str) -> Vec<OperationKind> {
    OperationKind::ALL
        .iter()
        .copied()
        .filter(|kind| check_transition(commitment, *kind, actor).is_ok())
        .collect()
}
