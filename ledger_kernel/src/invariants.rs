//! Ledger Kernel: Invariant Checks
//!
//! Checks run against a projected view. A violation means either the log
//! was written by something that bypassed the writer, or the projector is
//! broken; neither is recoverable by retrying.

use thiserror::Error;

use crate::domain::CommitmentState;
use crate::projector::LedgerView;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("[INVARIANT:closed_requires_evidence] commitment {0} is closed without evidence")]
    ClosedWithoutEvidence(String),
    #[error("[INVARIANT:closed_requires_closer] commitment {0} is closed without closed_by")]
    ClosedWithoutCloser(String),
    #[error("[INVARIANT:commitment_source] commitment {0} does not reference a source memory")]
    MissingSource(String),
    #[error("[INVARIANT:owner_state] commitment {commitment} has owner {owner:?} in state {state}")]
    OwnerInUnownedState {
        commitment: String,
        owner: String,
        state: CommitmentState,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run every check. Returns the first failure.
pub fn validate_invariants(view: &LedgerView) -> Result<(), InvariantViolation> {
    check_closed_requires_evidence(view)?;
    check_commitment_source(view)?;
    check_owner_state(view)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Individual checks (private)
// ---------------------------------------------------------------------------

/// Closed implies a non-empty evidence reference and a closer.
fn check_closed_requires_evidence(view: &LedgerView) -> Result<(), InvariantViolation> {
    for c in view.commitments.iter().filter(|c| c.state == CommitmentState::Closed) {
        match c.evidence.as_deref() {
            Some(e) if !e.trim().is_empty() => {}
            _ => return Err(InvariantViolation::ClosedWithoutEvidence(c.id.clone())),
        }
        if c.closed_by.is_none() {
            return Err(InvariantViolation::ClosedWithoutCloser(c.id.clone()));
        }
    }
    Ok(())
}

fn check_commitment_source(view: &LedgerView) -> Result<(), InvariantViolation> {
    match view.commitments.iter().find(|c| c.source.trim().is_empty()) {
        Some(c) => Err(InvariantViolation::MissingSource(c.id.clone())),
        None => Ok(()),
    }
}

/// An owner only exists while someone is working on the commitment.
fn check_owner_state(view: &LedgerView) -> Result<(), InvariantViolation> {
    for c in &view.commitments {
        if let Some(owner) = &c.owner {
            if !c.state.is_owned() {
                return Err(InvariantViolation::OwnerInUnownedState {
                    commitment: c.id.clone(),
                    owner: owner.clone(),
                    state: c.state,
                });
            }
        }
    }
    Ok(())
}
