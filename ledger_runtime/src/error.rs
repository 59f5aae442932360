//! Runtime error taxonomy.
//!
//! `ValidationError` rejects a write before it reaches the log,
//! `StoreError` means the backing store failed. Only store I/O failures
//! are worth retrying, and only by re-submitting the same operation
//! through `Ledger::append`: its id was minted before the first attempt,
//! so the store recognises it if that attempt already landed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use ledger_kernel::domain::CommitmentState;
use ledger_kernel::error::ValidationError;
use ledger_kernel::transitions::TransitionRejected;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("operation store I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt operation log {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("cannot decode stored operation: {0}")]
    Decode(String),
    #[error("operation {id} already exists with different content")]
    IdConflict { id: String },
    #[error(transparent)]
    InvalidWorkspace(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to record operation: {0}")]
    Store(#[from] StoreError),
    #[error("unknown {kind} {id} in workspace {workspace}")]
    UnknownRecord {
        workspace: String,
        kind: &'static str,
        id: String,
    },
    #[error("commitment {commitment} is {actual}, expected {expected}")]
    StateConflict {
        commitment: String,
        expected: CommitmentState,
        actual: CommitmentState,
    },
    #[error(transparent)]
    TransitionRejected(#[from] TransitionRejected),
    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    /// True only when the backing store could not complete the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(StoreError::Io(_)))
    }
}
