//! Ledger Kernel: Error Types
//!
//! Only the write boundary can fail inside the kernel. Projection is a
//! pure fold over already-durable operations and has no error path.

use thiserror::Error;

use crate::operations::OperationKind;

/// An evidence reference that names nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("evidence must reference a memory id, got an empty value")]
pub struct EmptyEvidence;

/// A write rejected before it reaches the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{kind} operation is missing required field `{field}`")]
    MissingField {
        kind: OperationKind,
        field: &'static str,
    },
    #[error("{kind} operation requires non-empty evidence")]
    MissingEvidence { kind: OperationKind },
    #[error("actor identity must not be empty")]
    EmptyActor,
    #[error("invalid workspace id {0:?}: must match [A-Za-z0-9_-]+")]
    InvalidWorkspaceId(String),
}
