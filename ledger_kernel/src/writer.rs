//! Ledger Kernel: Operation Writer
//!
//! Builds new operations: validates payload shape, mints a prefixed id
//! and stamps the caller's clock. Nothing here looks at derived state;
//! the only business rule enforced at this boundary is that closing
//! operations carry evidence.

use chrono::{DateTime, Utc};

use crate::error::ValidationError;
use crate::ids::{generate_id, validate_workspace_id, IdPrefix};
use crate::operations::{Operation, OperationBody, OperationKind};

/// Check that every required field of `body` is present and non-blank.
pub fn validate_body(body: &OperationBody) -> Result<(), ValidationError> {
    let kind = body.kind();
    let require = |field: &'static str, value: &str| {
        if value.trim().is_empty() {
            Err(ValidationError::MissingField { kind, field })
        } else {
            Ok(())
        }
    };

    match body {
        OperationBody::Capture(p) => require("body", &p.body),
        OperationBody::Commit(p) => {
            require("body", &p.body)?;
            require("source", &p.source)
        }
        OperationBody::Claim(p) => require("commitment", &p.commitment),
        OperationBody::Release(p) => require("commitment", &p.commitment),
        OperationBody::Submit(p) => require("commitment", &p.commitment),
        OperationBody::Approve(p) => {
            require("commitment", &p.commitment)?;
            if p.evidence.is_none() {
                return Err(ValidationError::MissingEvidence { kind });
            }
            Ok(())
        }
        // `Evidence` cannot be empty, so only the target needs checking.
        OperationBody::Close(p) => require("commitment", &p.commitment),
        OperationBody::Reopen(p) => {
            require("commitment", &p.commitment)?;
            require("reason", &p.reason)
        }
        OperationBody::Annotate(p) => {
            require("target", &p.target)?;
            require("body", &p.body)
        }
    }
}

/// Validate and stamp a new operation ready for the log.
pub fn new_operation(
    workspace_id: &str,
    actor: &str,
    body: OperationBody,
    now: DateTime<Utc>,
) -> Result<Operation, ValidationError> {
    validate_envelope(workspace_id, actor)?;
    validate_body(&body)?;

    let id = generate_id(IdPrefix::for_kind(body.kind()));
    Ok(Operation::new(id, workspace_id, now, actor, body))
}

/// Re-check an operation built elsewhere, e.g. one being re-submitted
/// after a failed append.
pub fn validate_operation(op: &Operation) -> Result<(), ValidationError> {
    if op.id.trim().is_empty() {
        return Err(ValidationError::MissingField {
            kind: op.kind(),
            field: "id",
        });
    }
    validate_envelope(&op.workspace_id, &op.actor)?;
    validate_body(&op.body)
}

fn validate_envelope(workspace_id: &str, actor: &str) -> Result<(), ValidationError> {
    validate_workspace_id(workspace_id)?;
    if actor.trim().is_empty() {
        return Err(ValidationError::EmptyActor);
    }
    Ok(())
}

/// The kinds whose evidence must name a captured memory.
pub fn evidence_of(body: &OperationBody) -> Option<&str> {
    match body {
        OperationBody::Close(p) => Some(p.evidence.as_str()),
        OperationBody::Approve(p) => p.evidence.as_ref().map(|e| e.as_str()),
        _ => None,
    }
}

/// True for kinds that must reference an existing commitment.
pub fn targets_commitment(kind: OperationKind) -> bool {
    !matches!(
        kind,
        OperationKind::Capture | OperationKind::Commit | OperationKind::Annotate
    )
}
