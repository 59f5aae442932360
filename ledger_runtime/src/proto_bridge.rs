//! Proto ↔ kernel conversion bridge.
//!
//! Converts between the protobuf frames stored on disk (proto_types.rs)
//! and the kernel's typed `Operation`. Decoding re-applies the kernel's
//! evidence rule: a stored close with blank evidence is a decode error,
//! never a closed commitment.

use chrono::{DateTime, SecondsFormat, Utc};

use ledger_kernel::operations::{
    AnnotatePayload, ApprovePayload, CapturePayload, ClaimPayload, ClosePayload, CommitPayload,
    Evidence, Meta, Operation, OperationBody, ReleasePayload, ReopenPayload, SubmitPayload,
};

use crate::error::StoreError;
use crate::proto_types::*;

/// Convert a kernel operation to its protobuf frame, stamped with `sequence`.
pub fn operation_to_proto(op: &Operation, sequence: u64) -> ProtoOperation {
    let payload = match &op.body {
        OperationBody::Capture(p) => PayloadKind::Capture(Capture {
            body: p.body.clone(),
            kind: p.kind.clone(),
            refs: p.refs.clone(),
            meta_json: encode_meta(&p.meta),
        }),
        OperationBody::Commit(p) => PayloadKind::Commit(Commit {
            body: p.body.clone(),
            source: p.source.clone(),
            tags: p.tags.clone(),
            meta_json: encode_meta(&p.meta),
        }),
        OperationBody::Claim(p) => PayloadKind::Claim(Claim {
            commitment: p.commitment.clone(),
        }),
        OperationBody::Release(p) => PayloadKind::Release(Release {
            commitment: p.commitment.clone(),
            reason: p.reason.clone(),
        }),
        OperationBody::Submit(p) => PayloadKind::Submit(Submit {
            commitment: p.commitment.clone(),
            evidence: p.evidence.clone(),
            summary: p.summary.clone(),
        }),
        OperationBody::Approve(p) => PayloadKind::Approve(Approve {
            commitment: p.commitment.clone(),
            evidence: p.evidence.as_ref().map(|e| e.as_str().to_string()),
            comment: p.comment.clone(),
        }),
        OperationBody::Close(p) => PayloadKind::Close(Close {
            commitment: p.commitment.clone(),
            evidence: p.evidence.as_str().to_string(),
        }),
        OperationBody::Reopen(p) => PayloadKind::Reopen(Reopen {
            commitment: p.commitment.clone(),
            reason: p.reason.clone(),
        }),
        OperationBody::Annotate(p) => PayloadKind::Annotate(Annotate {
            target: p.target.clone(),
            body: p.body.clone(),
            kind: p.kind.clone(),
            refs: p.refs.clone(),
            meta_json: encode_meta(&p.meta),
        }),
    };

    ProtoOperation {
        sequence,
        id: op.id.clone(),
        workspace_id: op.workspace_id.clone(),
        timestamp: op.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        actor: op.actor.clone(),
        payload: Some(payload),
    }
}

/// Convert a stored frame back into `(sequence, Operation)`.
pub fn proto_to_operation(proto: &ProtoOperation) -> Result<(u64, Operation), StoreError> {
    let payload = proto
        .payload
        .as_ref()
        .ok_or_else(|| StoreError::Decode(format!("operation {} has no payload", proto.id)))?;

    let body = match payload {
        PayloadKind::Capture(p) => OperationBody::Capture(CapturePayload {
            body: p.body.clone(),
            kind: p.kind.clone(),
            refs: p.refs.clone(),
            meta: decode_meta(&proto.id, &p.meta_json)?,
        }),
        PayloadKind::Commit(p) => OperationBody::Commit(CommitPayload {
            body: p.body.clone(),
            source: p.source.clone(),
            tags: p.tags.clone(),
            meta: decode_meta(&proto.id, &p.meta_json)?,
        }),
        PayloadKind::Claim(p) => OperationBody::Claim(ClaimPayload {
            commitment: p.commitment.clone(),
        }),
        PayloadKind::Release(p) => OperationBody::Release(ReleasePayload {
            commitment: p.commitment.clone(),
            reason: p.reason.clone(),
        }),
        PayloadKind::Submit(p) => OperationBody::Submit(SubmitPayload {
            commitment: p.commitment.clone(),
            evidence: p.evidence.clone(),
            summary: p.summary.clone(),
        }),
        PayloadKind::Approve(p) => OperationBody::Approve(ApprovePayload {
            commitment: p.commitment.clone(),
            evidence: p
                .evidence
                .as_ref()
                .map(|e| evidence(&proto.id, e))
                .transpose()?,
            comment: p.comment.clone(),
        }),
        PayloadKind::Close(p) => OperationBody::Close(ClosePayload {
            commitment: p.commitment.clone(),
            evidence: evidence(&proto.id, &p.evidence)?,
        }),
        PayloadKind::Reopen(p) => OperationBody::Reopen(ReopenPayload {
            commitment: p.commitment.clone(),
            reason: p.reason.clone(),
        }),
        PayloadKind::Annotate(p) => OperationBody::Annotate(AnnotatePayload {
            target: p.target.clone(),
            body: p.body.clone(),
            kind: p.kind.clone(),
            refs: p.refs.clone(),
            meta: decode_meta(&proto.id, &p.meta_json)?,
        }),
    };

    let timestamp = DateTime::parse_from_rfc3339(&proto.timestamp)
        .map_err(|e| {
            StoreError::Decode(format!(
                "operation {} has bad timestamp {:?}: {}",
                proto.id, proto.timestamp, e
            ))
        })?
        .with_timezone(&Utc);

    let op = Operation::new(
        proto.id.clone(),
        proto.workspace_id.clone(),
        timestamp,
        proto.actor.clone(),
        body,
    );
    Ok((proto.sequence, op))
}

fn evidence(op_id: &str, raw: &str) -> Result<Evidence, StoreError> {
    Evidence::new(raw)
        .map_err(|e| StoreError::Decode(format!("operation {op_id}: {e}")))
}

fn encode_meta(meta: &Option<Meta>) -> Option<String> {
    meta.as_ref()
        .map(|m| serde_json::Value::Object(m.clone()).to_string())
}

fn decode_meta(op_id: &str, raw: &Option<String>) -> Result<Option<Meta>, StoreError> {
    let Some(text) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(StoreError::Decode(format!(
            "operation {op_id}: meta must be an object, got {other}"
        ))),
        Err(e) => Err(StoreError::Decode(format!("operation {op_id}: bad meta: {e}"))),
    }
}
