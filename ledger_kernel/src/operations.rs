//! Ledger Kernel: Operation Definitions
//!
//! Operations are pure data. They carry intent and payload only and
//! contain zero transition logic. Once appended they are never mutated
//! or deleted.
//!
//! Wire shape:
//!   {"id", "workspace_id", "type", "timestamp", "actor", "payload"}
//! where `payload` is determined by `type`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EmptyEvidence;

/// Free-form metadata carried by captures, commits and annotations.
pub type Meta = Map<String, Value>;

// ── Operation kinds ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Capture,
    Commit,
    Claim,
    Release,
    Submit,
    Approve,
    Close,
    Reopen,
    Annotate,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::Capture,
        OperationKind::Commit,
        OperationKind::Claim,
        OperationKind::Release,
        OperationKind::Submit,
        OperationKind::Approve,
        OperationKind::Close,
        OperationKind::Reopen,
        OperationKind::Annotate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Capture => "capture",
            OperationKind::Commit => "commit",
            OperationKind::Claim => "claim",
            OperationKind::Release => "release",
            OperationKind::Submit => "submit",
            OperationKind::Approve => "approve",
            OperationKind::Close => "close",
            OperationKind::Reopen => "reopen",
            OperationKind::Annotate => "annotate",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown operation type: {s}"))
    }
}

// ── Evidence ───────────────────────────────────────────────────────

/// A non-empty reference to the memory that proves a commitment is done.
///
/// Construction and deserialisation both reject empty or whitespace-only
/// values, so a payload holding an `Evidence` always holds a real reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Evidence(String);

impl Evidence {
    pub fn new(memory_id: impl Into<String>) -> Result<Self, EmptyEvidence> {
        Self::try_from(memory_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Evidence {
    type Error = EmptyEvidence;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err(EmptyEvidence)
        } else {
            Ok(Evidence(value))
        }
    }
}

impl From<Evidence> for String {
    fn from(value: Evidence) -> Self {
        value.0
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Payloads ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapturePayload {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommitPayload {
    pub body: String,
    /// Memory id this commitment traces back to.
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayload {
    pub commitment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub commitment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitPayload {
    pub commitment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePayload {
    pub commitment: String,
    /// Absent only in logs written by foreign writers; such an approve
    /// never closes the commitment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePayload {
    pub commitment: String,
    pub evidence: Evidence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenPayload {
    pub commitment: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnnotatePayload {
    /// Id of any memory or commitment.
    pub target: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

impl CapturePayload {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_refs(mut self, refs: Vec<String>) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl CommitPayload {
    pub fn new(body: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl SubmitPayload {
    pub fn new(commitment: impl Into<String>) -> Self {
        Self {
            commitment: commitment.into(),
            evidence: Vec::new(),
            summary: None,
        }
    }

    /// Memory ids offered for review. Not binding: only approve and close
    /// carry the evidence that closes a commitment.
    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

impl AnnotatePayload {
    pub fn new(target: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_refs(mut self, refs: Vec<String>) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Payload tagged by operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum OperationBody {
    Capture(CapturePayload),
    Commit(CommitPayload),
    Claim(ClaimPayload),
    Release(ReleasePayload),
    Submit(SubmitPayload),
    Approve(ApprovePayload),
    Close(ClosePayload),
    Reopen(ReopenPayload),
    Annotate(AnnotatePayload),
}

impl OperationBody {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationBody::Capture(_) => OperationKind::Capture,
            OperationBody::Commit(_) => OperationKind::Commit,
            OperationBody::Claim(_) => OperationKind::Claim,
            OperationBody::Release(_) => OperationKind::Release,
            OperationBody::Submit(_) => OperationKind::Submit,
            OperationBody::Approve(_) => OperationKind::Approve,
            OperationBody::Close(_) => OperationKind::Close,
            OperationBody::Reopen(_) => OperationKind::Reopen,
            OperationBody::Annotate(_) => OperationKind::Annotate,
        }
    }

    /// The commitment a lifecycle operation acts on.
    pub fn commitment_ref(&self) -> Option<&str> {
        match self {
            OperationBody::Claim(p) => Some(&p.commitment),
            OperationBody::Release(p) => Some(&p.commitment),
            OperationBody::Submit(p) => Some(&p.commitment),
            OperationBody::Approve(p) => Some(&p.commitment),
            OperationBody::Close(p) => Some(&p.commitment),
            OperationBody::Reopen(p) => Some(&p.commitment),
            OperationBody::Capture(_) | OperationBody::Commit(_) | OperationBody::Annotate(_) => {
                None
            }
        }
    }

    pub fn capture(body: impl Into<String>) -> Self {
        OperationBody::Capture(CapturePayload::new(body))
    }

    pub fn commit(body: impl Into<String>, source: impl Into<String>) -> Self {
        OperationBody::Commit(CommitPayload::new(body, source))
    }

    pub fn claim(commitment: impl Into<String>) -> Self {
        OperationBody::Claim(ClaimPayload {
            commitment: commitment.into(),
        })
    }

    pub fn release(commitment: impl Into<String>, reason: Option<String>) -> Self {
        OperationBody::Release(ReleasePayload {
            commitment: commitment.into(),
            reason,
        })
    }

    pub fn submit(commitment: impl Into<String>) -> Self {
        OperationBody::Submit(SubmitPayload::new(commitment))
    }

    pub fn approve(commitment: impl Into<String>, evidence: Option<Evidence>) -> Self {
        OperationBody::Approve(ApprovePayload {
            commitment: commitment.into(),
            evidence,
            comment: None,
        })
    }

    pub fn close(commitment: impl Into<String>, evidence: Evidence) -> Self {
        OperationBody::Close(ClosePayload {
            commitment: commitment.into(),
            evidence,
        })
    }

    pub fn reopen(commitment: impl Into<String>, reason: impl Into<String>) -> Self {
        OperationBody::Reopen(ReopenPayload {
            commitment: commitment.into(),
            reason: reason.into(),
        })
    }

    pub fn annotate(target: impl Into<String>, body: impl Into<String>) -> Self {
        OperationBody::Annotate(AnnotatePayload::new(target, body))
    }
}

// ── Operation envelope ─────────────────────────────────────────────

/// One immutable, timestamped, actor-attributed ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub workspace_id: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(flatten)]
    pub body: OperationBody,
}

impl Operation {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        actor: impl Into<String>,
        body: OperationBody,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            timestamp,
            actor: actor.into(),
            body,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.body.kind()
    }

    pub fn commitment_ref(&self) -> Option<&str> {
        self.body.commitment_ref()
    }

    /// The record an `annotate` operation is attached to.
    pub fn annotation_target(&self) -> Option<&str> {
        match &self.body {
            OperationBody::Annotate(p) => Some(&p.target),
            _ => None,
        }
    }

    /// True when this operation belongs to the history of `record_id`:
    /// the record's own creation, a lifecycle op on it, or a note on it.
    pub fn references(&self, record_id: &str) -> bool {
        match &self.body {
            OperationBody::Capture(_) | OperationBody::Commit(_) => self.id == record_id,
            OperationBody::Annotate(p) => p.target == record_id,
            _ => self.commitment_ref() == Some(record_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
    }

    #[test]
    fn wire_shape_has_type_and_payload() {
        let op = Operation::new(
            "op_1",
            "ws",
            ts(),
            "alice",
            OperationBody::close("cmt_1", Evidence::new("mem_1").unwrap()),
        );
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["type"], "close");
        assert_eq!(v["payload"], json!({"commitment": "cmt_1", "evidence": "mem_1"}));
        assert_eq!(v["workspace_id"], "ws");
        assert_eq!(v["actor"], "alice");
    }

    #[test]
    fn parses_operation_from_wire_json() {
        let v = json!({
            "id": "mem_abc",
            "workspace_id": "ws",
            "type": "capture",
            "timestamp": "2026-01-05T10:00:00Z",
            "actor": "bob",
            "payload": {"body": "login fails on safari", "kind": "bug", "refs": ["gh#12"]}
        });
        let op: Operation = serde_json::from_value(v).unwrap();
        assert_eq!(op.kind(), OperationKind::Capture);
        assert_eq!(op.timestamp, ts());
        match op.body {
            OperationBody::Capture(p) => {
                assert_eq!(p.kind.as_deref(), Some("bug"));
                assert_eq!(p.refs, vec!["gh#12".to_string()]);
                assert!(p.meta.is_none());
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn close_without_evidence_does_not_parse() {
        let missing = json!({
            "id": "op_1", "workspace_id": "ws", "type": "close",
            "timestamp": "2026-01-05T10:00:00Z", "actor": "a",
            "payload": {"commitment": "cmt_1"}
        });
        assert!(serde_json::from_value::<Operation>(missing).is_err());

        let empty = json!({
            "id": "op_1", "workspace_id": "ws", "type": "close",
            "timestamp": "2026-01-05T10:00:00Z", "actor": "a",
            "payload": {"commitment": "cmt_1", "evidence": "  "}
        });
        assert!(serde_json::from_value::<Operation>(empty).is_err());
    }

    #[test]
    fn approve_evidence_is_optional_on_the_wire() {
        let v = json!({
            "id": "op_2", "workspace_id": "ws", "type": "approve",
            "timestamp": "2026-01-05T10:00:00Z", "actor": "rev",
            "payload": {"commitment": "cmt_1", "comment": "lgtm"}
        });
        let op: Operation = serde_json::from_value(v).unwrap();
        assert_eq!(op.commitment_ref(), Some("cmt_1"));
        match op.body {
            OperationBody::Approve(p) => {
                assert!(p.evidence.is_none());
                assert_eq!(p.comment.as_deref(), Some("lgtm"));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn kind_names_round_trip_through_from_str() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.as_str().parse::<OperationKind>().unwrap(), kind);
        }
        assert!("publish".parse::<OperationKind>().is_err());
    }

    #[test]
    fn references_covers_creation_lifecycle_and_notes() {
        let commit = Operation::new("cmt_1", "ws", ts(), "a", OperationBody::commit("x", "mem_1"));
        let claim = Operation::new("op_1", "ws", ts(), "a", OperationBody::claim("cmt_1"));
        let note = Operation::new("op_2", "ws", ts(), "a", OperationBody::annotate("cmt_1", "hi"));
        let other = Operation::new("op_3", "ws", ts(), "a", OperationBody::claim("cmt_2"));
        assert!(commit.references("cmt_1"));
        assert!(claim.references("cmt_1"));
        assert!(note.references("cmt_1"));
        assert!(!other.references("cmt_1"));
        assert_eq!(note.annotation_target(), Some("cmt_1"));
    }
}
