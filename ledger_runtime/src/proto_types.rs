//! Hand-written protobuf types for the on-disk operation log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the file format; never renumber.
//! Free-form `meta` maps travel as JSON text.

use prost::Message;

// ── Operation Envelope ─────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoOperation {
    /// Per-workspace insertion sequence, starting at 1.
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(string, tag = "3")]
    pub workspace_id: String,
    /// RFC 3339, UTC.
    #[prost(string, tag = "4")]
    pub timestamp: String,
    #[prost(string, tag = "5")]
    pub actor: String,
    #[prost(oneof = "PayloadKind", tags = "6, 7, 8, 9, 10, 11, 12, 13, 14")]
    pub payload: Option<PayloadKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum PayloadKind {
    #[prost(message, tag = "6")]
    Capture(Capture),
    #[prost(message, tag = "7")]
    Commit(Commit),
    #[prost(message, tag = "8")]
    Claim(Claim),
    #[prost(message, tag = "9")]
    Release(Release),
    #[prost(message, tag = "10")]
    Submit(Submit),
    #[prost(message, tag = "11")]
    Approve(Approve),
    #[prost(message, tag = "12")]
    Close(Close),
    #[prost(message, tag = "13")]
    Reopen(Reopen),
    #[prost(message, tag = "14")]
    Annotate(Annotate),
}

// ── Payloads ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct Capture {
    #[prost(string, tag = "1")]
    pub body: String,
    #[prost(string, optional, tag = "2")]
    pub kind: Option<String>,
    #[prost(string, repeated, tag = "3")]
    pub refs: Vec<String>,
    #[prost(string, optional, tag = "4")]
    pub meta_json: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Commit {
    #[prost(string, tag = "1")]
    pub body: String,
    #[prost(string, tag = "2")]
    pub source: String,
    #[prost(string, repeated, tag = "3")]
    pub tags: Vec<String>,
    #[prost(string, optional, tag = "4")]
    pub meta_json: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Claim {
    #[prost(string, tag = "1")]
    pub commitment: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Release {
    #[prost(string, tag = "1")]
    pub commitment: String,
    #[prost(string, optional, tag = "2")]
    pub reason: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Submit {
    #[prost(string, tag = "1")]
    pub commitment: String,
    #[prost(string, repeated, tag = "2")]
    pub evidence: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub summary: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Approve {
    #[prost(string, tag = "1")]
    pub commitment: String,
    #[prost(string, optional, tag = "2")]
    pub evidence: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub comment: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Close {
    #[prost(string, tag = "1")]
    pub commitment: String,
    #[prost(string, tag = "2")]
    pub evidence: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Reopen {
    #[prost(string, tag = "1")]
    pub commitment: String,
    #[prost(string, tag = "2")]
    pub reason: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Annotate {
    #[prost(string, tag = "1")]
    pub target: String,
    #[prost(string, tag = "2")]
    pub body: String,
    #[prost(string, optional, tag = "3")]
    pub kind: Option<String>,
    #[prost(string, repeated, tag = "4")]
    pub refs: Vec<String>,
    #[prost(string, optional, tag = "5")]
    pub meta_json: Option<String>,
}
