//! Ledger Kernel: Derived Entities
//!
//! Pure data. Nothing here is ever stored: every value is recomputed
//! from the operation log on read.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operations::Meta;

// ── Commitment state ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentState {
    Open,
    Claimed,
    InReview,
    Closed,
    Reopened,
    /// Part of the read-model vocabulary; no operation produces it.
    Cancelled,
}

impl CommitmentState {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitmentState::Open => "open",
            CommitmentState::Claimed => "claimed",
            CommitmentState::InReview => "in_review",
            CommitmentState::Closed => "closed",
            CommitmentState::Reopened => "reopened",
            CommitmentState::Cancelled => "cancelled",
        }
    }

    /// States in which a commitment has an owner working on it.
    pub fn is_owned(self) -> bool {
        matches!(
            self,
            CommitmentState::Claimed | CommitmentState::InReview | CommitmentState::Reopened
        )
    }
}

impl fmt::Display for CommitmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Records ────────────────────────────────────────────────────────

/// A note attached to a memory or commitment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Id of the annotate operation.
    pub id: String,
    pub body: String,
    pub kind: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// A captured observation, derived from one `capture` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub body: String,
    pub kind: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub refs: Vec<String>,
    pub meta: Option<Meta>,
    pub annotations: Vec<Annotation>,
}

/// An obligation, derived from one `commit` operation plus every
/// lifecycle operation that references it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub id: String,
    pub body: String,
    /// Memory id this commitment traces back to.
    pub source: String,
    pub state: CommitmentState,
    pub owner: Option<String>,
    /// Memory id cited by the operation that closed it.
    pub evidence: Option<String>,
    pub closed_by: Option<String>,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    pub meta: Option<Meta>,
    pub annotations: Vec<Annotation>,
}
