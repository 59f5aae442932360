#![forbid(unsafe_code)]

//! Commitment ledger kernel.
//!
//! Actors append immutable operations; every derived view (memories,
//! commitments, statistics, timelines) is recomputed by replaying them.
//! No I/O lives here.

/// Version of the canonical projection encoding. Changing what a replay
/// produces for an existing log requires bumping it.
pub const LEDGER_SCHEMA_VERSION: u32 = 1;

pub mod aggregation;
pub mod domain;
pub mod error;
pub mod hashing;
pub mod ids;
pub mod invariants;
pub mod operations;
pub mod projector;
pub mod transitions;
pub mod writer;

pub use domain::{Annotation, Commitment, CommitmentState, Memory};
pub use error::ValidationError;
pub use operations::{Evidence, Operation, OperationBody, OperationKind};
pub use projector::LedgerView;
