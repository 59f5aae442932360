#![forbid(unsafe_code)]

//! Commitment ledger runtime.
//!
//! Wraps the kernel with a durable operation log, the write and read
//! surfaces, change notification, replay and drift detection.
//!
//! No domain logic lives here. State transitions, projection and
//! invariants are delegated to the kernel.

pub mod config;
pub mod drift;
pub mod error;
pub mod file_store;
pub mod ledger;
pub mod proto_bridge;
pub mod proto_types;
pub mod replay;
pub mod store;
pub mod telemetry;

pub use config::LedgerConfig;
pub use error::{LedgerError, StoreError};
pub use file_store::FileStore;
pub use ledger::Ledger;
pub use store::{MemoryStore, OperationStore};
