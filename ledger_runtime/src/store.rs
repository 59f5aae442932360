//! Operation store boundary.
//!
//! A store keeps one append-only log per workspace and hands out a
//! per-workspace insertion sequence. Nothing here looks at derived
//! state: any well-formed operation is accepted.

use std::collections::HashMap;

use ledger_kernel::ids::validate_workspace_id;
use ledger_kernel::operations::Operation;

use crate::error::StoreError;

/// Backing store for the operation log.
pub trait OperationStore {
    /// Append `op` to its workspace log and return its insertion sequence.
    ///
    /// Re-appending an operation that is already stored with identical
    /// content returns the original sequence and writes nothing. The same
    /// id with different content is `StoreError::IdConflict`.
    fn append(&mut self, op: &Operation) -> Result<u64, StoreError>;

    /// Every operation of `workspace_id` in insertion order.
    fn load(&self, workspace_id: &str) -> Result<Vec<Operation>, StoreError>;

    /// True when an operation with `id` is already in `workspace_id`'s log.
    fn contains(&self, workspace_id: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self.load(workspace_id)?.iter().any(|op| op.id == id))
    }
}

/// Order a workspace log for replay: by timestamp, ties kept in insertion order.
pub fn read_ordered(mut ops: Vec<Operation>) -> Vec<Operation> {
    // sort_by_key is stable
    ops.sort_by_key(|op| op.timestamp);
    ops
}

// ── In-memory store ────────────────────────────────────────────

#[derive(Debug, Default)]
struct WorkspaceLog {
    ops: Vec<Operation>,
    by_id: HashMap<String, usize>,
}

/// Volatile store used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    workspaces: HashMap<String, WorkspaceLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations stored for `workspace_id`.
    pub fn len(&self, workspace_id: &str) -> usize {
        self.workspaces.get(workspace_id).map_or(0, |w| w.ops.len())
    }

    pub fn is_empty(&self, workspace_id: &str) -> bool {
        self.len(workspace_id) == 0
    }
}

impl OperationStore for MemoryStore {
    fn append(&mut self, op: &Operation) -> Result<u64, StoreError> {
        validate_workspace_id(&op.workspace_id)?;
        let log = self.workspaces.entry(op.workspace_id.clone()).or_default();

        if let Some(&idx) = log.by_id.get(&op.id) {
            if log.ops[idx] == *op {
                return Ok(idx as u64 + 1);
            }
            return Err(StoreError::IdConflict { id: op.id.clone() });
        }

        log.by_id.insert(op.id.clone(), log.ops.len());
        log.ops.push(op.clone());
        Ok(log.ops.len() as u64)
    }

    fn load(&self, workspace_id: &str) -> Result<Vec<Operation>, StoreError> {
        validate_workspace_id(workspace_id)?;
        Ok(self
            .workspaces
            .get(workspace_id)
            .map(|w| w.ops.clone())
            .unwrap_or_default())
    }

    fn contains(&self, workspace_id: &str, id: &str) -> Result<bool, StoreError> {
        validate_workspace_id(workspace_id)?;
        Ok(self
            .workspaces
            .get(workspace_id)
            .is_some_and(|w| w.by_id.contains_key(id)))
    }
}
