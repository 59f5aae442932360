//! Replay orchestrator: rebuild the derived view from an operation log.
//!
//! Delegates all domain logic to the kernel. No shortcuts, no cached
//! state: every call folds the whole log.

use ledger_kernel::hashing::projection_hash;
use ledger_kernel::operations::Operation;
use ledger_kernel::projector::LedgerView;

use crate::store::read_ordered;

/// Rebuild the view from operations already in replay order.
///
/// Returns `(view, projection_hash)`. Pure function on the log.
pub fn rebuild_view(ops: &[Operation]) -> (LedgerView, String) {
    let view = LedgerView::project(ops);
    let hash = projection_hash(&view);
    (view, hash)
}

/// Order raw insertion-order operations for replay, then rebuild.
pub fn rebuild_from_log(ops: Vec<Operation>) -> (LedgerView, String) {
    rebuild_view(&read_ordered(ops))
}

/// Rebuild and return only the projection hash.
pub fn rebuild_hash(ops: &[Operation]) -> String {
    rebuild_view(ops).1
}
