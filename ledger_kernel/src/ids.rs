//! Ledger Kernel: Identifiers
//!
//! Record ids are `<prefix>_<suffix>` where the prefix names the record
//! family and the suffix is 8 characters drawn from `[a-z0-9]`.
//! Workspace ids double as directory names and must match `[A-Za-z0-9_-]+`.

use std::fmt;

use rand::Rng;

use crate::error::ValidationError;
use crate::operations::OperationKind;

/// Length of the random suffix of a generated id.
pub const ID_SUFFIX_LEN: usize = 8;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Record family encoded in an id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdPrefix {
    Memory,
    Commitment,
    Operation,
}

impl IdPrefix {
    /// `capture` mints memories, `commit` mints commitments, everything
    /// else is a plain operation.
    pub fn for_kind(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Capture => IdPrefix::Memory,
            OperationKind::Commit => IdPrefix::Commitment,
            _ => IdPrefix::Operation,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdPrefix::Memory => "mem",
            IdPrefix::Commitment => "cmt",
            IdPrefix::Operation => "op",
        }
    }

    /// Recover the family from an existing id, if it carries a known prefix.
    pub fn of(id: &str) -> Option<Self> {
        let (prefix, rest) = id.split_once('_')?;
        if rest.is_empty() {
            return None;
        }
        match prefix {
            "mem" => Some(IdPrefix::Memory),
            "cmt" => Some(IdPrefix::Commitment),
            "op" => Some(IdPrefix::Operation),
            _ => None,
        }
    }
}

impl fmt::Display for IdPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generate a fresh id for the given family.
pub fn generate_id(prefix: IdPrefix) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}_{}", prefix.as_str(), suffix)
}

/// Validate that a workspace id matches `[A-Za-z0-9_-]+`.
pub fn validate_workspace_id(workspace_id: &str) -> Result<(), ValidationError> {
    let valid = !workspace_id.is_empty()
        && workspace_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidWorkspaceId(workspace_id.to_string()))
    }
}
