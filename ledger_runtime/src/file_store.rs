//! Append-only operation store: binary protobuf log per workspace.
//!
//! Storage format: length-prefixed protobuf frames.
//!   [4-byte LE length][protobuf bytes][4-byte LE length][protobuf bytes]...
//!
//! Layout: `<base_dir>/<workspace_id>/operations.log`
//!
//! Rules:
//!   - Strict append only, no mutation, deletion or reordering
//!   - fsync after every write unless disabled
//!   - Stored sequence strictly increasing from 1 (validated on read)
//!   - A failed append is cut back off the file before the error is returned

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use prost::Message;
use tracing::{debug, error, info, warn};

use ledger_kernel::ids::validate_workspace_id;
use ledger_kernel::operations::Operation;

use crate::error::StoreError;
use crate::proto_bridge::{operation_to_proto, proto_to_operation};
use crate::proto_types::ProtoOperation;
use crate::store::OperationStore;

/// File name of a workspace log inside its directory.
pub const LOG_FILE_NAME: &str = "operations.log";

/// Largest frame accepted on read or write.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ── Single workspace log ───────────────────────────────────────

/// One workspace's log file plus the id index needed for idempotent appends.
struct OperationLogFile {
    path: PathBuf,
    last_sequence: u64,
    by_id: HashMap<String, u64>,
}

impl OperationLogFile {
    /// Open or create the log at `path`, scanning it to rebuild the index.
    fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let frames = if path.exists() {
            read_frames(path)?
        } else {
            Vec::new()
        };
        let by_id = frames
            .iter()
            .map(|f| (f.id.clone(), f.sequence))
            .collect();
        let last_sequence = frames.last().map_or(0, |f| f.sequence);

        info!(path = %path.display(), operations = frames.len(), "opened operation log");
        Ok(Self {
            path: path.to_path_buf(),
            last_sequence,
            by_id,
        })
    }

    fn append(&mut self, op: &Operation, fsync: bool) -> Result<u64, StoreError> {
        if let Some(&seq) = self.by_id.get(&op.id) {
            let stored = self.find(seq)?;
            if stored.as_ref() == Some(op) {
                debug!(id = %op.id, sequence = seq, "duplicate append ignored");
                return Ok(seq);
            }
            return Err(StoreError::IdConflict { id: op.id.clone() });
        }

        let sequence = self.last_sequence + 1;
        let buf = operation_to_proto(op, sequence).encode_to_vec();
        if buf.len() > MAX_FRAME_LEN {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("operation {} encodes to {} bytes, over the frame limit", op.id, buf.len()),
            )));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let committed_len = file.metadata()?.len();
        if let Err(err) = write_frame(&mut file, &buf, fsync) {
            self.discard_tail(&file, committed_len);
            return Err(err.into());
        }

        self.last_sequence = sequence;
        self.by_id.insert(op.id.clone(), sequence);
        Ok(sequence)
    }

    /// Cut the file back to `len` bytes after a failed append, so the next
    /// frame does not land behind a torn or unacknowledged one.
    fn discard_tail(&self, file: &File, len: u64) {
        match file.set_len(len).and_then(|()| file.sync_all()) {
            Ok(()) => warn!(path = %self.path.display(), len, "discarded failed append"),
            Err(err) => error!(
                path = %self.path.display(),
                %err,
                "could not discard failed append, log will be rescanned"
            ),
        }
    }

    fn find(&self, sequence: u64) -> Result<Option<Operation>, StoreError> {
        for frame in read_frames(&self.path)? {
            if frame.sequence == sequence {
                return proto_to_operation(&frame).map(|(_, op)| Some(op));
            }
        }
        Ok(None)
    }
}

fn write_frame(file: &mut File, buf: &[u8], fsync: bool) -> io::Result<()> {
    let mut frame = Vec::with_capacity(4 + buf.len());
    frame.extend_from_slice(&(buf.len() as u32).to_le_bytes());
    frame.extend_from_slice(buf);
    file.write_all(&frame)?;
    if fsync {
        file.sync_all()?;
    }
    Ok(())
}

/// Read all frames from a log file, validating framing and sequence order.
fn read_frames(path: &Path) -> Result<Vec<ProtoOperation>, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = BufReader::new(File::open(path)?);
    let mut frames: Vec<ProtoOperation> = Vec::new();
    let mut len_buf = [0u8; 4];

    loop {
        match reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(corrupt(format!("invalid frame length {len}")));
        }

        let mut frame = vec![0u8; len];
        reader
            .read_exact(&mut frame)
            .map_err(|e| corrupt(format!("truncated frame after {} operations: {e}", frames.len())))?;

        let proto = ProtoOperation::decode(frame.as_slice())
            .map_err(|e| corrupt(format!("protobuf decode error: {e}")))?;

        let expected = frames.last().map_or(1, |f| f.sequence + 1);
        if proto.sequence != expected {
            return Err(corrupt(format!(
                "sequence violation: expected {expected}, got {}",
                proto.sequence
            )));
        }
        frames.push(proto);
    }

    Ok(frames)
}

// ── Store ──────────────────────────────────────────────────────

/// Durable store keeping one log file per workspace under `base_dir`.
pub struct FileStore {
    base_dir: PathBuf,
    fsync: bool,
    logs: HashMap<String, OperationLogFile>,
}

impl FileStore {
    pub fn open(base_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(base_dir)?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            fsync: true,
            logs: HashMap::new(),
        })
    }

    /// Skip the per-append fsync. Appends survive a process crash but not
    /// a power loss.
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// Path of the log file for `workspace_id`.
    pub fn log_path(&self, workspace_id: &str) -> PathBuf {
        self.base_dir.join(workspace_id).join(LOG_FILE_NAME)
    }

    fn log_mut(&mut self, workspace_id: &str) -> Result<&mut OperationLogFile, StoreError> {
        let path = self.log_path(workspace_id);
        match self.logs.entry(workspace_id.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(OperationLogFile::open(&path)?)),
        }
    }
}

impl OperationStore for FileStore {
    fn append(&mut self, op: &Operation) -> Result<u64, StoreError> {
        validate_workspace_id(&op.workspace_id)?;
        let fsync = self.fsync;
        let result = self.log_mut(&op.workspace_id)?.append(op, fsync);
        if let Err(StoreError::Io(_)) = &result {
            // The file may hold bytes the index never saw; rebuild it on next use.
            self.logs.remove(&op.workspace_id);
        }
        result
    }

    fn contains(&self, workspace_id: &str, id: &str) -> Result<bool, StoreError> {
        validate_workspace_id(workspace_id)?;
        match self.logs.get(workspace_id) {
            Some(log) => Ok(log.by_id.contains_key(id)),
            None => Ok(self.load(workspace_id)?.iter().any(|op| op.id == id)),
        }
    }

    fn load(&self, workspace_id: &str) -> Result<Vec<Operation>, StoreError> {
        validate_workspace_id(workspace_id)?;
        let path = self.log_path(workspace_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut ops = Vec::new();
        for frame in read_frames(&path)? {
            let (_, op) = proto_to_operation(&frame)?;
            if op.workspace_id != workspace_id {
                return Err(StoreError::Corrupt {
                    path,
                    reason: format!("operation {} belongs to workspace {}", op.id, op.workspace_id),
                });
            }
            ops.push(op);
        }
        Ok(ops)
    }
}
