//! Integration tests for ledger_runtime.
//!
//! All tests use temporary directories for isolation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, TimeZone, Utc};
use prost::Message;

use ledger_kernel::aggregation::EXTERNAL_REF_KIND;
use ledger_kernel::operations::{AnnotatePayload, Evidence, Operation, OperationBody};
use ledger_kernel::CommitmentState;
use ledger_runtime::drift::{compare_views, verify_determinism};
use ledger_runtime::file_store::LOG_FILE_NAME;
use ledger_runtime::proto_bridge::operation_to_proto;
use ledger_runtime::proto_types::{Approve, PayloadKind};
use ledger_runtime::replay;
use ledger_runtime::{FileStore, Ledger, LedgerConfig, LedgerError, OperationStore, StoreError};

/// Golden hash of the kernel's frozen fixture log.
const GOLDEN_HASH: &str = "4f945175153b26022d0d2b76a25fdd26572c2e2b8e42cb769e1cf36e961fa118";

fn golden_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("ledger_kernel")
        .join("tests")
        .join("golden")
}

fn load_golden_operations() -> Vec<Operation> {
    let json_str = fs::read_to_string(golden_dir().join("operations.json"))
        .expect("Failed to read golden operations.json");
    serde_json::from_str(&json_str).expect("Failed to parse golden operations.json")
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
}

fn open_ledger(dir: &Path) -> Ledger<FileStore> {
    let config = LedgerConfig {
        data_dir: dir.to_path_buf(),
        ..LedgerConfig::default()
    };
    Ledger::open(config)
        .expect("open ledger")
        .with_clock(Arc::new(fixed_now))
}

// ─────────────────────────────────────────────────────────────
// Golden log through the file store
// ─────────────────────────────────────────────────────────────

#[test]
fn golden_log_survives_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let ops = load_golden_operations();

    {
        let mut store = FileStore::open(dir.path()).expect("open store");
        for (i, op) in ops.iter().enumerate() {
            assert_eq!(store.append(op).expect("append"), i as u64 + 1);
        }
    }

    let store = FileStore::open(dir.path()).expect("reopen store");
    let loaded = store.load("golden").expect("load");
    assert_eq!(loaded, ops);

    let (_, hash) = replay::rebuild_from_log(loaded);
    assert_eq!(hash, GOLDEN_HASH);
    assert_eq!(verify_determinism(&ops).unwrap(), GOLDEN_HASH);
}

#[test]
fn log_lives_under_workspace_directory() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = open_ledger(dir.path());
    ledger.capture("team-a", "alice", "x").unwrap();
    ledger.capture("team_b", "bob", "y").unwrap();

    assert!(dir.path().join("team-a").join(LOG_FILE_NAME).is_file());
    assert!(dir.path().join("team_b").join(LOG_FILE_NAME).is_file());
    assert_eq!(ledger.operations("team-a").unwrap().len(), 1);
    assert!(ledger.operations("nobody").unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────
// Idempotent appends
// ─────────────────────────────────────────────────────────────

#[test]
fn reappend_after_reopen_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let ops = load_golden_operations();
    {
        let mut store = FileStore::open(dir.path()).unwrap();
        for op in &ops[..4] {
            store.append(op).unwrap();
        }
    }

    let mut store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.append(&ops[2]).unwrap(), 3);
    assert_eq!(store.append(&ops[4]).unwrap(), 5);
    assert_eq!(store.load("golden").unwrap().len(), 5);
}

#[test]
fn prepared_operation_resubmitted_after_restart_is_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let op = {
        let ledger = open_ledger(dir.path());
        let op = ledger.prepare("ws", "alice", OperationBody::capture("fix bug")).unwrap();
        ledger.append(op.clone()).unwrap();
        op
    };

    let ledger = open_ledger(dir.path());
    assert_eq!(ledger.append(op.clone()).unwrap(), op);
    let ops = ledger.operations("ws").unwrap();
    assert_eq!(ops, vec![op]);
}

#[test]
fn same_id_different_content_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let ops = load_golden_operations();
    let mut store = FileStore::open(dir.path()).unwrap();
    store.append(&ops[0]).unwrap();

    let mut forged = ops[0].clone();
    forged.actor = "mallory".into();
    let err = store.append(&forged).unwrap_err();
    assert!(matches!(err, StoreError::IdConflict { ref id } if id == "mem_fix00001"));
    assert_eq!(store.load("golden").unwrap().len(), 1);
}

// ─────────────────────────────────────────────────────────────
// Corruption
// ─────────────────────────────────────────────────────────────

#[test]
fn truncated_log_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let ops = load_golden_operations();
    {
        let mut store = FileStore::open(dir.path()).unwrap();
        for op in &ops[..5] {
            store.append(op).unwrap();
        }
    }

    let log_path = dir.path().join("golden").join(LOG_FILE_NAME);
    let data = fs::read(&log_path).unwrap();
    fs::write(&log_path, &data[..data.len() - 10]).unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    assert!(matches!(
        store.load("golden"),
        Err(StoreError::Corrupt { .. })
    ));
}

#[test]
fn foreign_approve_without_evidence_does_not_close() {
    let dir = tempfile::tempdir().unwrap();
    let ops = load_golden_operations();
    let log_dir = dir.path().join("golden");
    fs::create_dir_all(&log_dir).unwrap();

    // cmt_ship0001 up to and including its submit, then a bare approve.
    let mut frames: Vec<_> = ops[..6]
        .iter()
        .enumerate()
        .map(|(i, op)| operation_to_proto(op, i as u64 + 1))
        .collect();
    let mut bare = operation_to_proto(&ops[6], 7);
    bare.payload = Some(PayloadKind::Approve(Approve {
        commitment: "cmt_ship0001".into(),
        evidence: None,
        comment: None,
    }));
    frames.push(bare);

    let mut bytes = Vec::new();
    for frame in &frames {
        let buf = frame.encode_to_vec();
        bytes.extend_from_slice(&(buf.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&buf);
    }
    fs::write(log_dir.join(LOG_FILE_NAME), bytes).unwrap();

    let ledger = open_ledger(dir.path());
    let c = ledger.get_commitment("golden", "cmt_ship0001").unwrap().unwrap();
    assert_eq!(c.state, CommitmentState::InReview);
    assert_eq!(c.evidence, None);
}

// ─────────────────────────────────────────────────────────────
// Write surface against the file store
// ─────────────────────────────────────────────────────────────

#[test]
fn ledger_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (mem, cmt, hash) = {
        let ledger = open_ledger(dir.path());
        let mem = ledger.capture("ws", "alice", "fix bug").unwrap();
        let cmt = ledger.commit("ws", "alice", "ship fix", &mem.id).unwrap();
        ledger.claim("ws", "bob", &cmt.id).unwrap();
        ledger.submit("ws", "bob", &cmt.id).unwrap();
        ledger.approve("ws", "carol", &cmt.id, &mem.id).unwrap();
        ledger.reopen("ws", "dave", &cmt.id, "regressed").unwrap();
        let (_, hash) = ledger.replay("ws").unwrap();
        (mem, cmt, hash)
    };

    let ledger = open_ledger(dir.path());
    let (_, reopened_hash) = ledger.replay("ws").unwrap();
    assert_eq!(hash, reopened_hash);

    let c = ledger.get_commitment("ws", &cmt.id).unwrap().unwrap();
    assert_eq!(c.state, CommitmentState::Reopened);
    assert_eq!(c.evidence.as_deref(), Some(mem.id.as_str()));
    assert_eq!(c.closed_by.as_deref(), Some("carol"));

    let timeline: Vec<_> = ledger
        .commitment_timeline("ws", &cmt.id)
        .unwrap()
        .into_iter()
        .map(|op| op.kind().as_str())
        .collect();
    assert_eq!(timeline, ["commit", "claim", "submit", "approve", "reopen"]);
}

#[test]
fn close_with_empty_evidence_leaves_log_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = open_ledger(dir.path());
    let mem = ledger.capture("ws", "a", "x").unwrap();
    let cmt = ledger.commit("ws", "a", "y", &mem.id).unwrap();
    let log_path = dir.path().join("ws").join(LOG_FILE_NAME);
    let before = fs::read(&log_path).unwrap();

    let err = ledger.close("ws", "a", &cmt.id, "").unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(!err.is_retryable());
    assert_eq!(fs::read(&log_path).unwrap(), before);
}

#[test]
fn equal_timestamps_replay_in_insertion_order() {
    let dir = tempfile::tempdir().unwrap();
    // Every operation shares the ledger's fixed clock.
    let ledger = open_ledger(dir.path());
    let mem = ledger.capture("ws", "a", "x").unwrap();
    let cmt = ledger.commit("ws", "a", "y", &mem.id).unwrap();
    ledger.claim("ws", "alice", &cmt.id).unwrap();
    ledger.release("ws", "alice", &cmt.id, None).unwrap();

    let c = ledger.get_commitment("ws", &cmt.id).unwrap().unwrap();
    assert_eq!(c.state, CommitmentState::Open);
    assert_eq!(c.owner, None);
}

#[test]
fn external_refs_and_board() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = open_ledger(dir.path());
    let mem = ledger.capture("ws", "a", "x").unwrap();
    let cmt = ledger.commit("ws", "a", "y", &mem.id).unwrap();
    ledger
        .annotate_with(
            "ws",
            "ci",
            AnnotatePayload::new(&cmt.id, "PR #7").with_kind(EXTERNAL_REF_KIND),
        )
        .unwrap();
    ledger.annotate("ws", "a", &cmt.id, "plain note").unwrap();

    let refs = ledger.external_refs("ws", &cmt.id).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].actor, "ci");

    let board = ledger.kanban_board("ws").unwrap();
    assert_eq!(board.todo.len(), 1);
    assert_eq!(ledger.commitments_from_source("ws", &mem.id).unwrap().len(), 1);
    assert!(ledger.commitments_with_evidence("ws", &mem.id).unwrap().is_empty());
    assert_eq!(ledger.actor_activity("ws").unwrap()["a"].operations, 3);
}

// ─────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────

#[test]
fn concurrent_appends_are_all_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(open_ledger(dir.path()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                for i in 0..10 {
                    ledger
                        .capture("ws", &format!("worker{t}"), format!("note {i}"))
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let memories = ledger.list_memories("ws").unwrap();
    assert_eq!(memories.len(), 40);
    let reopened = open_ledger(dir.path());
    assert_eq!(reopened.operations("ws").unwrap().len(), 40);
}

#[test]
fn racing_claims_with_expected_state_admit_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(open_ledger(dir.path()));
    let mem = ledger.capture("ws", "a", "x").unwrap();
    let cmt = ledger.commit("ws", "a", "y", &mem.id).unwrap();

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            let id = cmt.id.clone();
            thread::spawn(move || {
                ledger
                    .record_expecting(
                        "ws",
                        &format!("worker{t}"),
                        OperationBody::claim(id),
                        CommitmentState::Open,
                    )
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn subscriber_on_another_thread_sees_appends() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(open_ledger(dir.path()));
    let rx = ledger.subscribe().unwrap();

    let writer = {
        let ledger = Arc::clone(&ledger);
        thread::spawn(move || {
            let mem = ledger.capture("ws", "a", "x").unwrap();
            ledger.commit("ws", "a", "y", &mem.id).unwrap();
        })
    };
    writer.join().unwrap();

    let kinds: Vec<_> = rx.try_iter().map(|op| op.kind().as_str()).collect();
    assert_eq!(kinds, ["capture", "commit"]);
}

// ─────────────────────────────────────────────────────────────
// Drift between log prefixes
// ─────────────────────────────────────────────────────────────

#[test]
fn drift_between_golden_prefixes() {
    let ops = load_golden_operations();
    let (early, _) = replay::rebuild_view(&ops[..8]);
    let (late, _) = replay::rebuild_view(&ops);
    let report = compare_views(&early, &late);

    assert_eq!(
        report.added_commitments,
        vec!["cmt_flaky001".to_string()]
    );
    assert!(report
        .state_changes
        .iter()
        .any(|s| s.commitment == "cmt_docs0001" && s.to == CommitmentState::Claimed));
}

// ─────────────────────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────────────────────

#[test]
fn only_store_io_is_retryable() {
    let io = LedgerError::Store(StoreError::Io(std::io::Error::other("disk gone")));
    assert!(io.is_retryable());
    let conflict = LedgerError::Store(StoreError::IdConflict { id: "op_1".into() });
    assert!(!conflict.is_retryable());
    let missing = Evidence::new("");
    assert!(missing.is_err());
}
