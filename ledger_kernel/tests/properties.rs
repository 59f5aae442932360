//! Property tests over randomly generated operation logs.
//!
//! Logs are built from a small id pool so lifecycle operations collide on
//! the same commitments often, including ones that were never committed.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use ledger_kernel::hashing::projection_hash;
use ledger_kernel::invariants::validate_invariants;
use ledger_kernel::operations::{Evidence, OperationBody, OperationKind};
use ledger_kernel::projector::{get_commitment, get_memory, project_commitments, project_memories};
use ledger_kernel::writer::new_operation;
use ledger_kernel::{CommitmentState, LedgerView, Operation};

const POOL: usize = 5;

#[derive(Debug, Clone)]
enum Step {
    Capture,
    Commit { source: usize },
    Claim(usize),
    Release(usize),
    Submit(usize),
    Approve { cmt: usize, evidence: Option<usize> },
    Close { cmt: usize, evidence: usize },
    Reopen(usize),
    Annotate { target: usize, on_memory: bool },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let idx = 0usize..POOL;
    prop_oneof![
        Just(Step::Capture),
        idx.clone().prop_map(|source| Step::Commit { source }),
        idx.clone().prop_map(Step::Claim),
        idx.clone().prop_map(Step::Release),
        idx.clone().prop_map(Step::Submit),
        (idx.clone(), proptest::option::of(idx.clone()))
            .prop_map(|(cmt, evidence)| Step::Approve { cmt, evidence }),
        (idx.clone(), idx.clone()).prop_map(|(cmt, evidence)| Step::Close { cmt, evidence }),
        idx.clone().prop_map(Step::Reopen),
        (idx, any::<bool>()).prop_map(|(target, on_memory)| Step::Annotate { target, on_memory }),
    ]
}

fn log_strategy() -> impl Strategy<Value = Vec<Operation>> {
    let actor = prop_oneof![Just("alice"), Just("bob"), Just("carol")];
    prop::collection::vec((step_strategy(), actor), 0..48).prop_map(|steps| build_log(&steps))
}

fn mem(i: usize) -> String {
    format!("mem_{i}")
}

fn cmt(i: usize) -> String {
    format!("cmt_{i}")
}

fn evidence(i: usize) -> Evidence {
    Evidence::new(mem(i)).unwrap()
}

fn build_log(steps: &[(Step, &str)]) -> Vec<Operation> {
    let base = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
    let (mut memories, mut commitments) = (0, 0);

    steps
        .iter()
        .enumerate()
        .map(|(n, (step, actor))| {
            let mut id = format!("op_{n}");
            let body = match step {
                Step::Capture => {
                    id = mem(memories);
                    memories += 1;
                    OperationBody::capture(format!("observation {n}"))
                }
                Step::Commit { source } => {
                    id = cmt(commitments);
                    commitments += 1;
                    OperationBody::commit(format!("obligation {n}"), mem(*source))
                }
                Step::Claim(c) => OperationBody::claim(cmt(*c)),
                Step::Release(c) => OperationBody::release(cmt(*c), None),
                Step::Submit(c) => OperationBody::submit(cmt(*c)),
                Step::Approve { cmt: c, evidence: e } => {
                    OperationBody::approve(cmt(*c), e.map(evidence))
                }
                Step::Close { cmt: c, evidence: e } => OperationBody::close(cmt(*c), evidence(*e)),
                Step::Reopen(c) => OperationBody::reopen(cmt(*c), "again"),
                Step::Annotate { target, on_memory } => {
                    let target = if *on_memory { mem(*target) } else { cmt(*target) };
                    OperationBody::annotate(target, format!("note {n}"))
                }
            };
            Operation::new(id, "ws", base + Duration::seconds(n as i64 / 2), *actor, body)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn detail_lookup_matches_bulk_projection(ops in log_strategy()) {
        let commitments = project_commitments(&ops);
        for c in &commitments {
            let detail = get_commitment(&ops, &c.id);
            prop_assert_eq!(detail.as_ref(), Some(c));
        }
        for i in 0..POOL {
            let id = cmt(i);
            let bulk = commitments.iter().find(|c| c.id == id).cloned();
            prop_assert_eq!(get_commitment(&ops, &id), bulk);
        }

        let memories = project_memories(&ops);
        for m in &memories {
            let detail = get_memory(&ops, &m.id);
            prop_assert_eq!(detail.as_ref(), Some(m));
        }
    }

    #[test]
    fn no_closed_commitment_lacks_evidence(ops in log_strategy()) {
        let view = LedgerView::project(&ops);
        for c in &view.commitments {
            if c.state == CommitmentState::Closed {
                prop_assert!(c.evidence.as_deref().is_some_and(|e| !e.trim().is_empty()));
                prop_assert!(c.closed_by.is_some());
            }
        }
        prop_assert_eq!(validate_invariants(&view), Ok(()));
    }

    #[test]
    fn projection_is_idempotent(ops in log_strategy()) {
        let first = LedgerView::project(&ops);
        let second = LedgerView::project(&ops);
        prop_assert_eq!(projection_hash(&first), projection_hash(&second));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn annotations_never_move_lifecycle(ops in log_strategy()) {
        let without: Vec<Operation> = ops
            .iter()
            .filter(|op| op.kind() != OperationKind::Annotate)
            .cloned()
            .collect();
        let with_notes = project_commitments(&ops);
        let bare = project_commitments(&without);
        prop_assert_eq!(with_notes.len(), bare.len());
        for (a, b) in with_notes.iter().zip(&bare) {
            prop_assert_eq!(a.state, b.state);
            prop_assert_eq!(&a.owner, &b.owner);
            prop_assert_eq!(&a.evidence, &b.evidence);
            prop_assert_eq!(&a.closed_by, &b.closed_by);
        }
    }

    #[test]
    fn blank_evidence_never_builds_a_close(blank in "[ \t]{0,4}") {
        prop_assert!(Evidence::new(blank.clone()).is_err());
        let from_json = serde_json::from_value::<Operation>(serde_json::json!({
            "id": "op_1",
            "workspace_id": "ws",
            "timestamp": "2026-01-05T10:00:00Z",
            "actor": "alice",
            "type": "close",
            "payload": { "commitment": "cmt_0", "evidence": blank },
        }));
        prop_assert!(from_json.is_err());
    }

    #[test]
    fn writer_stamps_prefixed_ids(actor in "[a-z]{1,8}", body in "[a-z ]{0,12}[a-z]") {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let op = new_operation("ws", &actor, OperationBody::capture(body), now).unwrap();
        prop_assert!(op.id.starts_with("mem_"));
        prop_assert_eq!(op.id.len(), "mem_".len() + 8);
        prop_assert_eq!(op.timestamp, now);
    }
}
