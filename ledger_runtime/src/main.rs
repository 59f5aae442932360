//! ledger-replay: replay a workspace log and print its derived state.
//!
//! Usage:
//!   ledger-replay <operations.json>
//!   ledger-replay <data_dir> <workspace_id>
//!
//! The JSON form takes an array of operations in log order. Exits non-zero
//! when the projected view breaks a ledger invariant.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use ledger_kernel::aggregation::compute_stats;
use ledger_kernel::invariants::validate_invariants;
use ledger_kernel::operations::Operation;
use ledger_runtime::drift::verify_determinism;
use ledger_runtime::file_store::FileStore;
use ledger_runtime::replay::rebuild_view;
use ledger_runtime::store::{read_ordered, OperationStore};
use ledger_runtime::telemetry::init_tracing;

fn main() -> ExitCode {
    init_tracing("info");
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<bool> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let ops = match args.as_slice() {
        [json] => load_json(Path::new(json))?,
        [data_dir, workspace] => FileStore::open(Path::new(data_dir))?
            .load(workspace)
            .with_context(|| format!("loading workspace {workspace}"))?,
        _ => bail!("usage: ledger-replay <operations.json> | <data_dir> <workspace_id>"),
    };

    let ops = read_ordered(ops);
    let (view, hash) = rebuild_view(&ops);
    verify_determinism(&ops)?;
    let stats = compute_stats(&ops, Utc::now());

    println!("operations:  {}", ops.len());
    println!("memories:    {}", view.memories.len());
    println!("commitments: {}", view.commitments.len());
    println!("stats:       {}", serde_json::to_string_pretty(&stats)?);
    println!("hash:        {hash}");

    match validate_invariants(&view) {
        Ok(()) => {
            println!("invariants:  ok");
            Ok(true)
        }
        Err(violation) => {
            println!("invariants:  VIOLATED: {violation}");
            Ok(false)
        }
    }
}

fn load_json(path: &Path) -> Result<Vec<Operation>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
