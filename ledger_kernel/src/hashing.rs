//! Ledger Kernel: Canonical Hashing
//!
//! Deterministic canonical serialization + SHA-256 hashing of a projected
//! view. Two projections of the same log must hash identically.
//!
//! Rules:
//!   - Memories and commitments in projection (log) order
//!   - Fixed field order per record, absent values as `null`
//!   - Timestamps as RFC 3339 UTC with millisecond precision
//!   - Object keys inside `meta` sorted, recursively
//!   - UTF-8 JSON, no whitespace

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::{Annotation, Commitment, Memory};
use crate::operations::Meta;
use crate::projector::LedgerView;
use crate::LEDGER_SCHEMA_VERSION;

/// Canonical serialization of a view to UTF-8 JSON bytes.
/// Includes the schema version as the first field.
pub fn canonical_serialize(view: &LedgerView) -> Vec<u8> {
    build_canonical_value(view).to_string().into_bytes()
}

/// SHA-256 of the canonical serialization. Lowercase hex string.
pub fn projection_hash(view: &LedgerView) -> String {
    let digest = Sha256::digest(canonical_serialize(view));
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Field order: schema_version, memories, commitments
fn build_canonical_value(view: &LedgerView) -> Value {
    let mut root = Map::new();
    root.insert("schema_version".into(), Value::from(LEDGER_SCHEMA_VERSION));
    root.insert(
        "memories".into(),
        Value::Array(view.memories.iter().map(memory_value).collect()),
    );
    root.insert(
        "commitments".into(),
        Value::Array(view.commitments.iter().map(commitment_value).collect()),
    );
    Value::Object(root)
}

fn memory_value(m: &Memory) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(m.id.clone()));
    map.insert("body".into(), Value::String(m.body.clone()));
    map.insert("kind".into(), opt_string(&m.kind));
    map.insert("actor".into(), Value::String(m.actor.clone()));
    map.insert("timestamp".into(), timestamp(&m.timestamp));
    map.insert("refs".into(), string_list(&m.refs));
    map.insert("meta".into(), meta_value(&m.meta));
    map.insert("annotations".into(), annotations_value(&m.annotations));
    Value::Object(map)
}

fn commitment_value(c: &Commitment) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(c.id.clone()));
    map.insert("body".into(), Value::String(c.body.clone()));
    map.insert("source".into(), Value::String(c.source.clone()));
    map.insert("state".into(), Value::String(c.state.as_str().into()));
    map.insert("owner".into(), opt_string(&c.owner));
    map.insert("evidence".into(), opt_string(&c.evidence));
    map.insert("closed_by".into(), opt_string(&c.closed_by));
    map.insert("actor".into(), Value::String(c.actor.clone()));
    map.insert("timestamp".into(), timestamp(&c.timestamp));
    map.insert("tags".into(), string_list(&c.tags));
    map.insert("meta".into(), meta_value(&c.meta));
    map.insert("annotations".into(), annotations_value(&c.annotations));
    Value::Object(map)
}

fn annotations_value(annotations: &[Annotation]) -> Value {
    Value::Array(
        annotations
            .iter()
            .map(|a| {
                let mut map = Map::new();
                map.insert("id".into(), Value::String(a.id.clone()));
                map.insert("body".into(), Value::String(a.body.clone()));
                map.insert("kind".into(), opt_string(&a.kind));
                map.insert("actor".into(), Value::String(a.actor.clone()));
                map.insert("timestamp".into(), timestamp(&a.timestamp));
                Value::Object(map)
            })
            .collect(),
    )
}

fn timestamp(ts: &DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn opt_string(v: &Option<String>) -> Value {
    v.as_ref().map_or(Value::Null, |s| Value::String(s.clone()))
}

fn string_list(v: &[String]) -> Value {
    Value::Array(v.iter().cloned().map(Value::String).collect())
}

fn meta_value(meta: &Option<Meta>) -> Value {
    match meta {
        Some(map) => sorted(&Value::Object(map.clone())),
        None => Value::Null,
    }
}

/// Rebuild `v` with every object's keys in sorted order.
fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sorted(&map[k.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
