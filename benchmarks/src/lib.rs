//! Shared generators for replay benchmark suites.

use serde_json::{json, Value};

/// Synthetic execution ledger with `events` entries.
///
/// Every event carries volatile keys and a telemetry subtree so the
/// cleaning pass has real work to do. `seed` varies only volatile content:
/// ledgers built from different seeds canonicalize identically.
#[must_use]
pub fn ledger(events: usize, seed: u64) -> Value {
    let events: Vec<Value> = (0..events)
        .rev()
        .map(|i| {
            json!({
                "idx": i,
                "op": format!("op_{}", i % 7),
                "args": {"path": format!("/data/{i}.json"), "mode": "rw", "retries": null},
                "timestamp": format!("2026-01-15T12:{:02}:{:02}Z", (i / 60) % 60, i % 60),
                "trace_id": format!("{seed:016x}{i:08x}"),
                "telemetry": {"latency_ms": seed.wrapping_add(i as u64) % 997},
            })
        })
        .collect();
    json!({
        "schema_version": "1.0",
        "execution_id": format!("exec-{seed}"),
        "events": events,
    })
}

/// Ledger sizes exercised by the scaling groups.
pub const SIZES: [usize; 3] = [10, 100, 1_000];
