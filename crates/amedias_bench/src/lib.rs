//! Benchmark utilities.

use rand::Rng;
use serde_json::{json, Value};

const CONCEPTS: [&str; 6] = ["dentista", "gafas", "seguro", "colegio", "taller", "farmacia"];

/// Generate an application snapshot with `reimbursements` entries.
pub fn sample_state(reimbursements: usize) -> Value {
    let mut rng = rand::thread_rng();
    let list: Vec<Value> = (0..reimbursements)
        .map(|i| {
            json!({
                "id": format!("r{i}"),
                "concepto": CONCEPTS[i % CONCEPTS.len()],
                "importe": rng.gen_range(10..2000),
                "plazos": rng.gen_range(1..12),
                "pagados": rng.gen_range(0..12),
            })
        })
        .collect();

    json!({
        "version": 2,
        "activeTab": "calc",
        "calc": {
            "nomina1": 1800,
            "nomina2": 1500,
            "fondoComun": 1200,
            "ajuste": 0,
            "mode": "prop"
        },
        "reimbursements": list,
        "timestamp": "2025-01-01T00:00:00.000Z"
    })
}

/// Serialized size of a snapshot in bytes.
pub fn raw_size(state: &Value) -> usize {
    state.to_string().len()
}
