// crates/semantiva-core/tests/proptest_identity.rs
// ============================================================================
// Module: Identity Property-Based Tests
// Description: Metamorphic determinism properties for canonicalization and
//              node_uuid derivation under key reordering and whitespace noise.
// Purpose: Detect any accidental dependence on map iteration or JSON
//          formatting creeping into identity derivation.
// ============================================================================

//! Property-based tests for identity determinism.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use semantiva_core::identity::canonicalize;
use semantiva_core::identity::node_uuid;
use serde_json::Value;
use serde_json::json;

fn json_value_strategy(max_depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|v| Value::Number(v.into())),
        "[a-z]{0,8}".prop_map(Value::String),
    ];

    leaf.prop_recursive(max_depth, 32, 6, |inner| {
        prop::collection::btree_map("[a-z]{1,4}", inner, 0..6).prop_map(|map| {
            let mut object = serde_json::Map::new();
            for (key, value) in map {
                object.insert(key, value);
            }
            Value::Object(object)
        })
    })
}

/// Re-renders a JSON object's top-level keys in reverse insertion order,
/// simulating a differently key-ordered (but semantically identical) encoder.
fn reverse_key_order(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut reversed = serde_json::Map::new();
            for (key, val) in map.iter().rev() {
                reversed.insert(key.clone(), val.clone());
            }
            Value::Object(reversed)
        }
        other => other.clone(),
    }
}

proptest! {
    #[test]
    fn canonicalize_is_invariant_to_object_key_order(value in json_value_strategy(3)) {
        let reordered = reverse_key_order(&value);
        prop_assert_eq!(canonicalize(&value).unwrap(), canonicalize(&reordered).unwrap());
    }

    #[test]
    fn canonicalize_never_panics_on_arbitrary_json(value in json_value_strategy(3)) {
        let _ = canonicalize(&value);
    }

    #[test]
    fn node_uuid_is_stable_under_param_key_reordering(
        role in "[a-z]{1,8}",
        processor_ref in "[a-z.]{1,16}",
        addend in any::<i64>(),
        scale in any::<i64>(),
    ) {
        let mut forward = BTreeMap::new();
        forward.insert("addend".to_string(), json!(addend));
        forward.insert("scale".to_string(), json!(scale));

        let fields_a = json!({
            "role": role,
            "processor_ref": processor_ref,
            "params": forward,
            "ports": [],
        });
        let fields_b = json!({
            "ports": [],
            "params": { "scale": scale, "addend": addend },
            "processor_ref": processor_ref,
            "role": role,
        });

        prop_assert_eq!(node_uuid(&fields_a).unwrap(), node_uuid(&fields_b).unwrap());
    }
}
