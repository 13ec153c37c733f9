// crates/semantiva-core/src/assertions.rs
// ============================================================================
// Module: Assertions & Environment Pins
// Description: Fixed built-in pre/postcondition checks evaluated around each
//              node, and the once-per-run environment snapshot.
// Purpose: Produce the `assertions` bundle recorded on every SER.
// Dependencies: crate::ser, crate::types, std
// ============================================================================

//! ## Overview
//! These are the built-in checks [`crate::node_runtime::NodeRuntime`]
//! evaluates around every node: `input_type_ok`/`required_keys_present`/
//! `config_valid` before invocation, `output_type_ok`/`context_writes_realized`
//! after. Environment pins are computed once per run and reused on every SER.

use std::collections::BTreeSet;

use serde_json::json;

use crate::ser::Assertion;
use crate::ser::CheckOutcome;
use crate::ser::EnvironmentPins;
use crate::types::DataType;

/// This crate's version, embedded at compile time.
const FRAMEWORK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Builds the environment snapshot pinned once per run.
#[must_use]
pub fn environment_pins(runtime_version: &str) -> EnvironmentPins {
    EnvironmentPins {
        runtime_version: runtime_version.to_string(),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        framework_version: FRAMEWORK_VERSION.to_string(),
    }
}

/// Precondition: the incoming payload's data type matches the node's
/// declared input type (or the node declares no input type).
#[must_use]
pub fn input_type_ok(expected: Option<&DataType>, actual: Option<&DataType>) -> Assertion {
    let passed = match expected {
        None => true,
        Some(expected) => actual.is_some_and(|actual| actual.is_compatible_with(expected)),
    };
    Assertion {
        name: "input_type_ok".to_string(),
        outcome: if passed { CheckOutcome::Pass } else { CheckOutcome::Fail },
        detail: None,
    }
}

/// Precondition: every parameter required by the processor resolved to a value.
#[must_use]
pub fn required_keys_present(missing: &[String]) -> Assertion {
    Assertion {
        name: "required_keys_present".to_string(),
        outcome: if missing.is_empty() { CheckOutcome::Pass } else { CheckOutcome::Fail },
        detail: if missing.is_empty() {
            None
        } else {
            Some(json!({ "missing_keys": missing }))
        },
    }
}

/// Precondition: node configuration declared no parameters the processor
/// does not accept (warning-level; only fails under strict resolution, which
/// surfaces as a resolver error before this assertion is even evaluated).
#[must_use]
pub fn config_valid(unknown_parameters: &[String]) -> Assertion {
    Assertion {
        name: "config_valid".to_string(),
        outcome: if unknown_parameters.is_empty() { CheckOutcome::Pass } else { CheckOutcome::Fail },
        detail: if unknown_parameters.is_empty() {
            None
        } else {
            Some(json!({ "unknown_parameters": unknown_parameters }))
        },
    }
}

/// Postcondition: the node's produced data type matches its declared output
/// type (or the node declares no output type).
#[must_use]
pub fn output_type_ok(expected: Option<&DataType>, actual: Option<&DataType>) -> Assertion {
    let passed = match expected {
        None => true,
        Some(expected) => actual.is_some_and(|actual| actual.is_compatible_with(expected)),
    };
    Assertion {
        name: "output_type_ok".to_string(),
        outcome: if passed { CheckOutcome::Pass } else { CheckOutcome::Fail },
        detail: None,
    }
}

/// Postcondition: every context write attempted by the node was realized
/// (i.e. none were rejected by the observer for being undeclared).
#[must_use]
pub fn context_writes_realized(rejected_keys: &BTreeSet<String>) -> Assertion {
    Assertion {
        name: "context_writes_realized".to_string(),
        outcome: if rejected_keys.is_empty() { CheckOutcome::Pass } else { CheckOutcome::Fail },
        detail: if rejected_keys.is_empty() {
            None
        } else {
            Some(json!({ "missing_keys": rejected_keys }))
        },
    }
}
