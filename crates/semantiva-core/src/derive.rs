// crates/semantiva-core/src/derive.rs
// ============================================================================
// Module: Derive Engine (Preprocessors)
// Description: Pre-execution computation of swept parameters and the
//              sanitized signature that feeds node_semantic_id.
// Purpose: Let a node declare a parameter sweep without that sweep affecting
//          its structural node_uuid.
// Dependencies: serde, serde_json, crate::identity
// ============================================================================

//! ## Overview
//! A `derive` block describes one or more parameter sweeps attached to a
//! node. The engine expands a sweep into the ordered collection of parameter
//! overlays the node will be invoked with, and separately computes a
//! *sanitized* signature (shape only: parameter names, domain sizes, mode,
//! broadcast flag) that is hashed into `node_semantic_id`. The concrete swept
//! values never enter `node_uuid`'s hash material.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::identity::CanonicalizationError;
use crate::identity::sha256_canonical;

// ============================================================================
// SECTION: Sweep Declaration
// ============================================================================

/// How a sweep's declared value lists are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Values at the same index travel together (lists must be equal length).
    Zip,
    /// Cartesian product across all declared value lists.
    Product,
}

/// One parameter's declared sweep domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSweep {
    /// Name of the parameter being swept.
    pub parameter: String,
    /// Candidate values for the parameter.
    pub values: Vec<Value>,
}

/// A node's `derive` block: one or more parameter sweeps plus how they combine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeriveBlock {
    /// Declared sweeps.
    pub parameter_sweep: Vec<ParameterSweep>,
    /// Combination mode across the declared sweeps.
    pub mode: SweepMode,
    /// Whether the resulting collection is broadcast to a downstream
    /// collection-consuming node rather than expanded into separate node
    /// invocations.
    pub broadcast: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while expanding a derive block.
#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    /// `mode: zip` requires all sweep value lists to share the same length.
    #[error("zip sweep requires equal-length value lists, got lengths {0:?}")]
    UnequalZipLengths(Vec<usize>),
    /// The derive block declared no sweeps.
    #[error("derive block must declare at least one parameter_sweep")]
    EmptySweep,
}

// ============================================================================
// SECTION: Expansion
// ============================================================================

/// Expands a [`DeriveBlock`] into the ordered collection of parameter overlays
/// the node will be invoked with, one overlay per expansion element.
///
/// # Errors
///
/// Returns [`DeriveError`] when the block is malformed.
pub fn expand(block: &DeriveBlock) -> Result<Vec<BTreeMap<String, Value>>, DeriveError> {
    if block.parameter_sweep.is_empty() {
        return Err(DeriveError::EmptySweep);
    }

    match block.mode {
        SweepMode::Zip => expand_zip(&block.parameter_sweep),
        SweepMode::Product => Ok(expand_product(&block.parameter_sweep)),
    }
}

/// Expands sweeps in lock-step by index; all value lists must share one length.
fn expand_zip(sweeps: &[ParameterSweep]) -> Result<Vec<BTreeMap<String, Value>>, DeriveError> {
    let lengths: Vec<usize> = sweeps.iter().map(|s| s.values.len()).collect();
    let Some(&first) = lengths.first() else {
        return Err(DeriveError::EmptySweep);
    };
    if lengths.iter().any(|&len| len != first) {
        return Err(DeriveError::UnequalZipLengths(lengths));
    }

    let mut overlays = Vec::with_capacity(first);
    for index in 0..first {
        let mut overlay = BTreeMap::new();
        for sweep in sweeps {
            overlay.insert(sweep.parameter.clone(), sweep.values[index].clone());
        }
        overlays.push(overlay);
    }
    Ok(overlays)
}

/// Expands sweeps as a Cartesian product across their value lists.
fn expand_product(sweeps: &[ParameterSweep]) -> Vec<BTreeMap<String, Value>> {
    let mut overlays: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
    for sweep in sweeps {
        let mut next = Vec::with_capacity(overlays.len() * sweep.values.len());
        for overlay in &overlays {
            for value in &sweep.values {
                let mut extended = overlay.clone();
                extended.insert(sweep.parameter.clone(), value.clone());
                next.push(extended);
            }
        }
        overlays = next;
    }
    overlays
}

// ============================================================================
// SECTION: Sanitized Signature
// ============================================================================

/// Structural-only summary of a derive block: parameter names, domain sizes,
/// mode, and broadcast flag. Concrete swept values are intentionally
/// excluded so that `node_semantic_id` changes only when the sweep's *shape*
/// changes, never when only its values do.
#[must_use]
pub fn sanitized_signature(block: &DeriveBlock) -> Value {
    let sweeps: Vec<Value> = block
        .parameter_sweep
        .iter()
        .map(|sweep| {
            json!({
                "parameter": sweep.parameter,
                "domain_size": sweep.values.len(),
            })
        })
        .collect();
    json!({
        "sweeps": sweeps,
        "mode": block.mode,
        "broadcast": block.broadcast,
    })
}

/// Computes `node_semantic_id` from a node's structural `node_uuid` and the
/// sanitized signature of its (optional) derive block.
///
/// # Errors
///
/// Returns [`CanonicalizationError`] when the signature cannot be
/// canonicalized.
pub fn node_semantic_id(
    node_uuid: &uuid::Uuid,
    derive: Option<&DeriveBlock>,
) -> Result<String, CanonicalizationError> {
    let signature = derive.map_or(Value::Null, sanitized_signature);
    let material = json!({
        "node_uuid": node_uuid.to_string(),
        "derive_signature": signature,
    });
    sha256_canonical(&material)
}
