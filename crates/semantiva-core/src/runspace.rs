// crates/semantiva-core/src/runspace.rs
// ============================================================================
// Module: Run-Space Planner
// Description: Expands a declarative run_space block into a deterministic,
//              ordered sequence of per-run context overlays.
// Purpose: Implement block expansion and combination exactly once so every
//          caller (CLI, embedding host) gets the same plan for the same spec.
// Dependencies: crate::identity, serde_json
// ============================================================================

//! ## Overview
//! [`RunSpacePlanner::plan`] never executes a node: it only computes the
//! ordered list of [`RunOverlay`] the orchestrator will later be invoked
//! with, one orchestrator run per overlay. `dry_run` and a pipeline-level
//! `--dry-run` both stop here, before any `Executor::submit_and_wait` call.
//!
//! Invariants:
//! - Duplicate context keys across blocks are rejected before any expansion.
//! - `len(plan) <= max_runs`; exceeding it is
//!   [`RunSpaceError::MaxRunsExceeded`], not a silent truncation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::identity::CanonicalizationError;
use crate::identity::run_space_spec_id;

// ============================================================================
// SECTION: Spec
// ============================================================================

/// How values within one block are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockMode {
    /// List values travel together by index; all lists in the block must be
    /// the same length.
    ByPosition,
    /// Cartesian product over the block's keys.
    Combinatorial,
}

/// How the expanded blocks are combined with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Cartesian product across blocks. The default.
    Combinatorial,
    /// Blocks align by index; all block expansions must be the same size.
    ByPosition,
}

impl Default for CombineMode {
    fn default() -> Self {
        Self::Combinatorial
    }
}

/// One run-space block: a mode plus the context keys/value-lists it declares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpaceBlock {
    /// Expansion mode for this block.
    pub mode: BlockMode,
    /// Declared key -> candidate values, in declaration order.
    pub keys: Vec<(String, Vec<Value>)>,
}

/// A declarative `run_space` spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpaceSpec {
    /// How the blocks below are combined.
    #[serde(default)]
    pub combine: CombineMode,
    /// Declared blocks, in declaration order.
    pub blocks: Vec<RunSpaceBlock>,
    /// Upper bound on the total number of planned runs.
    pub max_runs: usize,
    /// When `true`, [`RunSpacePlanner::plan`] computes the plan but the
    /// caller must not execute any run against it.
    #[serde(default)]
    pub dry_run: bool,
}

// ============================================================================
// SECTION: Plan
// ============================================================================

/// One planned run: its index and the context overlay it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOverlay {
    /// Zero-based position within the plan.
    pub index: usize,
    /// Context keys/values this run overlays onto its initial context.
    pub context: BTreeMap<String, Value>,
}

/// The full output of [`RunSpacePlanner::plan`].
#[derive(Debug, Clone)]
pub struct RunSpacePlan {
    /// Identity of the declarative spec that produced this plan.
    pub run_space_spec_id: String,
    /// Ordered per-run overlays.
    pub overlays: Vec<RunOverlay>,
    /// Whether the caller must stop after planning (spec-level `dry_run`).
    pub dry_run: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while planning a run-space.
#[derive(Debug, thiserror::Error)]
pub enum RunSpaceError {
    /// The same context key was declared by more than one block.
    #[error("duplicate context key across run-space blocks: {0:?}")]
    DuplicateContextKey(Vec<String>),
    /// A `by_position` block's value lists did not share one length.
    #[error("by_position block requires equal-length value lists, got lengths {0:?}")]
    UnequalBlockLengths(Vec<usize>),
    /// `combine: by_position` requires every block's expansion to share one size.
    #[error("by_position combine requires equal-size block expansions, got sizes {0:?}")]
    UnequalCombineSizes(Vec<usize>),
    /// The plan would exceed the declared `max_runs` cap.
    #[error("planned run count {planned} exceeds max_runs {max_runs}")]
    MaxRunsExceeded {
        /// The number of runs the expansion would produce.
        planned: usize,
        /// The declared cap.
        max_runs: usize,
    },
    /// A block declared no keys.
    #[error("run-space block must declare at least one key")]
    EmptyBlock,
    /// The spec could not be canonicalized for identity derivation.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

// ============================================================================
// SECTION: Planner
// ============================================================================

/// Expands a [`RunSpaceSpec`] into a [`RunSpacePlan`].
pub struct RunSpacePlanner;

impl RunSpacePlanner {
    /// Computes the full plan for `spec`, validating duplicate keys, block
    /// shapes, and the `max_runs` cap along the way. Never executes a run.
    ///
    /// # Errors
    ///
    /// Returns [`RunSpaceError`] for any spec-phase violation.
    pub fn plan(spec: &RunSpaceSpec) -> Result<RunSpacePlan, RunSpaceError> {
        Self::validate_disjoint_keys(spec)?;

        let mut block_expansions: Vec<Vec<BTreeMap<String, Value>>> = Vec::with_capacity(spec.blocks.len());
        for block in &spec.blocks {
            block_expansions.push(Self::expand_block(block)?);
        }

        let overlays = Self::combine(spec.combine, &block_expansions)?;

        if overlays.len() > spec.max_runs {
            return Err(RunSpaceError::MaxRunsExceeded { planned: overlays.len(), max_runs: spec.max_runs });
        }

        let run_space_spec_id = run_space_spec_id(spec)?;

        Ok(RunSpacePlan {
            run_space_spec_id,
            overlays: overlays
                .into_iter()
                .enumerate()
                .map(|(index, context)| RunOverlay { index, context })
                .collect(),
            dry_run: spec.dry_run,
        })
    }

    /// Rejects a spec declaring the same context key in more than one block.
    fn validate_disjoint_keys(spec: &RunSpaceSpec) -> Result<(), RunSpaceError> {
        let mut seen = BTreeSet::new();
        let mut duplicates = Vec::new();
        for block in &spec.blocks {
            for (key, _) in &block.keys {
                if !seen.insert(key.clone()) {
                    duplicates.push(key.clone());
                }
            }
        }
        if duplicates.is_empty() { Ok(()) } else { Err(RunSpaceError::DuplicateContextKey(duplicates)) }
    }

    /// Expands one block into its ordered list of key/value overlays.
    fn expand_block(block: &RunSpaceBlock) -> Result<Vec<BTreeMap<String, Value>>, RunSpaceError> {
        if block.keys.is_empty() {
            return Err(RunSpaceError::EmptyBlock);
        }
        match block.mode {
            BlockMode::ByPosition => Self::expand_by_position(block),
            BlockMode::Combinatorial => Ok(Self::expand_combinatorial(block)),
        }
    }

    /// Expands a `by_position` block: values at the same index travel together.
    fn expand_by_position(block: &RunSpaceBlock) -> Result<Vec<BTreeMap<String, Value>>, RunSpaceError> {
        let lengths: Vec<usize> = block.keys.iter().map(|(_, values)| values.len()).collect();
        let Some(&first) = lengths.first() else {
            return Err(RunSpaceError::EmptyBlock);
        };
        if lengths.iter().any(|&len| len != first) {
            return Err(RunSpaceError::UnequalBlockLengths(lengths));
        }
        let mut overlays = Vec::with_capacity(first);
        for index in 0..first {
            let mut overlay = BTreeMap::new();
            for (key, values) in &block.keys {
                overlay.insert(key.clone(), values[index].clone());
            }
            overlays.push(overlay);
        }
        Ok(overlays)
    }

    /// Expands a `combinatorial` block: Cartesian product over its keys.
    fn expand_combinatorial(block: &RunSpaceBlock) -> Vec<BTreeMap<String, Value>> {
        let mut overlays: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
        for (key, values) in &block.keys {
            let mut next = Vec::with_capacity(overlays.len() * values.len());
            for overlay in &overlays {
                for value in values {
                    let mut extended = overlay.clone();
                    extended.insert(key.clone(), value.clone());
                    next.push(extended);
                }
            }
            overlays = next;
        }
        overlays
    }

    /// Combines per-block expansions according to `combine`.
    fn combine(combine: CombineMode, expansions: &[Vec<BTreeMap<String, Value>>]) -> Result<Vec<BTreeMap<String, Value>>, RunSpaceError> {
        match combine {
            CombineMode::Combinatorial => Ok(Self::combine_combinatorial(expansions)),
            CombineMode::ByPosition => Self::combine_by_position(expansions),
        }
    }

    /// Cartesian product across the blocks' own expansions.
    fn combine_combinatorial(expansions: &[Vec<BTreeMap<String, Value>>]) -> Vec<BTreeMap<String, Value>> {
        let mut combined: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
        for expansion in expansions {
            let mut next = Vec::with_capacity(combined.len() * expansion.len().max(1));
            for base in &combined {
                for overlay in expansion {
                    let mut merged = base.clone();
                    merged.extend(overlay.clone());
                    next.push(merged);
                }
            }
            combined = next;
        }
        combined
    }

    /// Aligns the blocks' own expansions by index; all must share one size.
    fn combine_by_position(expansions: &[Vec<BTreeMap<String, Value>>]) -> Result<Vec<BTreeMap<String, Value>>, RunSpaceError> {
        let sizes: Vec<usize> = expansions.iter().map(Vec::len).collect();
        let Some(&first) = sizes.first() else {
            return Ok(vec![]);
        };
        if sizes.iter().any(|&size| size != first) {
            return Err(RunSpaceError::UnequalCombineSizes(sizes));
        }
        let mut combined = Vec::with_capacity(first);
        for index in 0..first {
            let mut merged = BTreeMap::new();
            for expansion in expansions {
                merged.extend(expansion[index].clone());
            }
            combined.push(merged);
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn by_position(keys: &[(&str, &[i64])]) -> RunSpaceBlock {
        RunSpaceBlock {
            mode: BlockMode::ByPosition,
            keys: keys.iter().map(|(k, vs)| ((*k).to_string(), vs.iter().map(|v| json!(v)).collect())).collect(),
        }
    }

    fn combinatorial(key: &str, values: &[i64]) -> RunSpaceBlock {
        RunSpaceBlock {
            mode: BlockMode::Combinatorial,
            keys: vec![(key.to_string(), values.iter().map(|v| json!(v)).collect())],
        }
    }

    #[test]
    fn scenario_four_by_position_plus_combinatorial_expands_to_four_overlays() {
        let spec = RunSpaceSpec {
            combine: CombineMode::Combinatorial,
            blocks: vec![
                RunSpaceBlock {
                    mode: BlockMode::ByPosition,
                    keys: vec![
                        ("lr".to_string(), vec![json!(0.1), json!(0.2)]),
                        ("momentum".to_string(), vec![json!(0.9), json!(0.95)]),
                    ],
                },
                combinatorial("seed", &[1, 2]),
            ],
            max_runs: 100,
            dry_run: false,
        };
        let plan = RunSpacePlanner::plan(&spec).unwrap();
        assert_eq!(plan.overlays.len(), 4);
        assert_eq!(plan.overlays[0].context, BTreeMap::from([("lr".to_string(), json!(0.1)), ("momentum".to_string(), json!(0.9)), ("seed".to_string(), json!(1))]));
        assert_eq!(plan.overlays[1].context["seed"], json!(2));
        assert_eq!(plan.overlays[2].context["lr"], json!(0.2));
        assert_eq!(plan.overlays[3].context, BTreeMap::from([("lr".to_string(), json!(0.2)), ("momentum".to_string(), json!(0.95)), ("seed".to_string(), json!(2))]));
    }

    #[test]
    fn duplicate_keys_across_blocks_are_rejected() {
        let spec = RunSpaceSpec {
            combine: CombineMode::Combinatorial,
            blocks: vec![combinatorial("seed", &[1]), combinatorial("seed", &[2])],
            max_runs: 10,
            dry_run: false,
        };
        assert!(matches!(RunSpacePlanner::plan(&spec), Err(RunSpaceError::DuplicateContextKey(_))));
    }

    #[test]
    fn by_position_block_requires_equal_length_lists() {
        let block = by_position(&[("a", &[1, 2]), ("b", &[1])]);
        let spec = RunSpaceSpec { combine: CombineMode::Combinatorial, blocks: vec![block], max_runs: 10, dry_run: false };
        assert!(matches!(RunSpacePlanner::plan(&spec), Err(RunSpaceError::UnequalBlockLengths(_))));
    }

    #[test]
    fn max_runs_cap_is_enforced() {
        let spec = RunSpaceSpec { combine: CombineMode::Combinatorial, blocks: vec![combinatorial("seed", &[1, 2, 3])], max_runs: 2, dry_run: false };
        assert!(matches!(RunSpacePlanner::plan(&spec), Err(RunSpaceError::MaxRunsExceeded { planned: 3, max_runs: 2 })));
    }

    #[test]
    fn dry_run_flag_is_carried_through_without_affecting_expansion() {
        let spec = RunSpaceSpec { combine: CombineMode::Combinatorial, blocks: vec![combinatorial("seed", &[1, 2])], max_runs: 10, dry_run: true };
        let plan = RunSpacePlanner::plan(&spec).unwrap();
        assert!(plan.dry_run);
        assert_eq!(plan.overlays.len(), 2);
    }

    #[test]
    fn by_position_combine_requires_equal_size_block_expansions() {
        let spec = RunSpaceSpec {
            combine: CombineMode::ByPosition,
            blocks: vec![combinatorial("a", &[1, 2]), combinatorial("b", &[1, 2, 3])],
            max_runs: 10,
            dry_run: false,
        };
        assert!(matches!(RunSpacePlanner::plan(&spec), Err(RunSpaceError::UnequalCombineSizes(_))));
    }
}
