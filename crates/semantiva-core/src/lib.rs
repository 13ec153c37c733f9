// crates/semantiva-core/src/lib.rs
// ============================================================================
// Module: Crate Root
// Description: Module declarations for the execution/evidence core: graph
//              normalization, identity derivation, the processor contract,
//              context mediation, node execution, orchestration, run-space
//              planning, and the public API surface.
// Purpose: One place a host depends on for the entire core.
// Dependencies: see Cargo.toml
// ============================================================================

//! ## Overview
//! This crate normalizes a declarative pipeline spec into a canonical graph,
//! derives every identity deterministically from that graph, and drives it
//! to completion one node at a time, emitting one Semantic Execution Record
//! per node. It never touches the filesystem, the network, or the system
//! clock directly — those seams ([`ser::Clock`], [`ser::TraceSink`],
//! [`orchestrator::Executor`], [`orchestrator::Transport`]) are implemented
//! by a host, with `semantiva-runtime` providing the default set.

pub mod api;
pub mod assertions;
pub mod context;
pub mod contract;
pub mod derive;
pub mod error;
pub mod graph;
pub mod identity;
pub mod node_runtime;
pub mod orchestrator;
pub mod resolver;
pub mod runspace;
pub mod ser;
pub mod types;

pub use error::PipelineError;
