// crates/semantiva-core/src/error.rs
// ============================================================================
// Module: Aggregate Error
// Description: The single error type returned from the crate's public API.
// Purpose: Give embedders one enum to match on, while every inner module
//          keeps its own narrowly-scoped error type.
// Dependencies: crate::{context,contract,derive,graph,identity,resolver,runspace,ser}
// ============================================================================

//! ## Overview
//! [`PipelineError`] aggregates every module error behind `#[from]`, mirroring
//! how a control-plane error type aggregates its collaborators' errors. It is
//! returned only by [`crate::api`]; [`crate::node_runtime::NodeRuntime`] never
//! returns it; per-node failures are captured as SER records instead.

use crate::context::ContextError;
use crate::contract::ProcessorError;
use crate::contract::RegistryError;
use crate::derive::DeriveError;
use crate::graph::GraphError;
use crate::identity::CanonicalizationError;
use crate::orchestrator::OrchestratorError;
use crate::resolver::ParameterResolutionError;
use crate::runspace::RunSpaceError;
use crate::ser::TraceSinkError;

/// The aggregate error type returned by [`crate::api`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A value could not be canonicalized while deriving an identity.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
    /// The declarative pipeline spec was invalid.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A processor reference could not be resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// A derive block was malformed.
    #[error(transparent)]
    Derive(#[from] DeriveError),
    /// A node's parameters could not be resolved.
    #[error(transparent)]
    ParameterResolution(#[from] ParameterResolutionError),
    /// A context mutation was rejected.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// A processor's business logic failed outside the per-node SER capture
    /// path (for example during a dry-run invocation probe).
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// The run-space spec was invalid.
    #[error(transparent)]
    RunSpace(#[from] RunSpaceError),
    /// A lifecycle or SER record could not be written.
    #[error(transparent)]
    Trace(#[from] TraceSinkError),
    /// A run could not be driven to completion.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}
