// crates/semantiva-core/src/graph.rs
// ============================================================================
// Module: Graph Builder
// Description: Normalizes a raw spec into GraphV1 and computes PipelineId,
//              per-node node_uuid, and per-node node_semantic_id.
// Purpose: Produce the single canonical representation every other component
//          reads identities from.
// Dependencies: crate::identity, crate::contract, crate::derive, serde_json
// ============================================================================

//! ## Overview
//! [`GraphBuilder::build`] is the only place a raw declarative spec becomes a
//! [`GraphV1`]. It resolves each node's processor against a
//! [`crate::contract::ProcessorRegistry`], validates the probe/context_key
//! and adjacent-type rules from the capability contract, and derives the
//! graph's identities through [`crate::identity`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::contract::ProcessorKind;
use crate::contract::ProcessorRegistry;
use crate::derive::DeriveBlock;
use crate::derive::node_semantic_id;
use crate::identity::CanonicalizationError;
use crate::identity::node_uuid as derive_node_uuid;
use crate::identity::pipeline_id as derive_pipeline_id;

// ============================================================================
// SECTION: Raw Spec
// ============================================================================

/// One node entry in a raw, declarative pipeline spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawNodeSpec {
    /// Processor reference (FQCN or short name) resolved against the registry.
    pub processor: String,
    /// Optional logical role name; defaults to `processor` when absent.
    #[serde(default)]
    pub role: Option<String>,
    /// Node configuration parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Context key a probe node writes its value to. Required for probes.
    #[serde(default)]
    pub context_key: Option<String>,
    /// Optional parameter-sweep preprocessing block.
    #[serde(default)]
    pub derive: Option<DeriveBlock>,
}

/// A raw, declarative pipeline spec: the input to [`GraphBuilder::build`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPipelineSpec {
    /// Ordered node declarations.
    pub nodes: Vec<RawNodeSpec>,
}

// ============================================================================
// SECTION: GraphV1
// ============================================================================

/// One node in the canonical graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Deterministic per-node identifier.
    pub uuid: Uuid,
    /// Logical role name.
    pub role: String,
    /// Fully-qualified processor reference.
    pub processor_ref: String,
    /// Key-sorted node parameters.
    pub params: BTreeMap<String, Value>,
    /// Declared port names (`"in:<Type>"` / `"out:<Type>"`).
    pub ports: Vec<String>,
    /// Semantic identifier, including sanitized derive-block signature.
    pub node_semantic_id: String,
    /// Context key a probe writes its value to. Not part of `node_uuid`.
    pub context_key: Option<String>,
    /// Optional parameter-sweep preprocessing block, carried through from the
    /// raw spec so the orchestrator can expand it at execution time.
    pub derive: Option<DeriveBlock>,
}

/// The canonical, deterministic representation of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphV1 {
    /// Schema version; always `1`.
    pub version: u32,
    /// Nodes in declaration order.
    pub nodes: Vec<GraphNode>,
    /// Linear edge chain: `(upstream_index, downstream_index)` pairs.
    pub edges: Vec<(usize, usize)>,
}

/// Fields of [`GraphV1`] that participate in `PipelineId` hashing.
///
/// Intentionally excludes nothing today (edges and all node fields are
/// public per §3), but is kept as a distinct type so a future field can be
/// excluded from the identity surface without touching [`GraphV1`] itself.
#[derive(Serialize)]
struct GraphPublicFields<'g> {
    version: u32,
    nodes: &'g [GraphNode],
    edges: &'g [(usize, usize)],
}

impl GraphV1 {
    /// Computes this graph's `PipelineId`.
    ///
    /// # Errors
    ///
    /// Returns [`CanonicalizationError`] if the graph cannot be canonicalized
    /// (unreachable for graphs produced by [`GraphBuilder::build`]).
    pub fn pipeline_id(&self) -> Result<String, CanonicalizationError> {
        let public = GraphPublicFields {
            version: self.version,
            nodes: &self.nodes,
            edges: &self.edges,
        };
        derive_pipeline_id(&public)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building a graph from a raw spec.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The spec declared no nodes.
    #[error("pipeline spec must declare at least one node")]
    EmptyPipeline,
    /// A node referenced a processor not present in the registry.
    #[error("node {0}: unknown processor reference {1:?}")]
    UnknownProcessor(usize, String),
    /// A probe node did not declare a non-empty `context_key`.
    #[error("node {0}: probe nodes must declare a non-empty context_key")]
    ProbeMissingContextKey(usize),
    /// Adjacent nodes declared incompatible types.
    #[error("type incompatibility between node {upstream} (output) and node {downstream} (input)")]
    TypeIncompatibility {
        /// Index of the upstream node.
        upstream: usize,
        /// Index of the downstream node.
        downstream: usize,
    },
    /// A value could not be canonicalized while deriving an identity.
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
}

// ============================================================================
// SECTION: Graph Builder
// ============================================================================

/// Builds a [`GraphV1`] from a [`RawPipelineSpec`] and a processor registry.
pub struct GraphBuilder;

impl GraphBuilder {
    /// Normalizes `spec` into a [`GraphV1`], validating probe/context_key and
    /// adjacent-type rules along the way.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] for any spec-phase violation.
    pub fn build(spec: &RawPipelineSpec, registry: &ProcessorRegistry) -> Result<GraphV1, GraphError> {
        if spec.nodes.is_empty() {
            return Err(GraphError::EmptyPipeline);
        }

        let mut nodes = Vec::with_capacity(spec.nodes.len());
        for (index, raw) in spec.nodes.iter().enumerate() {
            let processor = registry
                .resolve(&raw.processor)
                .map_err(|_| GraphError::UnknownProcessor(index, raw.processor.clone()))?;

            if processor.kind() == ProcessorKind::DataProbe
                && raw.context_key.as_deref().unwrap_or("").is_empty()
            {
                return Err(GraphError::ProbeMissingContextKey(index));
            }

            let role = raw.role.clone().unwrap_or_else(|| raw.processor.clone());
            let params: BTreeMap<String, Value> = raw.parameters.clone();
            let ports = build_ports(processor.input_data_type().as_ref(), processor.output_data_type().as_ref());

            let uuid_fields = NodeUuidFields {
                role: &role,
                processor_ref: &raw.processor,
                params: &params,
                ports: &ports,
            };
            let uuid = derive_node_uuid(&uuid_fields)?;
            let semantic_id = node_semantic_id(&uuid, raw.derive.as_ref())?;

            nodes.push(GraphNode {
                uuid,
                role,
                processor_ref: raw.processor.clone(),
                params,
                ports,
                node_semantic_id: semantic_id,
                context_key: raw.context_key.clone(),
                derive: raw.derive.clone(),
            });
        }

        validate_adjacent_types(spec, registry)?;

        let edges = (0..nodes.len().saturating_sub(1)).map(|i| (i, i + 1)).collect();

        Ok(GraphV1 {
            version: 1,
            nodes,
            edges,
        })
    }
}

/// The subset of a node's fields that feed `node_uuid`; excludes any
/// preprocessor-derived (`derive`) material.
#[derive(Serialize)]
struct NodeUuidFields<'n> {
    role: &'n str,
    processor_ref: &'n str,
    params: &'n BTreeMap<String, Value>,
    ports: &'n [String],
}

/// Builds a deterministic port-name list from declared input/output types.
fn build_ports(input: Option<&crate::types::DataType>, output: Option<&crate::types::DataType>) -> Vec<String> {
    let mut ports = Vec::new();
    if let Some(input) = input {
        ports.push(format!("in:{}", input.name()));
    }
    if let Some(output) = output {
        ports.push(format!("out:{}", output.name()));
    }
    ports
}

/// Validates that each adjacent node pair has compatible output/input types.
fn validate_adjacent_types(spec: &RawPipelineSpec, registry: &ProcessorRegistry) -> Result<(), GraphError> {
    for (upstream_index, window) in spec.nodes.windows(2).enumerate() {
        let downstream_index = upstream_index + 1;
        let upstream = registry
            .resolve(&window[0].processor)
            .map_err(|_| GraphError::UnknownProcessor(upstream_index, window[0].processor.clone()))?;
        let downstream = registry
            .resolve(&window[1].processor)
            .map_err(|_| GraphError::UnknownProcessor(downstream_index, window[1].processor.clone()))?;

        if let (Some(out), Some(input)) = (upstream.output_data_type(), downstream.input_data_type())
            && !out.is_compatible_with(&input)
        {
            return Err(GraphError::TypeIncompatibility {
                upstream: upstream_index,
                downstream: downstream_index,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ParameterDescriptor;
    use crate::contract::Processor;
    use crate::contract::ProcessorError;
    use crate::contract::ProcessorOutput;
    use crate::types::DataType;
    use crate::types::DataValue;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct Typed {
        reference: &'static str,
        kind: ProcessorKind,
        input: Option<DataType>,
        output: Option<DataType>,
    }

    impl Processor for Typed {
        fn kind(&self) -> ProcessorKind {
            self.kind
        }
        fn processor_ref(&self) -> &str {
            self.reference
        }
        fn input_data_type(&self) -> Option<DataType> {
            self.input.clone()
        }
        fn output_data_type(&self) -> Option<DataType> {
            self.output.clone()
        }
        fn created_keys(&self) -> BTreeSet<String> {
            BTreeSet::new()
        }
        fn suppressed_keys(&self) -> BTreeSet<String> {
            BTreeSet::new()
        }
        fn parameters(&self) -> &[ParameterDescriptor] {
            &[]
        }
        fn invoke(
            &self,
            _data: &DataValue,
            _params: &BTreeMap<String, Value>,
            _observer: &mut crate::context::ValidatingContextObserver<'_>,
        ) -> Result<ProcessorOutput, ProcessorError> {
            Ok(ProcessorOutput::None)
        }
    }

    fn registry_with_linear_chain() -> ProcessorRegistry {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(Arc::new(Typed {
                reference: "demo.Source",
                kind: ProcessorKind::DataSource,
                input: None,
                output: Some(DataType::leaf("Float")),
            }))
            .unwrap();
        registry
            .register(Arc::new(Typed {
                reference: "demo.Add",
                kind: ProcessorKind::DataOperation,
                input: Some(DataType::leaf("Float")),
                output: Some(DataType::leaf("Float")),
            }))
            .unwrap();
        registry
            .register(Arc::new(Typed {
                reference: "demo.Probe",
                kind: ProcessorKind::DataProbe,
                input: Some(DataType::leaf("Float")),
                output: None,
            }))
            .unwrap();
        registry
    }

    #[test]
    fn builds_linear_graph_with_edges() {
        let registry = registry_with_linear_chain();
        let spec = RawPipelineSpec {
            nodes: vec![
                RawNodeSpec {
                    processor: "demo.Source".into(),
                    role: None,
                    parameters: BTreeMap::new(),
                    context_key: None,
                    derive: None,
                },
                RawNodeSpec {
                    processor: "demo.Add".into(),
                    role: None,
                    parameters: BTreeMap::new(),
                    context_key: None,
                    derive: None,
                },
                RawNodeSpec {
                    processor: "demo.Probe".into(),
                    role: None,
                    parameters: BTreeMap::new(),
                    context_key: Some("result".into()),
                    derive: None,
                },
            ],
        };
        let graph = GraphBuilder::build(&spec, &registry).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn probe_without_context_key_is_a_spec_error() {
        let registry = registry_with_linear_chain();
        let spec = RawPipelineSpec {
            nodes: vec![RawNodeSpec {
                processor: "demo.Probe".into(),
                role: None,
                parameters: BTreeMap::new(),
                context_key: None,
                derive: None,
            }],
        };
        let err = GraphBuilder::build(&spec, &registry).unwrap_err();
        assert!(matches!(err, GraphError::ProbeMissingContextKey(0)));
    }

    #[test]
    fn incompatible_adjacent_types_are_rejected() {
        let mut registry = registry_with_linear_chain();
        registry
            .register(Arc::new(Typed {
                reference: "demo.StringSink",
                kind: ProcessorKind::DataSink,
                input: Some(DataType::leaf("String")),
                output: None,
            }))
            .unwrap();
        let spec = RawPipelineSpec {
            nodes: vec![
                RawNodeSpec {
                    processor: "demo.Source".into(),
                    role: None,
                    parameters: BTreeMap::new(),
                    context_key: None,
                    derive: None,
                },
                RawNodeSpec {
                    processor: "demo.StringSink".into(),
                    role: None,
                    parameters: BTreeMap::new(),
                    context_key: None,
                    derive: None,
                },
            ],
        };
        let err = GraphBuilder::build(&spec, &registry).unwrap_err();
        assert!(matches!(err, GraphError::TypeIncompatibility { upstream: 0, downstream: 1 }));
    }

    #[test]
    fn pipeline_id_is_deterministic_across_rebuilds() {
        let registry = registry_with_linear_chain();
        let spec = RawPipelineSpec {
            nodes: vec![RawNodeSpec {
                processor: "demo.Source".into(),
                role: None,
                parameters: BTreeMap::new(),
                context_key: None,
                derive: None,
            }],
        };
        let graph_a = GraphBuilder::build(&spec, &registry).unwrap();
        let graph_b = GraphBuilder::build(&spec, &registry).unwrap();
        assert_eq!(graph_a.pipeline_id().unwrap(), graph_b.pipeline_id().unwrap());
    }
}
