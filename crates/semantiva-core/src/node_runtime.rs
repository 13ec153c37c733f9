// crates/semantiva-core/src/node_runtime.rs
// ============================================================================
// Module: Node Runtime
// Description: Executes a single node end-to-end: type gate, parameter
//              resolution, observer attachment, processor invocation,
//              context delta capture, assertion emission.
// Purpose: Implement the fixed per-node execution sequence exactly once,
//          shared by every orchestrator run.
// Dependencies: crate::{assertions,context,contract,graph,orchestrator,resolver,ser,types}
// ============================================================================

//! ## Overview
//! [`NodeRuntime::execute`] never returns an `Err`: every failure mode (type
//! mismatch, unresolved parameter, processor error, undeclared context
//! write, cancellation) is captured into the returned [`NodeExecutionResult`]
//! as a SER `status`, not propagated. This mirrors the SER contract, where
//! every node produces exactly one record regardless of outcome.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::assertions;
use crate::context::ContextDelta;
use crate::context::ValidatingContextObserver;
use crate::contract::Processor;
use crate::contract::ProcessorError;
use crate::contract::ProcessorKind;
use crate::contract::ProcessorOutput;
use crate::graph::GraphNode;
use crate::orchestrator::CancellationToken;
use crate::orchestrator::Executor;
use crate::orchestrator::ExecutorError;
use crate::orchestrator::NodeCall;
use crate::resolver::ParameterResolutionError;
use crate::resolver::ParameterResolver;
use crate::ser::Assertion;
use crate::ser::ClockSample;
use crate::ser::EnvironmentPins;
use crate::ser::KeySummary;
use crate::ser::NodeStatus;
use crate::ser::SerAssertions;
use crate::ser::SerContextDelta;
use crate::ser::SerDependencies;
use crate::ser::SerError;
use crate::ser::SerIdentity;
use crate::ser::SerProcessor;
use crate::ser::SerRecord;
use crate::ser::SerTiming;
use crate::types::Payload;

// ============================================================================
// SECTION: Execution Context & Result
// ============================================================================

/// Fixed inputs to a single node's execution.
pub struct NodeExecutionContext<'a> {
    /// The run this node belongs to.
    pub run_id: &'a str,
    /// The pipeline this node belongs to.
    pub pipeline_id: &'a str,
    /// The canonical node being executed.
    pub node: &'a GraphNode,
    /// `node_uuid` of the directly preceding node, absent for the first node.
    pub upstream: Option<&'a str>,
    /// The resolved processor implementation.
    pub processor: Arc<dyn Processor>,
    /// Whether unknown node-config parameters are fatal.
    pub strict_params: bool,
    /// Environment snapshot, pinned once per run.
    pub environment: &'a EnvironmentPins,
    /// Clock used for timing evidence.
    pub clock: &'a dyn crate::ser::Clock,
}

/// The outcome of executing one node.
pub struct NodeExecutionResult {
    /// The payload to hand to the next node (unchanged on failure).
    pub payload: Payload,
    /// The completed SER for this node.
    pub ser: SerRecord,
}

// ============================================================================
// SECTION: Node Runtime
// ============================================================================

/// Executes a single node end-to-end.
pub struct NodeRuntime;

impl NodeRuntime {
    /// Runs `ctx.node` against `payload`, returning the (possibly
    /// unmodified) payload and the node's completed SER.
    pub fn execute(ctx: &NodeExecutionContext<'_>, mut payload: Payload, executor: &dyn Executor, cancellation: &CancellationToken) -> NodeExecutionResult {
        let started = ctx.clock.now();

        if cancellation.is_cancelled() {
            return Self::terminal(ctx, payload, &started, NodeStatus::Cancelled, None, vec![], vec![], SerContextDelta::default(), &BTreeMap::new(), &BTreeMap::new());
        }

        let input_assertion = assertions::input_type_ok(ctx.processor.input_data_type().as_ref(), payload.data.data_type());
        if matches!(input_assertion.outcome, crate::ser::CheckOutcome::Fail) {
            return Self::terminal(
                ctx,
                payload,
                &started,
                NodeStatus::Error,
                Some(SerError {
                    error_type: "TypeIncompatibilityError".to_string(),
                    error_msg: "upstream output type is incompatible with this node's declared input type".to_string(),
                }),
                vec![input_assertion],
                vec![],
                SerContextDelta::default(),
                &BTreeMap::new(),
                &BTreeMap::new(),
            );
        }

        let resolution = ParameterResolver::resolve(&ctx.node.params, &payload.context, ctx.processor.parameters(), ctx.strict_params);
        let (values, sources, config_assertion, required_assertion, resolution_failure) = match resolution {
            Ok(report) => (
                report.values,
                report.sources,
                assertions::config_valid(&report.unknown_parameters),
                assertions::required_keys_present(&[]),
                None,
            ),
            Err(ParameterResolutionError::MissingRequiredParameter(name)) => (
                BTreeMap::new(),
                BTreeMap::new(),
                assertions::config_valid(&[]),
                assertions::required_keys_present(std::slice::from_ref(&name)),
                Some(("ParameterResolutionError", format!("required parameter {name:?} could not be resolved"))),
            ),
            Err(ParameterResolutionError::UnknownParameters(unknown)) => (
                BTreeMap::new(),
                BTreeMap::new(),
                assertions::config_valid(&unknown),
                assertions::required_keys_present(&[]),
                Some(("InvalidNodeParameterError", format!("unknown parameters in node configuration: {unknown:?}"))),
            ),
        };

        let preconditions = vec![input_assertion, required_assertion, config_assertion];
        if let Some((error_type, error_msg)) = resolution_failure {
            return Self::terminal(
                ctx,
                payload,
                &started,
                NodeStatus::Error,
                Some(SerError { error_type: error_type.to_string(), error_msg }),
                preconditions,
                vec![],
                SerContextDelta::default(),
                &values,
                &sources,
            );
        }

        let mut declared_created = ctx.processor.created_keys();
        let is_probe = ctx.processor.kind() == ProcessorKind::DataProbe;
        if is_probe
            && let Some(key) = &ctx.node.context_key
        {
            declared_created.insert(key.clone());
        }
        let declared_suppressed = ctx.processor.suppressed_keys();

        let invoke_result = {
            let data_in = payload.data.clone();
            let processor = Arc::clone(&ctx.processor);
            let context_key = ctx.node.context_key.clone();
            let invoke_params = values.clone();
            let mut observer = ValidatingContextObserver::new(&mut payload.context, declared_created, declared_suppressed);
            let call = NodeCall::new(move || {
                let output = processor.invoke(&data_in, &invoke_params, &mut observer)?;
                if let (ProcessorOutput::ProbeValue(value), Some(key)) = (&output, &context_key) {
                    observer.notify_update(key, value.clone())?;
                }
                let delta = observer.into_delta();
                Ok((output, delta))
            });
            executor.submit_and_wait(call, cancellation)
        };

        match invoke_result {
            Ok((output, delta)) => {
                if let ProcessorOutput::Data(new_data) = output {
                    payload.data = new_data;
                }
                let output_assertion = assertions::output_type_ok(ctx.processor.output_data_type().as_ref(), payload.data.data_type());
                let writes_assertion = assertions::context_writes_realized(&BTreeSet::new());
                Self::succeeded(ctx, payload, &started, preconditions, vec![output_assertion, writes_assertion], delta, &values, &sources)
            }
            Err(ExecutorError::Cancelled) => {
                Self::terminal(ctx, payload, &started, NodeStatus::Cancelled, None, preconditions, vec![], SerContextDelta::default(), &values, &sources)
            }
            Err(ExecutorError::TimedOut) => Self::terminal(
                ctx,
                payload,
                &started,
                NodeStatus::Cancelled,
                Some(SerError {
                    error_type: "TimeoutError".to_string(),
                    error_msg: "node execution exceeded its executor timeout".to_string(),
                }),
                preconditions,
                vec![],
                SerContextDelta::default(),
                &values,
                &sources,
            ),
            Err(ExecutorError::Processor(err)) => {
                let rejected: BTreeSet<String> = match &err {
                    ProcessorError::ContextViolation(crate::context::ContextError::InvalidContextKey(key) | crate::context::ContextError::InvalidSuppressedKey(key)) => {
                        std::iter::once(key.clone()).collect()
                    }
                    ProcessorError::InvocationFailed(_) | ProcessorError::ContextViolation(crate::context::ContextError::ObserverMissing) => BTreeSet::new(),
                };
                let output_assertion = assertions::output_type_ok(ctx.processor.output_data_type().as_ref(), None);
                let writes_assertion = assertions::context_writes_realized(&rejected);
                Self::terminal(
                    ctx,
                    payload,
                    &started,
                    NodeStatus::Error,
                    Some(SerError { error_type: err.error_type().to_string(), error_msg: err.to_string() }),
                    preconditions,
                    vec![output_assertion, writes_assertion],
                    SerContextDelta::default(),
                    &values,
                    &sources,
                )
            }
        }
    }

    /// Builds a `cancelled` SER for a node that was never invoked because an
    /// earlier node in the run already failed under [`crate::orchestrator::ContinuePolicy::Abort`].
    #[must_use]
    pub fn cancelled(run_id: &str, pipeline_id: &str, node: &GraphNode, upstream: Option<&str>, environment: &EnvironmentPins, clock: &dyn crate::ser::Clock) -> SerRecord {
        let now = clock.now();
        SerRecord {
            identity: SerIdentity { run_id: run_id.to_string(), pipeline_id: pipeline_id.to_string(), node_id: node.uuid.to_string() },
            dependencies: SerDependencies { upstream: upstream.map(str::to_string).into_iter().collect() },
            processor: SerProcessor { processor_ref: node.processor_ref.clone(), parameters: BTreeMap::new(), parameter_sources: BTreeMap::new() },
            context_delta: SerContextDelta::default(),
            assertions: SerAssertions {
                trigger: "orchestrator".to_string(),
                upstream_evidence: vec![],
                preconditions: vec![],
                postconditions: vec![],
                invariants: vec![],
                environment: environment.clone(),
                redaction_policy: "hash".to_string(),
                args: BTreeMap::new(),
            },
            timing: SerTiming { started_at: now.utc_rfc3339.clone(), finished_at: now.utc_rfc3339, wall_ms: 0, cpu_ms: None },
            status: NodeStatus::Cancelled,
            error: None,
            tags: vec![],
            summaries: BTreeMap::new(),
        }
    }

    /// Builds the success-path SER.
    #[allow(clippy::too_many_arguments, reason = "this is the single fixed record-building step every execution path funnels through")]
    fn succeeded(
        ctx: &NodeExecutionContext<'_>,
        payload: Payload,
        started: &ClockSample,
        preconditions: Vec<Assertion>,
        postconditions: Vec<Assertion>,
        delta: ContextDelta,
        values: &BTreeMap<String, serde_json::Value>,
        sources: &BTreeMap<String, crate::resolver::ParameterSource>,
    ) -> NodeExecutionResult {
        let finished = ctx.clock.now();
        let ser = SerRecord {
            identity: SerIdentity { run_id: ctx.run_id.to_string(), pipeline_id: ctx.pipeline_id.to_string(), node_id: ctx.node.uuid.to_string() },
            dependencies: SerDependencies { upstream: ctx.upstream.map(str::to_string).into_iter().collect() },
            processor: SerProcessor { processor_ref: ctx.node.processor_ref.clone(), parameters: values.clone(), parameter_sources: sources.clone() },
            context_delta: Self::delta_to_ser(&delta),
            assertions: SerAssertions {
                trigger: "orchestrator".to_string(),
                upstream_evidence: vec![],
                preconditions,
                postconditions,
                invariants: vec![],
                environment: ctx.environment.clone(),
                redaction_policy: "hash".to_string(),
                args: BTreeMap::new(),
            },
            timing: SerTiming {
                started_at: started.utc_rfc3339.clone(),
                finished_at: finished.utc_rfc3339.clone(),
                wall_ms: finished.monotonic_ms.saturating_sub(started.monotonic_ms),
                cpu_ms: None,
            },
            status: NodeStatus::Succeeded,
            error: None,
            tags: vec![],
            summaries: BTreeMap::new(),
        };
        NodeExecutionResult { payload, ser }
    }

    /// Builds a non-success SER (error or cancelled).
    #[allow(clippy::too_many_arguments, reason = "this is the single fixed record-building step every execution path funnels through")]
    fn terminal(
        ctx: &NodeExecutionContext<'_>,
        payload: Payload,
        started: &ClockSample,
        status: NodeStatus,
        error: Option<SerError>,
        preconditions: Vec<Assertion>,
        postconditions: Vec<Assertion>,
        context_delta: SerContextDelta,
        values: &BTreeMap<String, serde_json::Value>,
        sources: &BTreeMap<String, crate::resolver::ParameterSource>,
    ) -> NodeExecutionResult {
        let finished = ctx.clock.now();
        let ser = SerRecord {
            identity: SerIdentity { run_id: ctx.run_id.to_string(), pipeline_id: ctx.pipeline_id.to_string(), node_id: ctx.node.uuid.to_string() },
            dependencies: SerDependencies { upstream: ctx.upstream.map(str::to_string).into_iter().collect() },
            processor: SerProcessor { processor_ref: ctx.node.processor_ref.clone(), parameters: values.clone(), parameter_sources: sources.clone() },
            context_delta,
            assertions: SerAssertions {
                trigger: "orchestrator".to_string(),
                upstream_evidence: vec![],
                preconditions,
                postconditions,
                invariants: vec![],
                environment: ctx.environment.clone(),
                redaction_policy: "hash".to_string(),
                args: BTreeMap::new(),
            },
            timing: SerTiming {
                started_at: started.utc_rfc3339.clone(),
                finished_at: finished.utc_rfc3339.clone(),
                wall_ms: finished.monotonic_ms.saturating_sub(started.monotonic_ms),
                cpu_ms: None,
            },
            status,
            error,
            tags: vec![],
            summaries: BTreeMap::new(),
        };
        NodeExecutionResult { payload, ser }
    }

    /// Converts an internal [`ContextDelta`] into the SER schema's
    /// `context_delta`, computing a minimal per-key summary.
    fn delta_to_ser(delta: &ContextDelta) -> SerContextDelta {
        let mut key_summaries = BTreeMap::new();
        for key in delta.created_keys.iter().chain(delta.updated_keys.iter()) {
            key_summaries.insert(key.clone(), KeySummary { dtype: "unknown".to_string(), length: None, sha256: None, repr: None });
        }
        SerContextDelta {
            read_keys: delta.read_keys.clone(),
            created_keys: delta.created_keys.clone(),
            updated_keys: delta.updated_keys.clone(),
            key_summaries,
        }
    }
}
