// crates/semantiva-core/src/orchestrator.rs
// ============================================================================
// Module: Orchestrator
// Description: Drives a GraphV1 end to end: pipeline_start, one NodeRuntime
//              call per node in edge order, pipeline_end, cooperative
//              cancellation on the first node error.
// Purpose: The single place that owns a run's lifecycle and aggregate summary.
// Dependencies: crate::{graph,node_runtime,ser,types,contract}
// ============================================================================

//! ## Overview
//! [`Orchestrator::run`] is a template method: `pipeline_start` is emitted
//! once, then [`crate::node_runtime::NodeRuntime::execute`] runs for each
//! node in `edges` order, then `pipeline_end` is emitted with the aggregate
//! [`crate::ser::PipelineSummary`]. [`Executor`] and [`Transport`] are the
//! two seams a host implements; `semantiva-runtime` supplies the default
//! sequential, in-memory pair. Every node's resulting payload is handed to
//! the next node exclusively through [`Transport::publish`]/[`Transport::receive`]
//! on a channel keyed by the publishing node's `node_uuid`; a node declaring
//! a `derive` block additionally runs through [`crate::derive::expand`] before
//! that hand-off, once per swept parameter overlay.
//!
//! Invariants:
//! - Once a node's status is anything but `succeeded`, [`ContinuePolicy::Abort`]
//!   (the default) marks every remaining node `cancelled` without invoking it.
//! - `pipeline_end` is always emitted, even when the run was aborted early.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use serde_json::Value;
use serde_json::json;

use crate::contract::Processor;
use crate::contract::ProcessorError;
use crate::contract::ProcessorOutput;
use crate::contract::ProcessorRegistry;
use crate::context::ContextDelta;
use crate::derive::DeriveError;
use crate::graph::GraphNode;
use crate::graph::GraphV1;
use crate::node_runtime::NodeExecutionContext;
use crate::node_runtime::NodeRuntime;
use crate::ser::Clock;
use crate::ser::EnvironmentPins;
use crate::ser::NodeStatus;
use crate::ser::PipelineEndRecord;
use crate::ser::PipelineStartRecord;
use crate::ser::PipelineSummary;
use crate::ser::SerEmitter;
use crate::ser::SerRecord;
use crate::ser::TraceRecordBody;
use crate::ser::TraceSinkError;
use crate::types::DataType;
use crate::types::DataValue;
use crate::types::Payload;

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// A cooperative cancellation flag shared between the orchestrator and the
/// executor running the current node.
#[derive(Clone, Default)]
pub struct CancellationToken {
    /// Set once cancellation has been requested.
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SECTION: Node Call & Executor
// ============================================================================

/// An opaque, once-callable unit of processor invocation, submitted to an
/// [`Executor`]. Returns the processor's output alongside the context delta
/// its bound observer accumulated.
pub struct NodeCall<'a> {
    /// The closure performing the actual invocation.
    inner: Box<dyn FnOnce() -> Result<(ProcessorOutput, ContextDelta), ProcessorError> + Send + 'a>,
}

impl<'a> NodeCall<'a> {
    /// Wraps `f` as a submittable node call.
    pub fn new(f: impl FnOnce() -> Result<(ProcessorOutput, ContextDelta), ProcessorError> + Send + 'a) -> Self {
        Self { inner: Box::new(f) }
    }

    /// Runs the wrapped closure, consuming the call.
    pub(crate) fn call(self) -> Result<(ProcessorOutput, ContextDelta), ProcessorError> {
        (self.inner)()
    }
}

/// Errors an [`Executor`] may report in addition to the processor's own.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The processor's business logic (or its context mutation) failed.
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// The call was cancelled before or during execution.
    #[error("node execution was cancelled")]
    Cancelled,
    /// The call did not complete within the executor's timeout.
    #[error("node execution timed out")]
    TimedOut,
}

/// Runs a single [`NodeCall`] to completion, honoring cooperative cancellation
/// and an optional timeout.
///
/// A default sequential, synchronous implementation is provided by
/// `semantiva-runtime`; a host may substitute a pooled or async executor
/// without changing [`NodeRuntime`].
pub trait Executor: Send + Sync {
    /// Submits `call` and blocks until it completes, is cancelled via
    /// `cancellation`, or times out.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] on processor failure, cancellation, or timeout.
    fn submit_and_wait(&self, call: NodeCall<'_>, cancellation: &CancellationToken) -> Result<(ProcessorOutput, ContextDelta), ExecutorError>;
}

// ============================================================================
// SECTION: Transport
// ============================================================================

/// Errors raised while handing a payload between nodes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel has no payload available to receive.
    #[error("transport channel {0:?} is empty")]
    ChannelEmpty(String),
}

/// Hands a [`Payload`] from one node's completion to the next node's start.
///
/// The default in-memory FIFO transport (`semantiva-runtime`) is a same-process
/// hand-off; a host may substitute a queue-backed transport for distributed
/// execution without changing [`Orchestrator`].
pub trait Transport: Send + Sync {
    /// Publishes `payload` on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the transport cannot accept the payload.
    fn publish(&self, channel: &str, payload: Payload) -> Result<(), TransportError>;

    /// Receives the payload most recently published on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ChannelEmpty`] if nothing has been published.
    fn receive(&self, channel: &str) -> Result<Payload, TransportError>;
}

// ============================================================================
// SECTION: Continuation Policy
// ============================================================================

/// Governs what happens to the remaining nodes once one node's status is not
/// `succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuePolicy {
    /// Abort: every remaining node is marked `cancelled` without being
    /// invoked. The default.
    #[default]
    Abort,
    /// Continue past the failure, but still mark the remainder `cancelled`
    /// rather than running them against a payload that never recovered.
    /// Distinguished from `Abort` only in that it emits an explicit SER for
    /// every skipped node rather than a single truncated run.
    EmitCancelled,
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Errors raised while driving a pipeline run end to end.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A lifecycle record could not be written to the trace sink.
    #[error(transparent)]
    Trace(#[from] TraceSinkError),
    /// A payload could not be handed off between two nodes.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A node's `derive` block could not be expanded into overlays.
    #[error(transparent)]
    Derive(#[from] DeriveError),
}

/// The outcome of a complete pipeline run.
pub struct RunReport {
    /// The final payload produced by the last executed node.
    pub payload: Payload,
    /// Every node's completed SER, in execution order.
    pub records: Vec<SerRecord>,
    /// Aggregate counts across the run.
    pub summary: PipelineSummary,
}

/// Drives one [`GraphV1`] to completion against a resolved processor set.
pub struct Orchestrator<'a> {
    /// The canonical graph being run.
    graph: &'a GraphV1,
    /// Resolved processor implementations.
    registry: &'a ProcessorRegistry,
    /// Whether unknown node-config parameters are fatal.
    strict_params: bool,
    /// What happens to the remainder of the run after a non-success node.
    continue_policy: ContinuePolicy,
}

impl<'a> Orchestrator<'a> {
    /// Builds an orchestrator for `graph`, resolving processors through `registry`.
    #[must_use]
    pub fn new(graph: &'a GraphV1, registry: &'a ProcessorRegistry, strict_params: bool, continue_policy: ContinuePolicy) -> Self {
        Self { graph, registry, strict_params, continue_policy }
    }

    /// Runs the full pipeline once, starting from `initial_payload`.
    ///
    /// Every node's output is published to `transport` on a channel keyed by
    /// that node's `node_uuid`, then received back at the top of the next
    /// node's turn; a node carrying a `derive` block is expanded through
    /// [`crate::derive::expand`] and invoked once per overlay before its
    /// result is published downstream.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when a lifecycle record cannot be
    /// written, a payload cannot be handed off through `transport`, or a
    /// `derive` block cannot be expanded. Per-node processor failures are
    /// captured as SER records, not propagated as `Err`.
    #[allow(clippy::too_many_lines, reason = "the per-node turn (receive, execute or expand-and-execute, publish) is one linear sequence best read as a single loop body")]
    pub fn run(
        &self,
        run_id: &str,
        pipeline_id: &str,
        initial_payload: Payload,
        executor: &dyn Executor,
        transport: &dyn Transport,
        emitter: &SerEmitter,
        clock: &dyn Clock,
        environment: &EnvironmentPins,
        run_space: Option<(&str, usize)>,
    ) -> Result<RunReport, OrchestratorError> {
        emitter.emit(TraceRecordBody::PipelineStart(PipelineStartRecord {
            pipeline_id: pipeline_id.to_string(),
            graph_pipeline_id: pipeline_id.to_string(),
            run_space_launch_id: run_space.map(|(id, _)| id.to_string()),
            run_space_index: run_space.map(|(_, index)| index),
            environment: environment.clone(),
        }))?;

        let cancellation = CancellationToken::new();
        let mut payload = initial_payload;
        let mut records = Vec::with_capacity(self.graph.nodes.len());
        let mut summary = PipelineSummary::default();
        let mut aborted = false;

        for (index, node) in self.graph.nodes.iter().enumerate() {
            let upstream = if index == 0 { None } else { Some(self.graph.nodes[index - 1].uuid.to_string()) };

            if aborted {
                let cancelled = NodeRuntime::cancelled(run_id, pipeline_id, node, upstream.as_deref(), environment, clock);
                Self::accumulate(&mut summary, cancelled.status);
                emitter.emit(TraceRecordBody::Ser(cancelled.clone()))?;
                records.push(cancelled);
                continue;
            }

            if let Some(channel) = upstream.as_deref() {
                payload = transport.receive(channel)?;
            }

            let processor: Arc<dyn crate::contract::Processor> = match self.registry.resolve(&node.processor_ref) {
                Ok(processor) => processor,
                Err(_) => {
                    // Unreachable for a graph built by `GraphBuilder`, whose
                    // `build` already validated every processor reference
                    // against this same registry.
                    aborted = true;
                    let cancelled = NodeRuntime::cancelled(run_id, pipeline_id, node, upstream.as_deref(), environment, clock);
                    Self::accumulate(&mut summary, cancelled.status);
                    emitter.emit(TraceRecordBody::Ser(cancelled.clone()))?;
                    records.push(cancelled);
                    continue;
                }
            };

            let turn = if let Some(block) = &node.derive {
                Self::run_derive_turn(
                    run_id,
                    pipeline_id,
                    node,
                    block,
                    upstream.as_deref(),
                    &processor,
                    self.strict_params,
                    environment,
                    clock,
                    &payload,
                    executor,
                    &cancellation,
                    &mut summary,
                    &mut records,
                    emitter,
                )?
            } else {
                let ctx = NodeExecutionContext {
                    run_id,
                    pipeline_id,
                    node,
                    upstream: upstream.as_deref(),
                    processor,
                    strict_params: self.strict_params,
                    environment,
                    clock,
                };
                let result = NodeRuntime::execute(&ctx, payload.clone(), executor, &cancellation);
                Self::accumulate(&mut summary, result.ser.status);
                emitter.emit(TraceRecordBody::Ser(result.ser.clone()))?;
                records.push(result.ser.clone());
                matches!(result.ser.status, NodeStatus::Succeeded).then_some(result.payload)
            };

            let Some(outcome_payload) = turn else {
                aborted = true;
                if self.continue_policy == ContinuePolicy::Abort {
                    cancellation.cancel();
                }
                continue;
            };

            transport.publish(&node.uuid.to_string(), outcome_payload.clone())?;
            payload = outcome_payload;
        }

        emitter.emit(TraceRecordBody::PipelineEnd(PipelineEndRecord {
            pipeline_id: pipeline_id.to_string(),
            summary: summary.clone(),
        }))?;

        Ok(RunReport { payload, records, summary })
    }

    /// Runs one `derive`-bearing node once per expanded parameter overlay,
    /// returning the payload to hand downstream, or `None` if any overlay
    /// failed.
    ///
    /// When `block.broadcast` is set, every overlay's output value is folded
    /// into a single `Collection<...>`-typed payload for a downstream
    /// collection-consuming node. Otherwise the last overlay's native-typed
    /// payload is forwarded; true per-overlay fan-out to distinct downstream
    /// nodes has no representation in this graph's linear edge model.
    #[allow(clippy::too_many_arguments, reason = "every derive-overlay turn needs the same fixed inputs as a plain node turn, plus the derive block itself")]
    fn run_derive_turn(
        run_id: &str,
        pipeline_id: &str,
        node: &GraphNode,
        block: &crate::derive::DeriveBlock,
        upstream: Option<&str>,
        processor: &Arc<dyn Processor>,
        strict_params: bool,
        environment: &EnvironmentPins,
        clock: &dyn Clock,
        payload: &Payload,
        executor: &dyn Executor,
        cancellation: &CancellationToken,
        summary: &mut PipelineSummary,
        records: &mut Vec<SerRecord>,
        emitter: &SerEmitter,
    ) -> Result<Option<Payload>, OrchestratorError> {
        let overlays = crate::derive::expand(block)?;
        let mut overlay_outputs = Vec::with_capacity(overlays.len());
        let mut last_payload = payload.clone();

        for overlay in &overlays {
            let mut overlay_params = node.params.clone();
            overlay_params.extend(overlay.iter().map(|(key, value)| (key.clone(), value.clone())));
            let overlay_node = GraphNode { params: overlay_params, ..node.clone() };

            let ctx = NodeExecutionContext {
                run_id,
                pipeline_id,
                node: &overlay_node,
                upstream,
                processor: Arc::clone(processor),
                strict_params,
                environment,
                clock,
            };
            let result = NodeRuntime::execute(&ctx, payload.clone(), executor, cancellation);
            Self::accumulate(summary, result.ser.status);
            emitter.emit(TraceRecordBody::Ser(result.ser.clone()))?;
            records.push(result.ser.clone());

            if !matches!(result.ser.status, NodeStatus::Succeeded) {
                return Ok(None);
            }

            overlay_outputs.push(result.payload.data.value().cloned().unwrap_or(Value::Null));
            last_payload = result.payload;
        }

        if block.broadcast {
            let element_name = processor.output_data_type().map_or_else(|| "Value".to_string(), |data_type| data_type.name().to_string());
            last_payload.data = DataValue::Typed {
                data_type: DataType::new(format!("Collection<{element_name}>"), std::iter::empty()),
                value: json!(overlay_outputs),
            };
        }

        Ok(Some(last_payload))
    }

    /// Folds one node's terminal status into the running aggregate.
    fn accumulate(summary: &mut PipelineSummary, status: NodeStatus) {
        match status {
            NodeStatus::Succeeded => summary.succeeded += 1,
            NodeStatus::Error => summary.error += 1,
            NodeStatus::Skipped => summary.skipped += 1,
            NodeStatus::Cancelled => summary.cancelled += 1,
        }
    }
}
