// crates/semantiva-core/src/api.rs
// ============================================================================
// Module: Public API
// Description: The three programmatic entry points a host embeds against:
//              inspect, run, plan_run_space (plus run_space execution).
// Purpose: Give every caller (CLI, embedding host, tests) one narrow surface
//          rather than requiring direct use of GraphBuilder/Orchestrator/
//          RunSpacePlanner.
// Dependencies: crate::{graph,orchestrator,runspace,error,ser,types,contract,identity}
// ============================================================================

//! ## Overview
//! None of these functions read wall-clock time, spawn threads, or open
//! files: `run` and `run_run_space` take an [`crate::orchestrator::Executor`],
//! a [`crate::ser::Clock`], and a [`crate::ser::TraceSink`] as parameters,
//! all supplied by the host. `semantiva-runtime` provides the default
//! concrete implementations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::contract::ProcessorRegistry;
use crate::error::PipelineError;
use crate::graph::GraphBuilder;
use crate::graph::GraphV1;
use crate::graph::RawPipelineSpec;
use crate::identity::run_id as generate_run_id;
use crate::orchestrator::ContinuePolicy;
use crate::orchestrator::Executor;
use crate::orchestrator::Orchestrator;
use crate::orchestrator::RunReport;
use crate::orchestrator::Transport;
use crate::runspace::RunSpacePlan;
use crate::runspace::RunSpacePlanner;
use crate::runspace::RunSpaceSpec;
use crate::ser::Clock;
use crate::ser::PipelineSummary;
use crate::ser::SerEmitter;
use crate::ser::TraceRecordBody;
use crate::ser::TraceSink;
use crate::context::ContextType;
use crate::types::Payload;

// ============================================================================
// SECTION: inspect
// ============================================================================

/// Normalizes `spec` into its canonical [`GraphV1`] without running anything.
///
/// # Errors
///
/// Returns [`PipelineError`] for any spec-phase violation (unknown processor,
/// missing probe `context_key`, adjacent type incompatibility).
pub fn inspect(spec: &RawPipelineSpec, registry: &ProcessorRegistry) -> Result<GraphV1, PipelineError> {
    Ok(GraphBuilder::build(spec, registry)?)
}

// ============================================================================
// SECTION: run
// ============================================================================

/// A single pipeline run's complete, self-contained result.
pub struct PipelineRunReport {
    /// The graph the run executed.
    pub graph: GraphV1,
    /// This run's unique identifier.
    pub run_id: String,
    /// The orchestrator's report: final payload, per-node SERs, summary.
    pub report: RunReport,
}

/// Builds, then runs, `spec` once against `initial_context`.
///
/// # Errors
///
/// Returns [`PipelineError`] when the spec is invalid or a lifecycle/SER
/// record cannot be written. Per-node failures never surface here; they are
/// captured as `error`/`cancelled` SERs inside `report`.
#[allow(clippy::too_many_arguments, reason = "every collaborator the core needs is explicit at the API boundary rather than hidden in a builder")]
pub fn run(
    spec: &RawPipelineSpec,
    registry: &ProcessorRegistry,
    initial_context: ContextType,
    executor: &dyn Executor,
    transport: &dyn Transport,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TraceSink>,
    strict_params: bool,
    continue_policy: ContinuePolicy,
    runtime_version: &str,
) -> Result<PipelineRunReport, PipelineError> {
    let graph = GraphBuilder::build(spec, registry)?;
    let pipeline_id = graph.pipeline_id()?;
    let run_id = generate_run_id();
    let environment = crate::assertions::environment_pins(runtime_version);

    let emitter = SerEmitter::new(run_id.clone(), Arc::clone(&clock), sink);
    let orchestrator = Orchestrator::new(&graph, registry, strict_params, continue_policy);
    let payload = Payload::with_context(initial_context);

    let report = orchestrator.run(&run_id, &pipeline_id, payload, executor, transport, &emitter, clock.as_ref(), &environment, None)?;

    Ok(PipelineRunReport { graph, run_id, report })
}

// ============================================================================
// SECTION: plan_run_space
// ============================================================================

/// Computes the ordered plan for `run_space_spec` without executing anything.
///
/// # Errors
///
/// Returns [`PipelineError`] for any run-space spec violation.
pub fn plan_run_space(run_space_spec: &RunSpaceSpec) -> Result<RunSpacePlan, PipelineError> {
    Ok(RunSpacePlanner::plan(run_space_spec)?)
}

// ============================================================================
// SECTION: run_run_space
// ============================================================================

/// The aggregate result of executing an entire run-space launch.
pub struct RunSpaceExecutionReport {
    /// This launch's unique identifier.
    pub run_space_launch_id: String,
    /// Every enclosed pipeline run's report, in plan order.
    pub runs: Vec<PipelineRunReport>,
    /// Aggregate counts across every enclosed run.
    pub summary: PipelineSummary,
}

/// Plans, then executes, `run_space_spec` against `spec`, sharing one launch
/// identity across every enclosed pipeline run. Returns only the plan (no
/// runs are executed) when `run_space_spec.dry_run` is set.
///
/// # Errors
///
/// Returns [`PipelineError`] when the run-space spec or the pipeline spec is
/// invalid, or when a lifecycle/SER record cannot be written.
#[allow(clippy::too_many_arguments, reason = "every collaborator the core needs is explicit at the API boundary rather than hidden in a builder")]
pub fn run_run_space(
    run_space_spec: &RunSpaceSpec,
    spec: &RawPipelineSpec,
    registry: &ProcessorRegistry,
    base_context: &ContextType,
    executor: &dyn Executor,
    transport: &dyn Transport,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TraceSink>,
    strict_params: bool,
    continue_policy: ContinuePolicy,
    runtime_version: &str,
) -> Result<RunSpaceExecutionReport, PipelineError> {
    let plan = RunSpacePlanner::plan(run_space_spec)?;
    if plan.dry_run {
        return Ok(RunSpaceExecutionReport { run_space_launch_id: plan.run_space_spec_id, runs: vec![], summary: PipelineSummary::default() });
    }

    let launch_id = crate::identity::run_space_launch_id();
    let environment = crate::assertions::environment_pins(runtime_version);
    let coordinator = SerEmitter::new(launch_id.clone(), Arc::clone(&clock), Arc::clone(&sink));

    coordinator.emit(TraceRecordBody::RunSpaceStart(crate::ser::RunSpaceStartRecord {
        run_space_spec_id: plan.run_space_spec_id.clone(),
        run_space_inputs_id: None,
        run_space_launch_id: launch_id.clone(),
        run_space_attempt: 1,
        planned_run_count: plan.overlays.len(),
    }))?;

    let graph = GraphBuilder::build(spec, registry)?;
    let pipeline_id = graph.pipeline_id()?;
    let mut summary = PipelineSummary::default();
    let mut runs = Vec::with_capacity(plan.overlays.len());

    for overlay in &plan.overlays {
        let run_id = generate_run_id();
        let mut entries: Vec<(String, serde_json::Value)> = base_context.keys().filter_map(|k| base_context.get(k).map(|v| (k.to_string(), v.clone()))).collect();
        for (key, value) in &overlay.context {
            if let Some(existing) = entries.iter_mut().find(|(k, _)| k == key) {
                existing.1 = value.clone();
            } else {
                entries.push((key.clone(), value.clone()));
            }
        }
        let context = ContextType::from_entries(entries);
        let payload = Payload::with_context(context);

        let emitter = SerEmitter::new(run_id.clone(), Arc::clone(&clock), Arc::clone(&sink));
        let orchestrator = Orchestrator::new(&graph, registry, strict_params, continue_policy);
        let report = orchestrator.run(&run_id, &pipeline_id, payload, executor, transport, &emitter, clock.as_ref(), &environment, Some((&launch_id, overlay.index)))?;

        summary.succeeded += report.summary.succeeded;
        summary.error += report.summary.error;
        summary.skipped += report.summary.skipped;
        summary.cancelled += report.summary.cancelled;
        summary.total_wall_ms += report.summary.total_wall_ms;
        runs.push(PipelineRunReport { graph: graph.clone(), run_id, report });
    }

    coordinator.emit(TraceRecordBody::RunSpaceEnd(crate::ser::RunSpaceEndRecord { run_space_launch_id: launch_id.clone(), summary: summary.clone() }))?;

    Ok(RunSpaceExecutionReport { run_space_launch_id: launch_id, runs, summary })
}
