// crates/semantiva-core/tests/scenarios.rs
// ============================================================================
// Module: Scenario Integration Tests
// Description: End-to-end coverage of the concrete execution/evidence
//              scenarios a host embedding this crate must satisfy.
// Purpose: Exercise api::inspect/run against small, purpose-built processors
//          rather than unit-testing each collaborator in isolation.
// ============================================================================

//! Scenario-level tests built directly against the public API surface.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use serde_json::json;

use semantiva_core::api;
use semantiva_core::context::ContextType;
use semantiva_core::context::ValidatingContextObserver;
use semantiva_core::contract::ParameterDescriptor;
use semantiva_core::contract::Processor;
use semantiva_core::contract::ProcessorError;
use semantiva_core::contract::ProcessorKind;
use semantiva_core::contract::ProcessorOutput;
use semantiva_core::contract::ProcessorRegistry;
use semantiva_core::error::PipelineError;
use semantiva_core::graph::GraphError;
use semantiva_core::graph::GraphNode;
use semantiva_core::graph::RawNodeSpec;
use semantiva_core::graph::RawPipelineSpec;
use semantiva_core::node_runtime::NodeExecutionContext;
use semantiva_core::node_runtime::NodeRuntime;
use semantiva_core::orchestrator::CancellationToken;
use semantiva_core::orchestrator::ContinuePolicy;
use semantiva_core::orchestrator::Executor;
use semantiva_core::orchestrator::ExecutorError;
use semantiva_core::orchestrator::NodeCall;
use semantiva_core::orchestrator::Transport;
use semantiva_core::orchestrator::TransportError;
use semantiva_core::resolver::ParameterSource;
use semantiva_core::ser::Clock;
use semantiva_core::ser::ClockSample;
use semantiva_core::ser::NodeStatus;
use semantiva_core::ser::TraceRecord;
use semantiva_core::ser::TraceRecordBody;
use semantiva_core::ser::TraceSink;
use semantiva_core::ser::TraceSinkError;
use semantiva_core::types::DataType;
use semantiva_core::types::DataValue;
use semantiva_core::types::Payload;
use std::collections::HashMap;

// ============================================================================
// SECTION: Shared test collaborators
// ============================================================================

struct FixedClock;
impl Clock for FixedClock {
    fn now(&self) -> ClockSample {
        ClockSample { utc_rfc3339: "2026-07-31T00:00:00Z".to_string(), monotonic_ms: 0 }
    }
}

struct SequentialExecutor;
impl Executor for SequentialExecutor {
    fn submit_and_wait(&self, call: NodeCall<'_>, _cancellation: &CancellationToken) -> Result<(ProcessorOutput, semantiva_core::context::ContextDelta), ExecutorError> {
        call.call().map_err(ExecutorError::from)
    }
}

struct RecordingSink {
    records: Mutex<Vec<TraceRecord>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self { records: Mutex::new(Vec::new()) }
    }

    fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl TraceSink for RecordingSink {
    fn write(&self, record: &TraceRecord) -> Result<(), TraceSinkError> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(record.clone());
        Ok(())
    }
}

struct NullTransport {
    slots: Mutex<HashMap<String, Payload>>,
}

impl NullTransport {
    fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }
}

impl Transport for NullTransport {
    fn publish(&self, channel: &str, payload: Payload) -> Result<(), TransportError> {
        self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(channel.to_string(), payload);
        Ok(())
    }

    fn receive(&self, channel: &str) -> Result<Payload, TransportError> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(channel)
            .ok_or_else(|| TransportError::ChannelEmpty(channel.to_string()))
    }
}

/// A `DataSource` emitting a fixed `value` parameter as `Number` data.
struct ValueSource;
impl Processor for ValueSource {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataSource
    }
    fn processor_ref(&self) -> &str {
        "test.ValueSource"
    }
    fn input_data_type(&self) -> Option<DataType> {
        None
    }
    fn output_data_type(&self) -> Option<DataType> {
        Some(DataType::leaf("Number"))
    }
    fn created_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn suppressed_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        static DESCRIPTORS: std::sync::OnceLock<Vec<ParameterDescriptor>> = std::sync::OnceLock::new();
        DESCRIPTORS.get_or_init(|| vec![ParameterDescriptor::required("value")])
    }
    fn invoke(&self, _data: &DataValue, params: &BTreeMap<String, Value>, _observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        Ok(ProcessorOutput::Data(DataValue::Typed { data_type: DataType::leaf("Number"), value }))
    }
}

/// A `DataOperation` adding its `addend` parameter to the incoming number.
struct AddConst;
impl Processor for AddConst {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataOperation
    }
    fn processor_ref(&self) -> &str {
        "test.AddConst"
    }
    fn input_data_type(&self) -> Option<DataType> {
        Some(DataType::leaf("Number"))
    }
    fn output_data_type(&self) -> Option<DataType> {
        Some(DataType::leaf("Number"))
    }
    fn created_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn suppressed_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        static DESCRIPTORS: std::sync::OnceLock<Vec<ParameterDescriptor>> = std::sync::OnceLock::new();
        DESCRIPTORS.get_or_init(|| vec![ParameterDescriptor::with_default("addend", json!(0.0))])
    }
    fn invoke(&self, data: &DataValue, params: &BTreeMap<String, Value>, _observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
        let n = data.value().and_then(Value::as_f64).unwrap_or(0.0);
        let addend = params.get("addend").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(ProcessorOutput::Data(DataValue::Typed { data_type: DataType::leaf("Number"), value: json!(n + addend) }))
    }
}

/// A `DataProbe` writing the incoming number verbatim to its `context_key`.
struct CollectProbe;
impl Processor for CollectProbe {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataProbe
    }
    fn processor_ref(&self) -> &str {
        "test.CollectProbe"
    }
    fn input_data_type(&self) -> Option<DataType> {
        Some(DataType::leaf("Number"))
    }
    fn output_data_type(&self) -> Option<DataType> {
        None
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
    fn invoke(&self, data: &DataValue, _params: &BTreeMap<String, Value>, _observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
        Ok(ProcessorOutput::ProbeValue(data.value().cloned().unwrap_or(Value::Null)))
    }
}

/// A `ContextProcessor` that always writes a key it never declared.
struct RogueWriter;
impl Processor for RogueWriter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ContextProcessor
    }
    fn processor_ref(&self) -> &str {
        "test.RogueWriter"
    }
    fn input_data_type(&self) -> Option<DataType> {
        None
    }
    fn output_data_type(&self) -> Option<DataType> {
        None
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
    fn invoke(&self, _data: &DataValue, _params: &BTreeMap<String, Value>, observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
        observer.notify_update("unexpected", json!(true))?;
        Ok(ProcessorOutput::None)
    }
}

fn node(processor: &str, parameters: BTreeMap<String, Value>, context_key: Option<&str>) -> RawNodeSpec {
    RawNodeSpec { processor: processor.to_string(), role: None, parameters, context_key: context_key.map(str::to_string), derive: None }
}

// ============================================================================
// SECTION: Scenario 1 — three-node linear run
// ============================================================================

#[test]
fn scenario_one_three_node_linear_run_produces_expected_data_and_context() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(ValueSource)).unwrap();
    registry.register(Arc::new(AddConst)).unwrap();
    registry.register(Arc::new(CollectProbe)).unwrap();

    let spec = RawPipelineSpec {
        nodes: vec![
            node("test.ValueSource", BTreeMap::from([("value".to_string(), json!(1.0))]), None),
            node("test.AddConst", BTreeMap::from([("addend".to_string(), json!(2.0))]), None),
            node("test.CollectProbe", BTreeMap::new(), Some("result")),
        ],
    };

    let executor = SequentialExecutor;
    let transport = NullTransport::new();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock);
    let sink = Arc::new(RecordingSink::new());

    let result = api::run(&spec, &registry, ContextType::new(), &executor, &transport, clock, sink.clone(), false, ContinuePolicy::Abort, "0.1.0").unwrap();

    assert_eq!(result.report.summary.succeeded, 3);
    assert_eq!(result.report.summary.error, 0);
    assert_eq!(result.report.payload.data.value(), Some(&json!(3.0)));
    assert_eq!(result.report.payload.context.get("result"), Some(&json!(3.0)));

    let probe_ser = result.report.records.last().unwrap();
    assert_eq!(probe_ser.status, NodeStatus::Succeeded);
    assert_eq!(probe_ser.context_delta.created_keys, vec!["result".to_string()]);

    let pipeline_end_summary = sink.records().into_iter().rev().find_map(|record| match record.body {
        TraceRecordBody::PipelineEnd(end) => Some(end.summary.succeeded),
        _ => None,
    });
    assert_eq!(pipeline_end_summary, Some(3));
}

// ============================================================================
// SECTION: Scenario 2 — probe missing context_key
// ============================================================================

#[test]
fn scenario_two_probe_without_context_key_is_rejected_before_any_run() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(CollectProbe)).unwrap();

    let spec = RawPipelineSpec { nodes: vec![node("test.CollectProbe", BTreeMap::new(), None)] };

    let err = api::inspect(&spec, &registry).unwrap_err();
    match err {
        PipelineError::Graph(GraphError::ProbeMissingContextKey(index)) => assert_eq!(index, 0),
        other => panic!("expected ProbeMissingContextKey, got {other:?}"),
    }
}

#[test]
fn scenario_two_probe_without_context_key_also_rejects_multi_node_pipelines_at_the_right_index() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(ValueSource)).unwrap();
    registry.register(Arc::new(CollectProbe)).unwrap();

    let spec = RawPipelineSpec {
        nodes: vec![
            node("test.ValueSource", BTreeMap::from([("value".to_string(), json!(1.0))]), None),
            node("test.CollectProbe", BTreeMap::new(), None),
        ],
    };

    let err = api::inspect(&spec, &registry).unwrap_err();
    match err {
        PipelineError::Graph(GraphError::ProbeMissingContextKey(index)) => assert_eq!(index, 1),
        other => panic!("expected ProbeMissingContextKey, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Scenario 3 — parameter precedence (node over context over default)
// ============================================================================

#[test]
fn scenario_three_node_config_wins_over_context_and_default_and_is_recorded_as_such() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(ValueSource)).unwrap();
    registry.register(Arc::new(AddConst)).unwrap();

    let spec = RawPipelineSpec {
        nodes: vec![
            node("test.ValueSource", BTreeMap::from([("value".to_string(), json!(10.0))]), None),
            node("test.AddConst", BTreeMap::from([("addend".to_string(), json!(5.0))]), None),
        ],
    };

    let executor = SequentialExecutor;
    let transport = NullTransport::new();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock);
    let sink: Arc<dyn TraceSink> = Arc::new(RecordingSink::new());
    let initial_context = ContextType::from_entries(vec![("addend".to_string(), json!(99.0))]);

    let result = api::run(&spec, &registry, initial_context, &executor, &transport, clock, sink, false, ContinuePolicy::Abort, "0.1.0").unwrap();

    assert_eq!(result.report.summary.succeeded, 2);
    assert_eq!(result.report.payload.data.value(), Some(&json!(15.0)));

    let add_const_ser = &result.report.records[1];
    assert_eq!(add_const_ser.processor.parameters.get("addend"), Some(&json!(5.0)));
    assert_eq!(add_const_ser.processor.parameter_sources.get("addend"), Some(&ParameterSource::Node));
}

// ============================================================================
// SECTION: Scenario 5 — undeclared context write cascades to cancellation
// ============================================================================

#[test]
fn scenario_five_undeclared_context_write_cascades_into_cancellation_of_later_nodes() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(RogueWriter)).unwrap();
    registry.register(Arc::new(ValueSource)).unwrap();

    let spec = RawPipelineSpec {
        nodes: vec![
            node("test.RogueWriter", BTreeMap::new(), None),
            node("test.ValueSource", BTreeMap::from([("value".to_string(), json!(1.0))]), None),
        ],
    };

    let executor = SequentialExecutor;
    let transport = NullTransport::new();
    let clock: Arc<dyn Clock> = Arc::new(FixedClock);
    let sink: Arc<dyn TraceSink> = Arc::new(RecordingSink::new());

    let result = api::run(&spec, &registry, ContextType::new(), &executor, &transport, clock, sink, false, ContinuePolicy::Abort, "0.1.0").unwrap();

    assert_eq!(result.report.records.len(), 2);
    let first = &result.report.records[0];
    assert_eq!(first.status, NodeStatus::Error);
    assert_eq!(first.error.as_ref().map(|e| e.error_type.as_str()), Some("InvalidContextKey"));
    let writes_realized = first.assertions.postconditions.iter().find(|a| a.name == "context_writes_realized").unwrap();
    assert!(matches!(writes_realized.outcome, semantiva_core::ser::CheckOutcome::Fail));
    let missing_keys = writes_realized.detail.as_ref().and_then(|d| d.get("missing_keys")).unwrap();
    assert!(missing_keys.as_array().unwrap().iter().any(|k| k.as_str() == Some("unexpected")));

    let second = &result.report.records[1];
    assert_eq!(second.status, NodeStatus::Cancelled);
    assert_eq!(result.report.summary.error, 1);
    assert_eq!(result.report.summary.cancelled, 1);
}

// ============================================================================
// SECTION: Scenario 6 — type incompatibility between adjacent nodes
// ============================================================================

#[test]
fn scenario_six_type_incompatibility_names_the_correct_node_indices_in_a_longer_pipeline() {
    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(ValueSource)).unwrap();
    registry.register(Arc::new(AddConst)).unwrap();

    struct StringSink;
    impl Processor for StringSink {
        fn kind(&self) -> ProcessorKind {
            ProcessorKind::DataSink
        }
        fn processor_ref(&self) -> &str {
            "test.StringSink"
        }
        fn input_data_type(&self) -> Option<DataType> {
            Some(DataType::leaf("String"))
        }
        fn output_data_type(&self) -> Option<DataType> {
            None
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
        fn invoke(&self, _data: &DataValue, _params: &BTreeMap<String, Value>, _observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
            Ok(ProcessorOutput::None)
        }
    }
    registry.register(Arc::new(StringSink)).unwrap();

    // Three nodes: the incompatible pair sits at indices (1, 2), not (0, 1),
    // so a hardcoded-index regression would misreport this.
    let spec = RawPipelineSpec {
        nodes: vec![
            node("test.ValueSource", BTreeMap::from([("value".to_string(), json!(1.0))]), None),
            node("test.AddConst", BTreeMap::new(), None),
            node("test.StringSink", BTreeMap::new(), None),
        ],
    };

    let err = api::inspect(&spec, &registry).unwrap_err();
    match err {
        PipelineError::Graph(GraphError::TypeIncompatibility { upstream, downstream }) => {
            assert_eq!(upstream, 1);
            assert_eq!(downstream, 2);
        }
        other => panic!("expected TypeIncompatibility, got {other:?}"),
    }
}

#[test]
fn scenario_six_runtime_without_inspection_still_fails_at_input_type_ok() {
    // Bypasses GraphBuilder entirely: a node whose declared input type does
    // not match the payload it is handed must still fail at the precondition
    // gate rather than invoking the processor.
    let processor: Arc<dyn Processor> = Arc::new(AddConst);
    let node = GraphNode {
        uuid: uuid::Uuid::nil(),
        role: "add".to_string(),
        processor_ref: "test.AddConst".to_string(),
        params: BTreeMap::new(),
        ports: vec!["in:Number".to_string(), "out:Number".to_string()],
        node_semantic_id: "unused".to_string(),
        context_key: None,
        derive: None,
    };
    let environment = semantiva_core::ser::EnvironmentPins { runtime_version: "test".to_string(), platform: "test".to_string(), framework_version: "test".to_string() };
    let clock = FixedClock;
    let ctx = NodeExecutionContext { run_id: "run-1", pipeline_id: "plid-1", node: &node, upstream: None, processor, strict_params: false, environment: &environment, clock: &clock };

    let payload = semantiva_core::types::Payload { data: DataValue::Typed { data_type: DataType::leaf("String"), value: json!("not a number") }, context: ContextType::new() };
    let executor = SequentialExecutor;
    let cancellation = CancellationToken::new();
    let result = NodeRuntime::execute(&ctx, payload, &executor, &cancellation);

    assert_eq!(result.ser.status, NodeStatus::Error);
    assert_eq!(result.ser.error.as_ref().map(|e| e.error_type.as_str()), Some("TypeIncompatibilityError"));
    let input_ok = result.ser.assertions.preconditions.iter().find(|a| a.name == "input_type_ok").unwrap();
    assert!(matches!(input_ok.outcome, semantiva_core::ser::CheckOutcome::Fail));
}
