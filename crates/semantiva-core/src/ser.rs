// crates/semantiva-core/src/ser.rs
// ============================================================================
// Module: SER v1 & Trace Stream
// Description: The Semantic Execution Record schema, the TraceSink seam, and
//              the emitter that assigns monotonic seq numbers per run.
// Purpose: Give every node execution exactly one structured evidence record,
//          and every run a totally ordered lifecycle stream.
// Dependencies: serde, serde_json, crate::context, crate::resolver
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time directly; a host-supplied [`Clock`]
//! provides every timestamp recorded on a [`TraceRecord`]. [`SerEmitter`]
//! wraps a [`TraceSink`] and assigns strictly increasing `seq` values per
//! run, mirroring the teacher's single-writer-discipline sink boundary.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::resolver::ParameterSource;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// A single clock reading: wall-clock time plus a monotonic millisecond
/// counter used to compute `wall_ms` without relying on wall-clock arithmetic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockSample {
    /// RFC3339 UTC timestamp.
    pub utc_rfc3339: String,
    /// Monotonic milliseconds since an arbitrary, clock-specific epoch.
    pub monotonic_ms: u64,
}

/// Host-supplied source of time. The core itself never samples the system
/// clock; every timestamp on a [`TraceRecord`] passes through this seam.
pub trait Clock: Send + Sync {
    /// Returns the current clock reading.
    fn now(&self) -> ClockSample;
}

// ============================================================================
// SECTION: Common Header
// ============================================================================

/// Fields shared by every record in the trace stream.
#[derive(Debug, Clone, Serialize)]
pub struct TraceHeader {
    /// Schema version; always `1`.
    pub schema_version: u32,
    /// The run this record belongs to.
    pub run_id: String,
    /// UTC timestamp at which the record was produced.
    pub timestamp: String,
    /// Monotonic sequence number, strictly increasing within a run.
    pub seq: u64,
}

// ============================================================================
// SECTION: SER v1
// ============================================================================

/// Identity triple recorded on every SER.
#[derive(Debug, Clone, Serialize)]
pub struct SerIdentity {
    /// The run this SER belongs to.
    pub run_id: String,
    /// The pipeline this SER belongs to.
    pub pipeline_id: String,
    /// The node's `node_uuid`.
    pub node_id: String,
}

/// Upstream dependency references for a node.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SerDependencies {
    /// `node_uuid` values of nodes this node directly depends on.
    pub upstream: Vec<String>,
}

/// Processor invocation details recorded on a SER.
#[derive(Debug, Clone, Serialize)]
pub struct SerProcessor {
    /// Fully-qualified processor reference.
    #[serde(rename = "ref")]
    pub processor_ref: String,
    /// Resolved parameter values.
    pub parameters: BTreeMap<String, Value>,
    /// Provenance of each resolved parameter.
    pub parameter_sources: BTreeMap<String, ParameterSource>,
}

/// A summary of one changed context key, omitting its raw value unless
/// detail flags request a representation.
#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    /// `serde_json`-level type tag of the value (`"string"`, `"number"`, ...).
    pub dtype: String,
    /// Length, for string/array/object values; `None` for scalars.
    pub length: Option<usize>,
    /// SHA-256 of the value's canonical encoding, when `hash` detail is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// A bounded textual representation, when `repr` detail is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repr: Option<String>,
}

/// Context mutation evidence captured during a node's execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SerContextDelta {
    /// Keys read during execution.
    pub read_keys: Vec<String>,
    /// Keys newly created.
    pub created_keys: Vec<String>,
    /// Keys that already existed and were overwritten.
    pub updated_keys: Vec<String>,
    /// Per-key summaries for every changed key.
    pub key_summaries: BTreeMap<String, KeySummary>,
}

/// A single named check with a pass/fail/unknown outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The check passed.
    Pass,
    /// The check failed; `missing_keys`/detail is carried by the caller.
    Fail,
}

/// One named assertion result.
#[derive(Debug, Clone, Serialize)]
pub struct Assertion {
    /// Assertion name (e.g. `"input_type_ok"`, `"context_writes_realized"`).
    pub name: String,
    /// Outcome of the check.
    pub outcome: CheckOutcome,
    /// Additional detail, e.g. offending keys on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// A small, fixed environment snapshot, pinned once per run.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentPins {
    /// Runtime crate version string.
    pub runtime_version: String,
    /// Platform triple or OS identifier.
    pub platform: String,
    /// Framework (this crate's) version.
    pub framework_version: String,
}

/// Assertion bundle recorded on a SER.
#[derive(Debug, Clone, Serialize)]
pub struct SerAssertions {
    /// What triggered this node's execution (always `"orchestrator"` today).
    pub trigger: String,
    /// Evidence consulted from upstream nodes, if any.
    #[serde(default)]
    pub upstream_evidence: Vec<String>,
    /// Checks evaluated before processor invocation.
    pub preconditions: Vec<Assertion>,
    /// Checks evaluated after processor invocation.
    pub postconditions: Vec<Assertion>,
    /// Standing invariants re-checked for this node.
    #[serde(default)]
    pub invariants: Vec<Assertion>,
    /// Environment snapshot, pinned once per run.
    pub environment: EnvironmentPins,
    /// Redaction policy name applied to `key_summaries`/`repr`.
    pub redaction_policy: String,
    /// Arguments passed to assertion evaluation, for audit purposes.
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

/// Timing evidence for one node's execution.
#[derive(Debug, Clone, Serialize)]
pub struct SerTiming {
    /// UTC timestamp when the node started.
    pub started_at: String,
    /// UTC timestamp when the node finished.
    pub finished_at: String,
    /// Wall-clock duration in milliseconds.
    pub wall_ms: u64,
    /// CPU time in milliseconds, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_ms: Option<u64>,
}

/// A node's terminal execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node completed successfully.
    Succeeded,
    /// The node raised an error during execution.
    Error,
    /// The node was not executed (upstream short-circuit).
    Skipped,
    /// The node was cancelled before or during execution.
    Cancelled,
}

/// Error evidence recorded on a failed SER. No stack traces are carried.
#[derive(Debug, Clone, Serialize)]
pub struct SerError {
    /// The error kind name (e.g. `"InvalidContextKey"`).
    pub error_type: String,
    /// A concise, human-readable message.
    pub error_msg: String,
}

/// One node's complete Semantic Execution Record.
#[derive(Debug, Clone, Serialize)]
pub struct SerRecord {
    /// Identity triple for this record.
    pub identity: SerIdentity,
    /// Upstream dependencies.
    pub dependencies: SerDependencies,
    /// Processor invocation detail.
    pub processor: SerProcessor,
    /// Context mutation evidence.
    pub context_delta: SerContextDelta,
    /// Assertion bundle.
    pub assertions: SerAssertions,
    /// Timing evidence.
    pub timing: SerTiming,
    /// Terminal status.
    pub status: NodeStatus,
    /// Error detail, present only when `status == Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerError>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-form summaries.
    #[serde(default)]
    pub summaries: BTreeMap<String, Value>,
}

// ============================================================================
// SECTION: Lifecycle Records
// ============================================================================

/// `pipeline_start` record payload.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStartRecord {
    /// The pipeline being started.
    pub pipeline_id: String,
    /// Canonical graph reference (its own `pipeline_id`, reproduced for
    /// convenience by readers that only see lifecycle records).
    pub graph_pipeline_id: String,
    /// Run-space foreign keys, when this run is part of a run-space launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_space_launch_id: Option<String>,
    /// This run's index within its run-space, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_space_index: Option<usize>,
    /// Environment snapshot pinned for the run.
    pub environment: EnvironmentPins,
}

/// Aggregate counts recorded on `pipeline_end`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    /// Nodes that completed successfully.
    pub succeeded: u64,
    /// Nodes that raised an error.
    pub error: u64,
    /// Nodes that were skipped.
    pub skipped: u64,
    /// Nodes that were cancelled.
    pub cancelled: u64,
    /// Total wall-clock time for the run, in milliseconds.
    pub total_wall_ms: u64,
}

/// `pipeline_end` record payload.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineEndRecord {
    /// The pipeline that finished.
    pub pipeline_id: String,
    /// Aggregate node outcome counts.
    pub summary: PipelineSummary,
}

/// `run_space_start` record payload.
#[derive(Debug, Clone, Serialize)]
pub struct RunSpaceStartRecord {
    /// Identity of the run-space's declarative spec.
    pub run_space_spec_id: String,
    /// Fingerprint of external run-space inputs, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_space_inputs_id: Option<String>,
    /// Identity of this particular launch.
    pub run_space_launch_id: String,
    /// 1-based attempt counter for this launch.
    pub run_space_attempt: u32,
    /// Number of runs the plan expanded to.
    pub planned_run_count: usize,
}

/// `run_space_end` record payload.
#[derive(Debug, Clone, Serialize)]
pub struct RunSpaceEndRecord {
    /// Identity of this launch.
    pub run_space_launch_id: String,
    /// Aggregate counts across every enclosed run.
    pub summary: PipelineSummary,
}

/// The full union of records written to the trace stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum TraceRecordBody {
    /// Pipeline run started.
    PipelineStart(PipelineStartRecord),
    /// Pipeline run finished.
    PipelineEnd(PipelineEndRecord),
    /// One node's execution evidence.
    Ser(SerRecord),
    /// Run-space launch started.
    RunSpaceStart(RunSpaceStartRecord),
    /// Run-space launch finished.
    RunSpaceEnd(RunSpaceEndRecord),
}

/// A complete trace record: common header plus its typed body.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    /// Common header fields.
    #[serde(flatten)]
    pub header: TraceHeader,
    /// Record-specific payload.
    #[serde(flatten)]
    pub body: TraceRecordBody,
}

// ============================================================================
// SECTION: TraceSink
// ============================================================================

/// Errors raised while delivering a record to a [`TraceSink`].
#[derive(Debug, thiserror::Error)]
pub enum TraceSinkError {
    /// The sink failed to persist the record.
    #[error("trace sink write failed: {0}")]
    WriteFailed(String),
}

/// Destination for the ordered stream of lifecycle and SER records.
///
/// Implementations must serialize writes internally (single-writer
/// discipline); the emitter assigns `seq` before calling `write`, but a sink
/// fed by multiple emitters must still not interleave partial writes.
pub trait TraceSink: Send + Sync {
    /// Persists `record`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceSinkError`] when the record cannot be written.
    fn write(&self, record: &TraceRecord) -> Result<(), TraceSinkError>;
}

// ============================================================================
// SECTION: SER Emitter
// ============================================================================

/// Assigns monotonically increasing `seq` values for one run and forwards
/// completed records to a [`TraceSink`].
pub struct SerEmitter {
    /// The run this emitter is scoped to.
    run_id: String,
    /// Clock used to stamp the common header.
    clock: Arc<dyn Clock>,
    /// Destination sink.
    sink: Arc<dyn TraceSink>,
    /// Monotonic sequence counter, shared across clones within one run.
    seq: Arc<AtomicU64>,
    /// Serializes the assign-then-write step so `seq` ordering matches write
    /// order even under concurrent callers.
    write_lock: Arc<Mutex<()>>,
}

impl SerEmitter {
    /// Creates a new emitter scoped to `run_id`.
    #[must_use]
    pub fn new(run_id: impl Into<String>, clock: Arc<dyn Clock>, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            run_id: run_id.into(),
            clock,
            sink,
            seq: Arc::new(AtomicU64::new(0)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Emits `body`, stamping it with the next `seq` and the current clock
    /// reading, and forwards it to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`TraceSinkError`] when the sink rejects the write.
    pub fn emit(&self, body: TraceRecordBody) -> Result<TraceRecord, TraceSinkError> {
        let _guard = self.write_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let record = TraceRecord {
            header: TraceHeader {
                schema_version: 1,
                run_id: self.run_id.clone(),
                timestamp: self.clock.now().utc_rfc3339,
                seq,
            },
            body,
        };
        self.sink.write(&record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FixedClock;
    impl Clock for FixedClock {
        fn now(&self) -> ClockSample {
            ClockSample {
                utc_rfc3339: "2026-07-30T00:00:00Z".to_string(),
                monotonic_ms: 0,
            }
        }
    }

    struct CollectingSink {
        records: StdMutex<Vec<TraceRecord>>,
    }

    impl TraceSink for CollectingSink {
        fn write(&self, record: &TraceRecord) -> Result<(), TraceSinkError> {
            self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(record.clone());
            Ok(())
        }
    }

    fn environment() -> EnvironmentPins {
        EnvironmentPins {
            runtime_version: "test".to_string(),
            platform: "test".to_string(),
            framework_version: "test".to_string(),
        }
    }

    #[test]
    fn seq_is_strictly_increasing_within_a_run() {
        let sink = Arc::new(CollectingSink { records: StdMutex::new(Vec::new()) });
        let emitter = SerEmitter::new("run-1", Arc::new(FixedClock), sink);
        let first = emitter
            .emit(TraceRecordBody::PipelineStart(PipelineStartRecord {
                pipeline_id: "plid-a".to_string(),
                graph_pipeline_id: "plid-a".to_string(),
                run_space_launch_id: None,
                run_space_index: None,
                environment: environment(),
            }))
            .unwrap();
        let second = emitter
            .emit(TraceRecordBody::PipelineEnd(PipelineEndRecord {
                pipeline_id: "plid-a".to_string(),
                summary: PipelineSummary::default(),
            }))
            .unwrap();
        assert!(first.header.seq < second.header.seq);
    }
}
