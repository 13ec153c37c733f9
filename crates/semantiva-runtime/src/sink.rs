// crates/semantiva-runtime/src/sink.rs
// ============================================================================
// Module: Trace Sinks
// Description: The default TraceSink implementations: an in-memory collector
//              for tests/embedding, and a JSON Lines writer for persistence.
// Purpose: Give a host somewhere to send the trace stream without needing to
//          implement TraceSink itself for the common cases.
// Dependencies: semantiva_core::ser, serde_json, std::io
// ============================================================================

//! ## Overview
//! [`JsonlTraceSink`] writes one JSON object per line, matching the teacher's
//! log-sink discipline of a single-writer `Mutex`-guarded `Write` target.
//! [`InMemoryTraceSink`] collects records for inspection, used by the CLI's
//! `inspect`/`plan-run-space` paths and by tests.

use std::io::Write;
use std::sync::Mutex;

use semantiva_core::ser::TraceRecord;
use semantiva_core::ser::TraceSink;
use semantiva_core::ser::TraceSinkError;

// ============================================================================
// SECTION: In-Memory Sink
// ============================================================================

/// Collects every record written to it, in write order.
#[derive(Default)]
pub struct InMemoryTraceSink {
    /// Accumulated records.
    records: Mutex<Vec<TraceRecord>>,
}

impl InMemoryTraceSink {
    /// Creates an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of every record written so far, in write order.
    #[must_use]
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

impl TraceSink for InMemoryTraceSink {
    fn write(&self, record: &TraceRecord) -> Result<(), TraceSinkError> {
        self.records.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(record.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: JSON Lines Sink
// ============================================================================

/// Writes one JSON object per line to `W`, guarded by a single-writer mutex.
pub struct JsonlTraceSink<W: Write + Send> {
    /// Destination writer.
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlTraceSink<W> {
    /// Creates a sink writing to `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }
}

impl<W: Write + Send> TraceSink for JsonlTraceSink<W> {
    fn write(&self, record: &TraceRecord) -> Result<(), TraceSinkError> {
        let mut guard = self.writer.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        serde_json::to_writer(&mut *guard, record).map_err(|err| TraceSinkError::WriteFailed(err.to_string()))?;
        guard.write_all(b"\n").map_err(|err| TraceSinkError::WriteFailed(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: File Naming
// ============================================================================

/// Builds the canonical trace file name `{YYYYMMDD-HHMMSS}_{run_id}.jsonl` for
/// a run started at `started_at` (an RFC3339 UTC timestamp).
#[must_use]
pub fn trace_file_name(started_at: &str, run_id: &str) -> String {
    let compact: String = started_at.chars().filter(|c| c.is_ascii_digit()).take(14).collect();
    format!("{compact}_{run_id}.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantiva_core::ser::PipelineEndRecord;
    use semantiva_core::ser::PipelineSummary;
    use semantiva_core::ser::TraceHeader;
    use semantiva_core::ser::TraceRecordBody;

    fn sample_record() -> TraceRecord {
        TraceRecord {
            header: TraceHeader { schema_version: 1, run_id: "run-1".to_string(), timestamp: "2026-07-31T00:00:00Z".to_string(), seq: 1 },
            body: TraceRecordBody::PipelineEnd(PipelineEndRecord {
                pipeline_id: "plid-1".to_string(),
                summary: PipelineSummary::default(),
            }),
        }
    }

    #[test]
    fn in_memory_sink_preserves_write_order() {
        let sink = InMemoryTraceSink::new();
        sink.write(&sample_record()).unwrap();
        sink.write(&sample_record()).unwrap();
        assert_eq!(sink.records().len(), 2);
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_record() {
        let sink = JsonlTraceSink::new(Vec::new());
        sink.write(&sample_record()).unwrap();
        sink.write(&sample_record()).unwrap();
        let guard = sink.writer.lock().unwrap();
        let text = String::from_utf8(guard.clone()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn trace_file_name_strips_non_digits_and_appends_run_id() {
        assert_eq!(trace_file_name("2026-07-31T00:00:00Z", "run-abc"), "20260731000000_run-abc.jsonl");
    }
}
