// crates/semantiva-cli/src/main.rs
// ============================================================================
// Module: Pipeline CLI Entry Point
// Description: Command dispatcher for inspect/run/plan-run-space over a
//              declarative pipeline spec file.
// Purpose: Give a host a working command line without embedding the core
//          library directly.
// Dependencies: clap, semantiva-core, semantiva-runtime, serde_json, serde_yaml, thiserror.
// ============================================================================

//! ## Overview
//! This binary never contains domain logic: it loads a spec file, resolves
//! processor references against the built-in set `semantiva-runtime` ships
//! (see [`semantiva_runtime::builtins`]), and drives the three programmatic
//! entry points `semantiva-core` exposes. Exit codes follow a fixed
//! convention: `0` success, `1` CLI misuse, `2` file error, `3`
//! configuration/validation error, `4` runtime execution error, `5`
//! cooperative interrupt (reserved; unreachable today, see `exit_code`
//! below).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use semantiva_core::PipelineError;
use semantiva_core::api;
use semantiva_core::contract::ProcessorRegistry;
use semantiva_core::contract::RegistryError;
use semantiva_core::context::ContextType;
use semantiva_core::graph::RawPipelineSpec;
use semantiva_core::orchestrator::ContinuePolicy;
use semantiva_core::runspace::RunSpaceSpec;
use semantiva_core::ser::Clock;
use semantiva_core::ser::TraceSink;
use semantiva_core::types::DataType;
use semantiva_core::types::Payload;
use semantiva_runtime::InMemoryTraceSink;
use semantiva_runtime::InMemoryTransport;
use semantiva_runtime::JsonlTraceSink;
use semantiva_runtime::SequentialExecutor;
use semantiva_runtime::SystemClock;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "semantiva", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands, mirroring the core's three programmatic entry
/// points exactly.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Normalize a spec file into its canonical graph without running it.
    Inspect(InspectArgs),
    /// Build and run a spec file once (or, with `--run-space`, once per
    /// overlay of a run-space spec).
    Run(RunArgs),
    /// Compute a run-space's ordered plan without executing anything.
    PlanRunSpace(PlanRunSpaceArgs),
}

/// Arguments for the `inspect` command.
#[derive(Args, Debug)]
struct InspectArgs {
    /// Path to a declarative pipeline spec (YAML or JSON).
    #[arg(long, value_name = "PATH")]
    spec: PathBuf,
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
struct RunArgs {
    /// Path to a declarative pipeline spec (YAML or JSON).
    #[arg(long, value_name = "PATH")]
    spec: PathBuf,
    /// Optional initial context file (a YAML or JSON mapping).
    #[arg(long, value_name = "PATH")]
    context: Option<PathBuf>,
    /// Optional run-space spec file; when given, the pipeline runs once per
    /// planned overlay instead of once.
    #[arg(long = "run-space", value_name = "PATH")]
    run_space: Option<PathBuf>,
    /// Optional path to write the JSON Lines trace stream to. Without it,
    /// the trace is collected in memory and discarded after the run.
    #[arg(long, value_name = "PATH")]
    trace: Option<PathBuf>,
    /// Treat unknown node-config parameters as a fatal spec error.
    #[arg(long = "strict-params", action = ArgAction::SetTrue)]
    strict_params: bool,
    /// Emit cancelled SERs for the remainder of the run after a node failure,
    /// instead of the default abort-on-first-error behavior.
    #[arg(long = "continue-on-error", action = ArgAction::SetTrue)]
    continue_on_error: bool,
    /// Stop after building the graph (or the run-space plan); never invoke a
    /// processor.
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
}

/// Arguments for the `plan-run-space` command.
#[derive(Args, Debug)]
struct PlanRunSpaceArgs {
    /// Path to a declarative run-space spec (YAML or JSON).
    #[arg(long = "run-space", value_name = "PATH")]
    run_space: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI-level error, carrying enough context to report a useful message and
/// pick an exit code.
#[derive(Debug, Error)]
enum CliError {
    /// A spec/context file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A trace or output file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The file that could not be written.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// A file failed to parse as YAML.
    #[error("failed to parse {path} as YAML: {source}")]
    Yaml {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        source: serde_yaml::Error,
    },
    /// A file failed to parse as JSON.
    #[error("failed to parse {path} as JSON: {source}")]
    Json {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        source: serde_json::Error,
    },
    /// A context file did not contain a mapping at its top level.
    #[error("context file {0} must contain a mapping at its top level")]
    ContextNotAMapping(PathBuf),
    /// Output could not be serialized to JSON.
    #[error("failed to serialize output: {0}")]
    Serialize(serde_json::Error),
    /// Writing to stdout/stderr failed.
    #[error("failed to write output: {0}")]
    Output(std::io::Error),
    /// A processor reference was registered more than once while assembling
    /// the built-in registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The core rejected the spec, the run, or the run-space.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    /// Maps this error to its process exit code per the CLI's documented
    /// convention. `5` (cooperative interrupt) is reserved: nothing in this
    /// binary's collaborator set (a sequential, in-process [`Executor`] with
    /// no external signal source) can produce it today; a host wiring real
    /// interrupt delivery would cancel the run's own
    /// [`semantiva_core::orchestrator::CancellationToken`] and map that
    /// outcome to this code.
    ///
    /// [`Executor`]: semantiva_core::orchestrator::Executor
    fn exit_code(&self) -> u8 {
        match self {
            Self::Read { .. } | Self::Write { .. } => 2,
            Self::Yaml { .. } | Self::Json { .. } | Self::ContextNotAMapping(_) | Self::Registry(_) => 3,
            Self::Serialize(_) | Self::Output(_) => 4,
            Self::Pipeline(err) => pipeline_error_exit_code(err),
        }
    }
}

/// Classifies a core [`PipelineError`] as a configuration/validation failure
/// (`3`) or a runtime execution failure (`4`).
fn pipeline_error_exit_code(err: &PipelineError) -> u8 {
    match err {
        PipelineError::Canonicalization(_)
        | PipelineError::Graph(_)
        | PipelineError::Registry(_)
        | PipelineError::Derive(_)
        | PipelineError::ParameterResolution(_)
        | PipelineError::RunSpace(_) => 3,
        PipelineError::Context(_) | PipelineError::Processor(_) | PipelineError::Trace(_) | PipelineError::Orchestrator(_) => 4,
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.exit_code() == 0 { ExitCode::SUCCESS } else { ExitCode::from(1) };
        }
    };

    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Dispatches the parsed command to its handler.
fn dispatch(cli: Cli) -> Result<ExitCode, CliError> {
    match cli.command {
        Commands::Inspect(args) => command_inspect(&args),
        Commands::Run(args) => command_run(&args),
        Commands::PlanRunSpace(args) => command_plan_run_space(&args),
    }
}

/// Prints `err` to stderr and returns its mapped exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let _ = write_stderr_line(&err.to_string());
    ExitCode::from(err.exit_code())
}

// ============================================================================
// SECTION: inspect
// ============================================================================

/// Executes the `inspect` command.
fn command_inspect(args: &InspectArgs) -> Result<ExitCode, CliError> {
    let spec: RawPipelineSpec = load_structured_file(&args.spec)?;
    let registry = build_registry()?;
    let graph = api::inspect(&spec, &registry)?;
    write_json(&graph)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: run
// ============================================================================

/// Executes the `run` command, dispatching to a single run or a full
/// run-space execution depending on `--run-space`.
fn command_run(args: &RunArgs) -> Result<ExitCode, CliError> {
    let spec: RawPipelineSpec = load_structured_file(&args.spec)?;
    let registry = build_registry()?;

    if args.dry_run && args.run_space.is_none() {
        let graph = api::inspect(&spec, &registry)?;
        write_json(&graph)?;
        return Ok(ExitCode::SUCCESS);
    }

    let initial_context = match &args.context {
        Some(path) => load_context_file(path)?,
        None => ContextType::new(),
    };
    let executor = SequentialExecutor::new();
    let transport = InMemoryTransport::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let sink: Arc<dyn TraceSink> = build_sink(args.trace.as_deref())?;
    let continue_policy = if args.continue_on_error { ContinuePolicy::EmitCancelled } else { ContinuePolicy::Abort };
    let runtime_version = env!("CARGO_PKG_VERSION");

    if let Some(run_space_path) = &args.run_space {
        let mut run_space_spec: RunSpaceSpec = load_structured_file(run_space_path)?;
        run_space_spec.dry_run = run_space_spec.dry_run || args.dry_run;

        let report = api::run_run_space(
            &run_space_spec,
            &spec,
            &registry,
            &initial_context,
            &executor,
            &transport,
            clock,
            sink,
            args.strict_params,
            continue_policy,
            runtime_version,
        )?;
        let failed = report.summary.error > 0;
        write_json(&run_space_report_to_json(&report))?;
        return Ok(ExitCode::from(if failed { 4 } else { 0 }));
    }

    let report = api::run(&spec, &registry, initial_context, &executor, &transport, clock, sink, args.strict_params, continue_policy, runtime_version)?;
    let failed = report.report.summary.error > 0;
    write_json(&pipeline_run_report_to_json(&report))?;
    Ok(ExitCode::from(if failed { 4 } else { 0 }))
}

/// Builds the trace sink for `run`: a JSON Lines file when `--trace` is
/// given, an in-memory sink (discarded after the process exits) otherwise.
fn build_sink(trace_path: Option<&Path>) -> Result<Arc<dyn TraceSink>, CliError> {
    match trace_path {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|source| CliError::Write { path: path.to_path_buf(), source })?;
            Ok(Arc::new(JsonlTraceSink::new(file)))
        }
        None => Ok(Arc::new(InMemoryTraceSink::new())),
    }
}

// ============================================================================
// SECTION: plan-run-space
// ============================================================================

/// Executes the `plan-run-space` command.
fn command_plan_run_space(args: &PlanRunSpaceArgs) -> Result<ExitCode, CliError> {
    let run_space_spec: RunSpaceSpec = load_structured_file(&args.run_space)?;
    let plan = api::plan_run_space(&run_space_spec)?;
    let overlays: Vec<Value> = plan.overlays.iter().map(|overlay| json!({"index": overlay.index, "context": overlay.context})).collect();
    write_json(&json!({
        "run_space_spec_id": plan.run_space_spec_id,
        "dry_run": plan.dry_run,
        "overlays": overlays,
    }))
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Builds a [`ProcessorRegistry`] with every built-in processor registered.
///
/// A host with real domain logic builds its own registry instead; this one
/// exists purely so a spec file can be run against this workspace alone.
fn build_registry() -> Result<ProcessorRegistry, CliError> {
    let mut registry = ProcessorRegistry::new();
    semantiva_runtime::builtins::register_all(&mut registry)?;
    Ok(registry)
}

// ============================================================================
// SECTION: File Loading
// ============================================================================

/// Reads and parses `path` as YAML, or as JSON when its extension is `.json`.
fn load_structured_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })?;
    if path.extension().and_then(std::ffi::OsStr::to_str) == Some("json") {
        serde_json::from_slice(&bytes).map_err(|source| CliError::Json { path: path.to_path_buf(), source })
    } else {
        serde_yaml::from_slice(&bytes).map_err(|source| CliError::Yaml { path: path.to_path_buf(), source })
    }
}

/// Loads an initial context file into a [`ContextType`].
fn load_context_file(path: &Path) -> Result<ContextType, CliError> {
    let value: Value = load_structured_file(path)?;
    let Value::Object(map) = value else {
        return Err(CliError::ContextNotAMapping(path.to_path_buf()));
    };
    Ok(ContextType::from_entries(map.into_iter().collect()))
}

// ============================================================================
// SECTION: Output Rendering
// ============================================================================

/// Serializes `value` as pretty JSON and writes it to stdout as one line.
fn write_json(value: &impl serde::Serialize) -> Result<ExitCode, CliError> {
    let text = serde_json::to_string_pretty(value).map_err(CliError::Serialize)?;
    write_stdout_line(&text)?;
    Ok(ExitCode::SUCCESS)
}

/// Renders a single pipeline run's report as JSON.
fn pipeline_run_report_to_json(report: &api::PipelineRunReport) -> Value {
    json!({
        "run_id": report.run_id,
        "graph": report.graph,
        "summary": report.report.summary,
        "records": report.report.records,
        "payload": payload_to_json(&report.report.payload),
    })
}

/// Renders a run-space launch's aggregate report as JSON.
fn run_space_report_to_json(report: &api::RunSpaceExecutionReport) -> Value {
    json!({
        "run_space_launch_id": report.run_space_launch_id,
        "summary": report.summary,
        "runs": report.runs.iter().map(pipeline_run_report_to_json).collect::<Vec<_>>(),
    })
}

/// Renders a final [`Payload`] as JSON. [`Payload`] carries no `Serialize`
/// impl of its own since its `context` is mediated exclusively through a
/// [`semantiva_core::context::ValidatingContextObserver`] during a run; this
/// is read-only rendering of the finished result, not a mutation path.
fn payload_to_json(payload: &Payload) -> Value {
    let mut context = serde_json::Map::new();
    for key in payload.context.keys() {
        if let Some(value) = payload.context.get(key) {
            context.insert(key.to_string(), value.clone());
        }
    }
    json!({
        "data_type": payload.data.data_type().map(DataType::name),
        "value": payload.data.value(),
        "context": context,
    })
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> Result<(), CliError> {
    use std::io::Write;
    writeln!(&mut std::io::stdout(), "{message}").map_err(CliError::Output)
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> Result<(), CliError> {
    use std::io::Write;
    writeln!(&mut std::io::stderr(), "{message}").map_err(CliError::Output)
}
