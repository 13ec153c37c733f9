// crates/semantiva-core/src/contract.rs
// ============================================================================
// Module: Processor Capability Contract & Registry
// Description: The processor trait every node's business logic implements,
//              plus the FQCN-keyed registry the GraphBuilder resolves against.
// Purpose: Give the core a narrow, backend-agnostic seam for domain logic.
// Dependencies: serde_json, std
// ============================================================================

//! ## Overview
//! A processor never receives the context directly: [`Processor::invoke`]
//! takes `(data, params)` only. Context mutation is declared up front via
//! [`Processor::created_keys`]/[`Processor::suppressed_keys`] and applied by
//! the caller through a [`crate::context::ValidatingContextObserver`].
//!
//! Invariants:
//! - `created_keys() ∩ suppressed_keys()` should be empty (checked by
//!   [`ProcessorRegistry::register`], which only warns — see
//!   `disjoint_keys_warning`).
//! - A [`ProcessorKind::DataProbe`] processor MUST NOT declare an
//!   `output_data_type`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::context::ValidatingContextObserver;
use crate::types::DataType;
use crate::types::DataValue;

// ============================================================================
// SECTION: Processor Kind
// ============================================================================

/// The capability variant a processor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProcessorKind {
    /// Transforms typed data into typed data.
    DataOperation,
    /// Reads data and produces a single value destined for the context.
    DataProbe,
    /// Reads and mutates context only; data passes through unchanged.
    ContextProcessor,
    /// Produces data with no input.
    DataSource,
    /// Consumes data and produces nothing further downstream.
    DataSink,
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// A single formal parameter declared by a processor's invocation signature.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    /// Parameter name, as referenced in node configuration and context keys.
    pub name: String,
    /// Default value used when the parameter is absent from both node
    /// configuration and context.
    pub default: Option<Value>,
}

impl ParameterDescriptor {
    /// Declares a required parameter with no default.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// Declares an optional parameter with a default value.
    #[must_use]
    pub fn with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

// ============================================================================
// SECTION: Processor Output
// ============================================================================

/// The result of invoking a processor's business logic.
#[derive(Debug, Clone)]
pub enum ProcessorOutput {
    /// New typed data, produced by a [`ProcessorKind::DataOperation`] or
    /// [`ProcessorKind::DataSource`].
    Data(DataValue),
    /// A single probed value, to be written into context by the caller under
    /// the node's declared `context_key`.
    ProbeValue(Value),
    /// No data is produced (sinks, pure context processors).
    None,
}

// ============================================================================
// SECTION: Processor Errors
// ============================================================================

/// Errors raised from processor business logic.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The processor's invocation failed for a domain-specific reason.
    #[error("processor invocation failed: {0}")]
    InvocationFailed(String),
    /// The processor attempted a context mutation the observer rejected.
    #[error(transparent)]
    ContextViolation(#[from] crate::context::ContextError),
}

impl ProcessorError {
    /// The SER `error.error_type` name for this error, used verbatim by
    /// [`crate::node_runtime::NodeRuntime`] when building a failed SER.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvocationFailed(_) => "ProcessorError",
            Self::ContextViolation(crate::context::ContextError::InvalidContextKey(_)) => "InvalidContextKey",
            Self::ContextViolation(crate::context::ContextError::InvalidSuppressedKey(_)) => "InvalidSuppressedKey",
            Self::ContextViolation(crate::context::ContextError::ObserverMissing) => "ObserverMissing",
        }
    }
}

// ============================================================================
// SECTION: Processor Trait
// ============================================================================

/// The capability contract every processor implements.
///
/// # Errors
///
/// See [`Processor::invoke`].
pub trait Processor: Send + Sync {
    /// The capability variant this processor declares.
    fn kind(&self) -> ProcessorKind;

    /// The fully-qualified processor reference used in node configuration.
    fn processor_ref(&self) -> &str;

    /// The input data type, or `None` for sources and context processors
    /// that accept no typed input.
    fn input_data_type(&self) -> Option<DataType>;

    /// The output data type, or `None` for sinks, context processors, and
    /// probes.
    fn output_data_type(&self) -> Option<DataType>;

    /// Context keys this processor may create or update.
    fn created_keys(&self) -> BTreeSet<String>;

    /// Context keys this processor may delete.
    fn suppressed_keys(&self) -> BTreeSet<String>;

    /// The processor's formal parameter list, used by the
    /// [`crate::resolver::ParameterResolver`].
    fn parameters(&self) -> &[ParameterDescriptor];

    /// Executes the processor's business logic against resolved parameters
    /// and data. Never receives the context object directly; any context
    /// mutation is requested through `observer`, the separate mutation
    /// channel, and is validated against `created_keys`/`suppressed_keys`
    /// before it is applied.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError`] when the processor's domain logic fails, or
    /// when a requested context mutation is rejected by `observer`.
    fn invoke(
        &self,
        data: &DataValue,
        params: &BTreeMap<String, Value>,
        observer: &mut ValidatingContextObserver<'_>,
    ) -> Result<ProcessorOutput, ProcessorError>;
}

/// Returns `true` when `created` and `suppressed` overlap.
///
/// Per the capability contract, created/suppressed keys should be disjoint;
/// callers are expected to warn (not fail) on overlap.
#[must_use]
pub fn disjoint_keys_warning(created: &BTreeSet<String>, suppressed: &BTreeSet<String>) -> Option<BTreeSet<String>> {
    let overlap: BTreeSet<String> = created.intersection(suppressed).cloned().collect();
    if overlap.is_empty() { None } else { Some(overlap) }
}

// ============================================================================
// SECTION: Processor Registry
// ============================================================================

/// Errors raised while resolving a processor reference through the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No processor is registered under the given reference.
    #[error("unknown processor reference: {0}")]
    UnknownProcessor(String),
    /// A processor was already registered under the given reference.
    #[error("duplicate processor registration: {0}")]
    DuplicateRegistration(String),
}

/// FQCN-keyed registry resolving processor references to implementations.
#[derive(Default)]
pub struct ProcessorRegistry {
    /// Registered processors, keyed by `processor_ref`.
    processors: BTreeMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `processor` under its own `processor_ref`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRegistration`] if a processor is
    /// already registered under the same reference.
    pub fn register(&mut self, processor: Arc<dyn Processor>) -> Result<(), RegistryError> {
        let reference = processor.processor_ref().to_string();
        if self.processors.contains_key(&reference) {
            return Err(RegistryError::DuplicateRegistration(reference));
        }
        self.processors.insert(reference, processor);
        Ok(())
    }

    /// Resolves `processor_ref` to its registered implementation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownProcessor`] when no processor is
    /// registered under `processor_ref`.
    pub fn resolve(&self, processor_ref: &str) -> Result<Arc<dyn Processor>, RegistryError> {
        self.processors
            .get(processor_ref)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownProcessor(processor_ref.to_string()))
    }

    /// Returns whether `processor_ref` is registered.
    #[must_use]
    pub fn contains(&self, processor_ref: &str) -> bool {
        self.processors.contains_key(processor_ref)
    }
}
