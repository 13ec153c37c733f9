// crates/semantiva-runtime/src/builtins.rs
// ============================================================================
// Module: Built-in Processors
// Description: A minimal processor set covering every ProcessorKind variant,
//              registered under fixed `builtin.*` references.
// Purpose: Give a host (notably semantiva-cli) something to run out of the
//          box without writing domain logic first.
// Dependencies: semantiva_core::{contract,context,types}
// ============================================================================

//! ## Overview
//! These processors carry no domain logic of their own; they exist so a spec
//! file can be built and run against this workspace alone. A host with real
//! domain logic registers its own processors instead and never needs this
//! module, the same way `decision-gate-providers` ships `time`/`env`/`json`/
//! `http` providers a deployment may or may not opt into.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use semantiva_core::context::ValidatingContextObserver;
use semantiva_core::contract::ParameterDescriptor;
use semantiva_core::contract::Processor;
use semantiva_core::contract::ProcessorError;
use semantiva_core::contract::ProcessorKind;
use semantiva_core::contract::ProcessorOutput;
use semantiva_core::contract::ProcessorRegistry;
use semantiva_core::contract::RegistryError;
use semantiva_core::types::DataType;
use semantiva_core::types::DataValue;

/// The declared type every built-in processor below produces or accepts.
/// Kept permissive (a single leaf type) since these processors carry no
/// domain-specific type discipline of their own.
fn json_type() -> DataType {
    DataType::leaf("Json")
}

// ============================================================================
// SECTION: ConstSource
// ============================================================================

/// Emits a fixed, node-configured value with no upstream input.
pub struct ConstSource {
    parameters: Vec<ParameterDescriptor>,
}

impl Default for ConstSource {
    fn default() -> Self {
        Self { parameters: vec![ParameterDescriptor::with_default("value", Value::Null)] }
    }
}

impl Processor for ConstSource {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataSource
    }
    fn processor_ref(&self) -> &str {
        "builtin.ConstSource"
    }
    fn input_data_type(&self) -> Option<DataType> {
        None
    }
    fn output_data_type(&self) -> Option<DataType> {
        Some(json_type())
    }
    fn created_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn suppressed_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &self.parameters
    }
    fn invoke(&self, _data: &DataValue, params: &BTreeMap<String, Value>, _observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        Ok(ProcessorOutput::Data(DataValue::Typed { data_type: json_type(), value }))
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Passes its input through unchanged.
#[derive(Default)]
pub struct Identity;

impl Processor for Identity {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataOperation
    }
    fn processor_ref(&self) -> &str {
        "builtin.Identity"
    }
    fn input_data_type(&self) -> Option<DataType> {
        Some(json_type())
    }
    fn output_data_type(&self) -> Option<DataType> {
        Some(json_type())
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
        Ok(ProcessorOutput::Data(data.clone()))
    }
}

// ============================================================================
// SECTION: ContextSet
// ============================================================================

/// Writes its input value into a fixed context key, leaving data unchanged.
#[derive(Default)]
pub struct ContextSet;

impl ContextSet {
    /// The single context key this processor is declared to create.
    const KEY: &'static str = "note";
}

impl Processor for ContextSet {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::ContextProcessor
    }
    fn processor_ref(&self) -> &str {
        "builtin.ContextSet"
    }
    fn input_data_type(&self) -> Option<DataType> {
        Some(json_type())
    }
    fn output_data_type(&self) -> Option<DataType> {
        None
    }
    fn created_keys(&self) -> BTreeSet<String> {
        std::iter::once(Self::KEY.to_string()).collect()
    }
    fn suppressed_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }
    fn parameters(&self) -> &[ParameterDescriptor] {
        &[]
    }
    fn invoke(&self, data: &DataValue, _params: &BTreeMap<String, Value>, observer: &mut ValidatingContextObserver<'_>) -> Result<ProcessorOutput, ProcessorError> {
        let value = data.value().cloned().unwrap_or(Value::Null);
        observer.notify_update(Self::KEY, value)?;
        Ok(ProcessorOutput::None)
    }
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Reads its input value and reports it via the node's declared `context_key`.
#[derive(Default)]
pub struct Probe;

impl Processor for Probe {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataProbe
    }
    fn processor_ref(&self) -> &str {
        "builtin.Probe"
    }
    fn input_data_type(&self) -> Option<DataType> {
        Some(json_type())
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

// ============================================================================
// SECTION: Sink
// ============================================================================

/// Consumes its input and produces nothing further downstream.
#[derive(Default)]
pub struct Sink;

impl Processor for Sink {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::DataSink
    }
    fn processor_ref(&self) -> &str {
        "builtin.Sink"
    }
    fn input_data_type(&self) -> Option<DataType> {
        Some(json_type())
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

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Registers every built-in processor under its fixed `builtin.*` reference.
///
/// # Errors
///
/// Returns [`RegistryError::DuplicateRegistration`] if `registry` already has
/// a processor registered under one of these references.
pub fn register_all(registry: &mut ProcessorRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(ConstSource::default()))?;
    registry.register(Arc::new(Identity))?;
    registry.register(Arc::new(ContextSet))?;
    registry.register(Arc::new(Probe))?;
    registry.register(Arc::new(Sink))?;
    Ok(())
}
