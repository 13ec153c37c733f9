// crates/semantiva-core/src/resolver.rs
// ============================================================================
// Module: Parameter Resolver
// Description: Resolves a node's invocation parameters from node config,
//              context, and processor defaults, recording provenance.
// Purpose: Implement the node > context > default precedence rule once.
// Dependencies: serde_json, crate::context, crate::contract
// ============================================================================

//! ## Overview
//! For each formal parameter declared by a processor, [`ParameterResolver::resolve`]
//! tries node configuration, then the current context, then the processor's
//! declared default, in that order, and records which source won.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::context::ContextType;
use crate::contract::ParameterDescriptor;

// ============================================================================
// SECTION: Provenance
// ============================================================================

/// Which source a resolved parameter's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterSource {
    /// The value came from the node's own configuration.
    Node,
    /// The value was read from the current context.
    Context,
    /// The value came from the processor's declared default.
    Default,
}

/// The outcome of resolving a node's full parameter set.
#[derive(Debug, Clone, Default)]
pub struct ParameterResolutionReport {
    /// Resolved parameter values, keyed by parameter name.
    pub values: BTreeMap<String, Value>,
    /// Provenance of each resolved value.
    pub sources: BTreeMap<String, ParameterSource>,
    /// Keys present in node configuration but not accepted by the processor.
    pub unknown_parameters: Vec<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving a node's parameters.
#[derive(Debug, thiserror::Error)]
pub enum ParameterResolutionError {
    /// A required parameter could not be resolved from any source.
    #[error("parameter {0:?} could not be resolved: not in node config, context, or processor defaults")]
    MissingRequiredParameter(String),
    /// Strict mode: node configuration declared parameters the processor does
    /// not accept.
    #[error("unknown parameters in node configuration (strict mode): {0:?}")]
    UnknownParameters(Vec<String>),
}

// ============================================================================
// SECTION: Parameter Resolver
// ============================================================================

/// Resolves a node's invocation parameters.
pub struct ParameterResolver;

impl ParameterResolver {
    /// Resolves every formal parameter of `descriptors` using the precedence
    /// `node config > context > processor default`.
    ///
    /// Parameters present in `node_params` but absent from `descriptors` are
    /// collected into `unknown_parameters`; in `strict` mode that list being
    /// non-empty is a fatal error raised before any parameter is resolved.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterResolutionError::UnknownParameters`] in strict mode
    /// when node configuration declares parameters the processor does not
    /// accept, or [`ParameterResolutionError::MissingRequiredParameter`] when
    /// a declared parameter has no value from any source.
    pub fn resolve(
        node_params: &BTreeMap<String, Value>,
        context: &ContextType,
        descriptors: &[ParameterDescriptor],
        strict: bool,
    ) -> Result<ParameterResolutionReport, ParameterResolutionError> {
        let accepted: std::collections::BTreeSet<&str> =
            descriptors.iter().map(|d| d.name.as_str()).collect();
        let unknown_parameters: Vec<String> = node_params
            .keys()
            .filter(|key| !accepted.contains(key.as_str()))
            .cloned()
            .collect();

        if strict && !unknown_parameters.is_empty() {
            return Err(ParameterResolutionError::UnknownParameters(unknown_parameters));
        }

        let mut report = ParameterResolutionReport {
            unknown_parameters,
            ..ParameterResolutionReport::default()
        };

        for descriptor in descriptors {
            if let Some(value) = node_params.get(&descriptor.name) {
                report.values.insert(descriptor.name.clone(), value.clone());
                report.sources.insert(descriptor.name.clone(), ParameterSource::Node);
                continue;
            }
            if let Some(value) = context.get(&descriptor.name) {
                report.values.insert(descriptor.name.clone(), value.clone());
                report.sources.insert(descriptor.name.clone(), ParameterSource::Context);
                continue;
            }
            if let Some(default) = &descriptor.default {
                report.values.insert(descriptor.name.clone(), default.clone());
                report.sources.insert(descriptor.name.clone(), ParameterSource::Default);
                continue;
            }
            return Err(ParameterResolutionError::MissingRequiredParameter(descriptor.name.clone()));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_config_takes_precedence_over_context_and_default() {
        let mut node_params = BTreeMap::new();
        node_params.insert("addend".to_string(), json!(5));
        let context = ContextType::from_entries(vec![("addend".to_string(), json!(99))]);
        let descriptors = vec![ParameterDescriptor::with_default("addend", json!(0))];

        let report = ParameterResolver::resolve(&node_params, &context, &descriptors, false).unwrap();
        assert_eq!(report.values["addend"], json!(5));
        assert_eq!(report.sources["addend"], ParameterSource::Node);
    }

    #[test]
    fn context_is_used_when_node_config_is_absent() {
        let node_params = BTreeMap::new();
        let context = ContextType::from_entries(vec![("addend".to_string(), json!(99))]);
        let descriptors = vec![ParameterDescriptor::with_default("addend", json!(0))];

        let report = ParameterResolver::resolve(&node_params, &context, &descriptors, false).unwrap();
        assert_eq!(report.values["addend"], json!(99));
        assert_eq!(report.sources["addend"], ParameterSource::Context);
    }

    #[test]
    fn default_is_used_when_nothing_else_resolves() {
        let node_params = BTreeMap::new();
        let context = ContextType::new();
        let descriptors = vec![ParameterDescriptor::with_default("addend", json!(0))];

        let report = ParameterResolver::resolve(&node_params, &context, &descriptors, false).unwrap();
        assert_eq!(report.values["addend"], json!(0));
        assert_eq!(report.sources["addend"], ParameterSource::Default);
    }

    #[test]
    fn missing_required_parameter_fails() {
        let node_params = BTreeMap::new();
        let context = ContextType::new();
        let descriptors = vec![ParameterDescriptor::required("addend")];

        let err = ParameterResolver::resolve(&node_params, &context, &descriptors, false).unwrap_err();
        assert!(matches!(err, ParameterResolutionError::MissingRequiredParameter(name) if name == "addend"));
    }

    #[test]
    fn strict_mode_rejects_unknown_parameters() {
        let mut node_params = BTreeMap::new();
        node_params.insert("bogus".to_string(), json!(1));
        let context = ContextType::new();
        let descriptors: Vec<ParameterDescriptor> = vec![];

        let err = ParameterResolver::resolve(&node_params, &context, &descriptors, true).unwrap_err();
        assert!(matches!(err, ParameterResolutionError::UnknownParameters(_)));
    }

    #[test]
    fn non_strict_mode_reports_unknown_parameters_without_failing() {
        let mut node_params = BTreeMap::new();
        node_params.insert("bogus".to_string(), json!(1));
        let context = ContextType::new();
        let descriptors: Vec<ParameterDescriptor> = vec![];

        let report = ParameterResolver::resolve(&node_params, &context, &descriptors, false).unwrap();
        assert_eq!(report.unknown_parameters, vec!["bogus".to_string()]);
    }
}
