// crates/semantiva-core/src/types.rs
// ============================================================================
// Module: Core Data Model
// Description: Payload, typed data values, and the type-compatibility rule.
// Purpose: Carry domain data and its declared type between nodes without
//          exposing the context to processor logic.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! `Payload` is the runtime envelope handed from the orchestrator to each
//! node and back. `data` is never the context: processors receive
//! `(data, params)` only, and context mutation happens exclusively through a
//! [`crate::context::ValidatingContextObserver`].

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::context::ContextType;

// ============================================================================
// SECTION: Data Types
// ============================================================================

/// A declared data type, with the set of supertype names it is compatible
/// with downstream.
///
/// # Invariants
/// - `is_compatible_with` is used to check `prev_out == next_in || prev_out <: next_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    /// Canonical type name (e.g. `"Float"`, `"String"`).
    name: String,
    /// Names this type is considered a subtype of.
    supertypes: BTreeSet<String>,
}

impl DataType {
    /// Creates a new data type with the given supertype names.
    #[must_use]
    pub fn new(name: impl Into<String>, supertypes: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            supertypes: supertypes.into_iter().collect(),
        }
    }

    /// Creates a data type with no declared supertypes.
    #[must_use]
    pub fn leaf(name: impl Into<String>) -> Self {
        Self::new(name, std::iter::empty())
    }

    /// Returns the type's canonical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether `self` (an upstream output type) may feed a
    /// downstream input declared as `other`.
    #[must_use]
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        self.name == other.name || self.supertypes.contains(&other.name)
    }
}

// ============================================================================
// SECTION: Data Values
// ============================================================================

/// A typed domain value, or the distinguished absence-of-data marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataValue {
    /// No data is carried (used by source nodes before the first value exists).
    NoData,
    /// A typed value.
    Typed {
        /// The value's declared data type.
        data_type: DataType,
        /// The JSON-representable value itself.
        value: Value,
    },
}

impl DataValue {
    /// Returns the data type of a [`DataValue::Typed`], or `None` for [`DataValue::NoData`].
    #[must_use]
    pub fn data_type(&self) -> Option<&DataType> {
        match self {
            Self::NoData => None,
            Self::Typed { data_type, .. } => Some(data_type),
        }
    }

    /// Returns the inner JSON value of a [`DataValue::Typed`], or `None`.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::NoData => None,
            Self::Typed { value, .. } => Some(value),
        }
    }
}

// ============================================================================
// SECTION: Payload
// ============================================================================

/// The runtime envelope carried between nodes.
///
/// # Invariants
/// - `data` is never the context object; processors never receive `context`
///   directly.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Typed domain value, or [`DataValue::NoData`].
    pub data: DataValue,
    /// Ordered mapping from string keys to arbitrary values.
    pub context: ContextType,
}

impl Payload {
    /// Creates a payload carrying no data and an empty context.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: DataValue::NoData,
            context: ContextType::new(),
        }
    }

    /// Creates a payload from an initial context, carrying no data yet.
    #[must_use]
    pub fn with_context(context: ContextType) -> Self {
        Self {
            data: DataValue::NoData,
            context,
        }
    }
}
