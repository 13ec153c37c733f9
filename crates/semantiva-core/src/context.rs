// crates/semantiva-core/src/context.rs
// ============================================================================
// Module: Context Store & Validating Observer
// Description: Ordered key/value context and the observer that mediates all
//              mutations against a processor's declared created/suppressed keys.
// Purpose: Enforce declared-key discipline so processors cannot mutate
//          context in undeclared ways.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! [`ContextType`] is the ordered key/value mapping carried on a
//! [`crate::types::Payload`]. It is never mutated directly by processor code;
//! all writes and deletions go through a [`ValidatingContextObserver`] scoped
//! to a single node's declared `created_keys`/`suppressed_keys`.
//!
//! Invariants:
//! - A write to a key outside `declared_created_keys` fails with
//!   [`ContextError::InvalidContextKey`] before the context is touched.
//! - A delete of a key outside `declared_suppressed_keys` fails with
//!   [`ContextError::InvalidSuppressedKey`].
//! - Observers are not reentrant: the borrow checker enforces this statically,
//!   since [`ValidatingContextObserver`] holds the only mutable reference to
//!   the active [`ContextType`] for its lifetime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while mediating context mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    /// A write was attempted to a key outside `declared_created_keys`.
    #[error("write to undeclared context key: {0}")]
    InvalidContextKey(String),
    /// A delete was attempted on a key outside `declared_suppressed_keys`.
    #[error("delete of undeclared context key: {0}")]
    InvalidSuppressedKey(String),
    /// A mutation was attempted without an active observer.
    #[error("context mutation attempted without an active observer")]
    ObserverMissing,
}

// ============================================================================
// SECTION: Context Type
// ============================================================================

/// A mutable, ordered string-to-value mapping.
///
/// Insertion order is preserved; existing keys retain their original
/// position when updated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextType {
    entries: Vec<(String, Value)>,
}

impl ContextType {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context from an initial set of key/value pairs, in the given order.
    #[must_use]
    pub fn from_entries(entries: Vec<(String, Value)>) -> Self {
        let mut context = Self::new();
        for (key, value) in entries {
            context.set(key, value);
        }
        context
    }

    /// Returns the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Inserts or updates `key`, preserving insertion order for existing keys.
    /// Returns `true` if the key already existed (an update) and `false` if
    /// it was newly created.
    fn set(&mut self, key: String, value: Value) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
            true
        } else {
            self.entries.push((key, value));
            false
        }
    }

    /// Removes `key`, returning its prior value if present.
    fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Returns the number of entries in the context.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the context has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: Context Delta
// ============================================================================

/// Record of the key reads and mutations observed during one node's execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextDelta {
    /// Keys read during the node's execution.
    pub read_keys: Vec<String>,
    /// Keys newly created by the node.
    pub created_keys: Vec<String>,
    /// Keys that already existed and were overwritten by the node.
    pub updated_keys: Vec<String>,
    /// Keys deleted by the node.
    pub deleted_keys: Vec<String>,
}

// ============================================================================
// SECTION: Validating Context Observer
// ============================================================================

/// Mediates all context mutations for a single node's execution.
///
/// Bound to the processor's declared `created_keys`/`suppressed_keys` for the
/// node being executed; discarded once the node completes.
pub struct ValidatingContextObserver<'ctx> {
    /// The active context being mutated.
    context: &'ctx mut ContextType,
    /// Keys this node's processor is allowed to create or update.
    declared_created_keys: BTreeSet<String>,
    /// Keys this node's processor is allowed to delete.
    declared_suppressed_keys: BTreeSet<String>,
    /// Accumulated record of reads and mutations.
    delta: ContextDelta,
}

impl<'ctx> ValidatingContextObserver<'ctx> {
    /// Attaches a new observer to `context`, scoped to the given declared keys.
    #[must_use]
    pub fn new(
        context: &'ctx mut ContextType,
        declared_created_keys: BTreeSet<String>,
        declared_suppressed_keys: BTreeSet<String>,
    ) -> Self {
        Self {
            context,
            declared_created_keys,
            declared_suppressed_keys,
            delta: ContextDelta::default(),
        }
    }

    /// Reads a key from the active context, recording the read in the delta.
    pub fn read(&mut self, key: &str) -> Option<&Value> {
        self.delta.read_keys.push(key.to_string());
        self.context.get(key)
    }

    /// Writes `value` to `key`, allowed only if `key` is in
    /// `declared_created_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidContextKey`] when `key` was not
    /// declared.
    pub fn notify_update(&mut self, key: &str, value: Value) -> Result<(), ContextError> {
        if !self.declared_created_keys.contains(key) {
            return Err(ContextError::InvalidContextKey(key.to_string()));
        }
        let was_update = self.context.set(key.to_string(), value);
        if was_update {
            self.delta.updated_keys.push(key.to_string());
        } else {
            self.delta.created_keys.push(key.to_string());
        }
        Ok(())
    }

    /// Deletes `key`, allowed only if `key` is in `declared_suppressed_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidSuppressedKey`] when `key` was not
    /// declared.
    pub fn notify_delete(&mut self, key: &str) -> Result<(), ContextError> {
        if !self.declared_suppressed_keys.contains(key) {
            return Err(ContextError::InvalidSuppressedKey(key.to_string()));
        }
        self.context.remove(key);
        self.delta.deleted_keys.push(key.to_string());
        Ok(())
    }

    /// Consumes the observer, returning the accumulated [`ContextDelta`].
    #[must_use]
    pub fn into_delta(self) -> ContextDelta {
        self.delta
    }
}
