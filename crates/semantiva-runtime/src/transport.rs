// crates/semantiva-runtime/src/transport.rs
// ============================================================================
// Module: In-Memory Transport
// Description: The default same-process Transport: one FIFO slot per channel.
// Purpose: Hand a Payload from one node's completion to the next node's start
//          without a network or queue dependency.
// Dependencies: semantiva_core::{orchestrator,types}, std::sync
// ============================================================================

//! ## Overview
//! [`InMemoryTransport`] keeps at most one published [`semantiva_core::types::Payload`]
//! per channel name; `receive` consumes it. A host wanting cross-process
//! hand-off substitutes a queue-backed [`Transport`] implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use semantiva_core::orchestrator::Transport;
use semantiva_core::orchestrator::TransportError;
use semantiva_core::types::Payload;

/// A same-process, single-slot-per-channel [`Transport`].
#[derive(Default)]
pub struct InMemoryTransport {
    /// Most recently published payload per channel, awaiting `receive`.
    slots: Mutex<HashMap<String, Payload>>,
}

impl InMemoryTransport {
    /// Creates an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for InMemoryTransport {
    fn publish(&self, channel: &str, payload: Payload) -> Result<(), TransportError> {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slots.insert(channel.to_string(), payload);
        Ok(())
    }

    fn receive(&self, channel: &str) -> Result<Payload, TransportError> {
        let mut slots = self.slots.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        slots.remove(channel).ok_or_else(|| TransportError::ChannelEmpty(channel.to_string()))
    }
}
