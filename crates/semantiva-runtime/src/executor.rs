// crates/semantiva-runtime/src/executor.rs
// ============================================================================
// Module: Sequential Executor
// Description: The default in-process, synchronous Executor.
// Purpose: Run a NodeCall on the calling thread, honoring cooperative
//          cancellation checked immediately before invocation.
// Dependencies: semantiva_core::orchestrator
// ============================================================================

//! ## Overview
//! [`SequentialExecutor`] never spawns a thread: `submit_and_wait` checks
//! [`CancellationToken::is_cancelled`] once, then runs the call inline. A host
//! wanting a pooled or async executor implements [`Executor`] directly; this
//! is deliberately the simplest conforming implementation.

use semantiva_core::context::ContextDelta;
use semantiva_core::contract::ProcessorOutput;
use semantiva_core::orchestrator::CancellationToken;
use semantiva_core::orchestrator::Executor;
use semantiva_core::orchestrator::ExecutorError;
use semantiva_core::orchestrator::NodeCall;

/// Runs every submitted [`NodeCall`] synchronously on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    /// Creates a new sequential executor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Executor for SequentialExecutor {
    fn submit_and_wait(&self, call: NodeCall<'_>, cancellation: &CancellationToken) -> Result<(ProcessorOutput, ContextDelta), ExecutorError> {
        if cancellation.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        call.call().map_err(ExecutorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semantiva_core::context::ValidatingContextObserver;
    use semantiva_core::contract::ProcessorOutput;
    use std::collections::BTreeSet;

    #[test]
    fn already_cancelled_token_short_circuits_without_invoking() {
        let executor = SequentialExecutor::new();
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        let mut invoked = false;
        let call = NodeCall::new(|| {
            invoked = true;
            Ok((ProcessorOutput::None, ContextDelta::default()))
        });
        let result = executor.submit_and_wait(call, &cancellation);
        assert!(matches!(result, Err(ExecutorError::Cancelled)));
        assert!(!invoked);
    }

    #[test]
    fn uncancelled_call_runs_and_returns_its_delta() {
        let executor = SequentialExecutor::new();
        let cancellation = CancellationToken::new();
        let call = NodeCall::new(|| {
            let mut ctx = semantiva_core::context::ContextType::new();
            let mut observer = ValidatingContextObserver::new(&mut ctx, BTreeSet::new(), BTreeSet::new());
            Ok((ProcessorOutput::None, observer.into_delta()))
        });
        let result = executor.submit_and_wait(call, &cancellation);
        assert!(result.is_ok());
    }
}
