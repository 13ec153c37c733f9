// crates/semantiva-runtime/src/lib.rs
// ============================================================================
// Module: Crate Root
// Description: The default Executor, Transport, TraceSink, and Clock a host
//              plugs into semantiva-core.
// Purpose: Give an embedder a working runtime without writing its own seams.
// Dependencies: semantiva_core
// ============================================================================

//! ## Overview
//! Every type here implements one of the trait seams `semantiva-core` defines
//! ([`semantiva_core::orchestrator::Executor`], [`semantiva_core::orchestrator::Transport`],
//! [`semantiva_core::ser::TraceSink`], [`semantiva_core::ser::Clock`]). None of
//! this crate's logic feeds back into the core; a host may freely substitute
//! any of these with its own implementation. [`builtins`] is the exception:
//! it implements [`semantiva_core::contract::Processor`] itself, giving a
//! host something to register and run before it has written any domain
//! logic of its own.

pub mod builtins;
pub mod clock;
pub mod executor;
pub mod sink;
pub mod transport;

pub use clock::SystemClock;
pub use executor::SequentialExecutor;
pub use sink::InMemoryTraceSink;
pub use sink::JsonlTraceSink;
pub use sink::trace_file_name;
pub use transport::InMemoryTransport;
