// crates/semantiva-runtime/src/clock.rs
// ============================================================================
// Module: System Clock
// Description: The default Clock, reading the OS wall clock and a monotonic
//              instant.
// Purpose: Give semantiva-core its one concrete time source.
// Dependencies: time, std::time::Instant, semantiva_core::ser
// ============================================================================

//! ## Overview
//! [`SystemClock`] is the only place in this workspace that reads
//! `SystemTime`/`Instant`. `semantiva-core` never samples either directly.

use std::time::Instant;

use semantiva_core::ser::Clock;
use semantiva_core::ser::ClockSample;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Wall clock plus monotonic instant, pinned at construction.
pub struct SystemClock {
    /// Monotonic reference point `monotonic_ms` is measured from.
    epoch: Instant,
}

impl SystemClock {
    /// Creates a clock whose monotonic counter starts from this call.
    #[must_use]
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> ClockSample {
        let utc_rfc3339 = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
        #[allow(clippy::cast_possible_truncation, reason = "a run lasting longer than u64::MAX milliseconds is not a case this clock needs to represent")]
        let monotonic_ms = self.epoch.elapsed().as_millis() as u64;
        ClockSample { utc_rfc3339, monotonic_ms }
    }
}
