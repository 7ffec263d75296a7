//! Counters shared between timer callbacks and the foreground loop
//!
//! A [`TelemetryCounter`] is written by exactly one ISR and read from thread mode. It fits the
//! native atomic width of the MCU, so a reader may see a value one increment old, but never a torn
//! one.
//!
//! # Examples
//!
//! ```
//! use nrf_periodic_timer::telemetry::TelemetryCounter;
//!
//! static LED_TOGGLES: TelemetryCounter = TelemetryCounter::new();
//!
//! fn on_timer() {
//!     LED_TOGGLES.increment();
//! }
//!
//! on_timer();
//! assert_eq!(LED_TOGGLES.get(), 1);
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

/// Monotonic counter with a single writer
#[derive(Debug, Default)]
pub struct TelemetryCounter(AtomicU32);

impl TelemetryCounter {
    /// Create a counter starting from zero
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Add one to the counter
    ///
    /// Must be called from a single context only. Load and store are used instead of a
    /// read-modify-write, which is not available on all Cortex-M cores.
    pub fn increment(&self) {
        let value = self.0.load(Ordering::Relaxed);
        self.0.store(value.wrapping_add(1), Ordering::Relaxed);
    }

    /// Current value of the counter
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }

    /// Number of increments since the counter had the `earlier` value
    pub fn since(&self, earlier: u32) -> u32 {
        self.get().wrapping_sub(earlier)
    }
}
