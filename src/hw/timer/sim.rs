//! Simulated timer intended to be used in unit tests and host simulations
//!
//! [`SimTimer`] implements [`TimerDevice`] without any hardware. Simulated time moves only when
//! [`advance`](SimTimer::advance) is called. Each overflow sets the pending event and, if the
//! interrupt is enabled, calls [`irq_handler`](crate::dispatch::irq_handler) the way NVIC would.

use super::traits::TimerDevice;
use super::{compute_timing, ClockSpec, Instance, RegisterSnapshot, Timing};
use crate::dispatch;
use crate::error::Error;
use core::cell::Cell;

/// Clock used by [`SimTimer::new`]: 1 MHz, 16 bit counter, prescaler up to 128
///
/// The longest representable period is `65535 * 128` us.
pub const SIM_CLOCK: ClockSpec = ClockSpec {
    input_hz: 1_000_000,
    counter_bits: 16,
    max_prescaler: 7,
};

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Object representing a simulated timer
pub struct SimTimer {
    instance: Instance,
    clock: ClockSpec,
    timing: Option<Timing>,
    running: bool,
    irq_enabled: Cell<bool>,
    pending: Cell<bool>,
    // Input clock cycles since the last overflow, scaled by 10^6 to keep fractions of a cycle
    phase: Cell<u128>,
    overflows: Cell<u32>,
}

impl SimTimer {
    /// Create a stopped timer clocked by [`SIM_CLOCK`]
    pub fn new(instance: Instance) -> Self {
        Self::with_clock(instance, SIM_CLOCK)
    }

    /// Create a stopped timer clocked by `clock`
    pub fn with_clock(instance: Instance, clock: ClockSpec) -> Self {
        Self {
            instance,
            clock,
            timing: None,
            running: false,
            irq_enabled: Cell::new(false),
            pending: Cell::new(false),
            phase: Cell::new(0),
            overflows: Cell::new(0),
        }
    }

    /// Move simulated time forward by `us` microseconds
    ///
    /// Overflows happening in that time are processed in order. A stopped timer does not count.
    pub fn advance(&self, us: u32) {
        if !self.running {
            return;
        }
        let Some(timing) = self.timing else {
            return;
        };

        let period = u128::from(timing.reload)
            * u128::from(timing.divisor())
            * u128::from(MICROS_PER_SECOND);
        let mut phase = self.phase.get() + u128::from(us) * u128::from(self.clock.input_hz);

        while phase >= period {
            phase -= period;
            self.phase.set(phase);
            self.overflow();
        }
        self.phase.set(phase);
    }

    /// Number of overflows counted by the hardware, including those not handled by the ISR
    pub fn overflows(&self) -> u32 {
        self.overflows.get()
    }

    /// Check if the overflow interrupt is enabled
    pub fn is_irq_enabled(&self) -> bool {
        self.irq_enabled.get()
    }

    fn overflow(&self) {
        self.overflows.set(self.overflows.get().wrapping_add(1));
        self.pending.set(true);
        if self.irq_enabled.get() {
            dispatch::irq_handler(self);
        }
    }
}

impl TimerDevice for SimTimer {
    fn instance(&self) -> Instance {
        self.instance
    }

    fn clock(&self) -> ClockSpec {
        self.clock
    }

    fn timing(&self) -> Option<Timing> {
        self.timing
    }

    fn configure(&mut self, period_us: u32) -> Result<Timing, Error> {
        let timing = compute_timing(&self.clock, period_us)?;
        self.timing = Some(timing);
        self.phase.set(0);
        self.pending.set(false);
        Ok(timing)
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn enable_irq(&self) {
        self.irq_enabled.set(true);
        // An event pending while masked fires as soon as the interrupt is enabled
        if self.pending.get() {
            dispatch::irq_handler(self);
        }
    }

    fn disable_irq(&self) {
        self.irq_enabled.set(false);
    }

    fn is_overflow_pending(&self) -> bool {
        self.pending.get()
    }

    fn clear_overflow(&self) {
        self.pending.set(false);
    }

    fn snapshot(&self) -> RegisterSnapshot {
        let (prescaler, divisor, compare) = self.timing.map_or((0, 1, 0), |t| {
            (u32::from(t.prescaler), t.divisor(), t.reload)
        });
        let ticks = self.phase.get() / u128::from(MICROS_PER_SECOND) / u128::from(divisor);
        RegisterSnapshot {
            control: 0,
            width: u32::from(self.clock.counter_bits),
            prescaler,
            shortcuts: 1,
            interrupts: u32::from(self.irq_enabled.get()),
            status: u32::from(self.pending.get()),
            compare,
            // Below the reload value
            counter: ticks as u32,
            running: self.running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_stopped_timer_does_not_count() {
        let mut timer = SimTimer::new(Instance::Timer4);
        timer.configure(1_000).unwrap();

        timer.advance(10_000);
        assert_eq!(timer.overflows(), 0);
        assert_eq!(timer.snapshot().counter, 0);
    }

    #[test]
    #[serial]
    fn test_overflows_pend_while_masked() {
        dispatch::reset();
        let mut timer = SimTimer::new(Instance::Timer4);
        timer.configure(1_000).unwrap();
        timer.start();

        timer.advance(2_500);
        assert_eq!(timer.overflows(), 2);
        assert!(timer.is_overflow_pending());
        assert_eq!(timer.snapshot().counter, 500);
    }

    #[test]
    #[serial]
    fn test_enabling_irq_handles_pending_event() {
        dispatch::reset();
        let mut timer = SimTimer::new(Instance::Timer4);
        timer.configure(1_000).unwrap();
        timer.start();
        timer.advance(1_000);
        assert!(timer.is_overflow_pending());

        timer.enable_irq();
        // No callback armed in the slot, the event is just cleared
        assert!(!timer.is_overflow_pending());
    }

    #[test]
    fn test_configure_resets_phase() {
        let mut timer = SimTimer::new(Instance::Timer4);
        timer.configure(1_000).unwrap();
        timer.start();
        timer.advance(900);

        timer.configure(1_000).unwrap();
        timer.advance(900);
        assert_eq!(timer.overflows(), 0);
    }

    #[test]
    fn test_rate_follows_period_with_fractional_clock() {
        // ~30.5 us per tick, a millisecond is not a whole number of cycles
        let clock = ClockSpec {
            input_hz: 32_768,
            counter_bits: 24,
            max_prescaler: 0,
        };
        let mut timer = SimTimer::with_clock(Instance::Timer4, clock);
        timer.configure(1_000_000).unwrap();
        timer.start();

        for _ in 0..10_000 {
            timer.advance(1_000);
        }
        assert_eq!(timer.overflows(), 10);
        assert_eq!(timer.snapshot().counter, 0);

        timer.advance(500_000);
        assert_eq!(timer.snapshot().counter, 16_384);
    }

    #[test]
    fn test_out_of_range() {
        let mut timer = SimTimer::new(Instance::Timer4);
        assert_eq!(timer.configure(8_388_545), Err(Error::PeriodOutOfRange));
        assert_eq!(timer.timing(), None);
        assert!(timer.configure(8_388_480).is_ok());
    }
}
