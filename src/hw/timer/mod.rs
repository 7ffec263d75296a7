//! Portable timer abstraction
//!
//! A timer device is a hardware counter with a power-of-two clock divider (prescaler) and a
//! reload value. The counter raises an overflow interrupt each time it reaches the reload value
//! and starts counting from zero again.
//!
//! This module contains the platform independent part:
//!
//! * [`compute_timing`] finding prescaler and reload values for a requested period
//! * [`traits::TimerDevice`] required from any timer binding
//!
//! Bindings:
//!
//! * [`nrf_timer`] using the `TIMER` peripherals of nRF52840
//! * [`sim`] simulating a timer on the host (`mocked_platform` only)

use crate::error::Error;
use core::fmt;

pub mod nrf_timer;
#[cfg(feature = "mocked_platform")]
pub mod sim;
pub mod traits;

/// Number of `TIMER` instances available in nRF52840
pub const NUM_INSTANCES: usize = 5;

const MICROS_PER_SECOND: u64 = 1_000_000;
const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Identity of a hardware timer instance
///
/// Only timers present in the SoC are listed, so selecting a missing peripheral is a build error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Instance {
    /// `TIMER0`
    Timer0,
    /// `TIMER1`
    Timer1,
    /// `TIMER2`
    Timer2,
    /// `TIMER3`
    Timer3,
    /// `TIMER4`
    Timer4,
}

impl Instance {
    /// Index of this instance in tables holding per-instance data
    pub const fn index(self) -> usize {
        match self {
            Instance::Timer0 => 0,
            Instance::Timer1 => 1,
            Instance::Timer2 => 2,
            Instance::Timer3 => 3,
            Instance::Timer4 => 4,
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TIMER{}", self.index())
    }
}

/// Description of the clock feeding a timer and of the timer's counter
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClockSpec {
    /// Frequency of the clock before the prescaler
    pub input_hz: u32,
    /// Width of the counter and of the reload register
    pub counter_bits: u8,
    /// The highest supported prescaler exponent. The clock is divided by `2^prescaler`
    pub max_prescaler: u8,
}

impl ClockSpec {
    /// The highest reload value fitting the counter and the 32 bit reload register
    pub const fn max_reload(&self) -> u64 {
        if self.counter_bits >= 32 {
            u32::MAX as u64
        } else {
            (1u64 << self.counter_bits) - 1
        }
    }
}

/// Prescaler and reload pair programmed to a timer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Clock divider exponent. The counter is incremented at `input_hz / 2^prescaler`
    pub prescaler: u8,
    /// Number of prescaled ticks between overflows
    pub reload: u32,
}

impl Timing {
    /// Clock divider, saturated at `u64::MAX`
    pub fn divisor(&self) -> u64 {
        1u64.checked_shl(u32::from(self.prescaler)).unwrap_or(u64::MAX)
    }

    /// Period between overflows realised with this timing, in nanoseconds
    ///
    /// Saturates at `u64::MAX`.
    pub fn period_ns(&self, clock: &ClockSpec) -> u64 {
        self.ticks_to_ns(u128::from(self.reload), clock)
    }

    /// Duration of a single prescaled tick, in nanoseconds
    pub fn resolution_ns(&self, clock: &ClockSpec) -> u64 {
        self.ticks_to_ns(1, clock)
    }

    fn ticks_to_ns(&self, ticks: u128, clock: &ClockSpec) -> u64 {
        let ns = ticks * u128::from(self.divisor()) * u128::from(NANOS_PER_SECOND)
            / u128::from(clock.input_hz.max(1));
        u64::try_from(ns).unwrap_or(u64::MAX)
    }
}

/// Find the timing realising `period_us` with the best resolution available
///
/// Prescaler exponents are tried from the lowest one. The first one giving a reload value that
/// fits the counter is selected. The reload value is rounded to the nearest tick, so the
/// realised period differs from the requested one by at most half of a tick.
///
/// Returns [`Err(Error::PeriodOutOfRange)`](Error::PeriodOutOfRange) if the period is shorter than
/// one tick of the input clock, or if the reload does not fit the counter even with the highest
/// prescaler.
///
/// # Examples
///
/// ```
/// use nrf_periodic_timer::hw::timer::{compute_timing, ClockSpec, Timing};
///
/// let clock = ClockSpec { input_hz: 16_000_000, counter_bits: 16, max_prescaler: 9 };
///
/// // 10 ms does not fit 16 bits at 16 MHz, but fits at 4 MHz
/// let timing = compute_timing(&clock, 10_000).unwrap();
/// assert_eq!(timing, Timing { prescaler: 2, reload: 40_000 });
/// ```
pub fn compute_timing(clock: &ClockSpec, period_us: u32) -> Result<Timing, Error> {
    let max_reload = clock.max_reload();
    // Input clock cycles scaled by 10^6
    let cycles = u64::from(period_us) * u64::from(clock.input_hz);
    if cycles < MICROS_PER_SECOND {
        return Err(Error::PeriodOutOfRange);
    }

    for prescaler in 0..=clock.max_prescaler {
        let cycles_per_tick = match 1u64
            .checked_shl(u32::from(prescaler))
            .and_then(|divisor| MICROS_PER_SECOND.checked_mul(divisor))
        {
            Some(cycles_per_tick) => cycles_per_tick,
            // Tick longer than any representable period
            None => break,
        };
        let reload = (u128::from(cycles) + u128::from(cycles_per_tick / 2))
            / u128::from(cycles_per_tick);

        if reload == 0 {
            // A higher prescaler would only give a coarser tick
            break;
        }
        if reload <= u128::from(max_reload) {
            return Ok(Timing {
                prescaler,
                // Cannot truncate, checked against max_reload
                reload: reload as u32,
            });
        }
    }

    Err(Error::PeriodOutOfRange)
}

/// Register values of a timer captured for diagnostics
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RegisterSnapshot {
    /// Mode of the timer (timer or counter)
    pub control: u32,
    /// Counter width selection
    pub width: u32,
    /// Prescaler exponent
    pub prescaler: u32,
    /// Shortcuts, including the clear on compare used as auto-reload
    pub shortcuts: u32,
    /// Enabled interrupts
    pub interrupts: u32,
    /// Pending overflow event
    pub status: u32,
    /// Compare value used as the reload value
    pub compare: u32,
    /// Counter value at the time of the snapshot
    pub counter: u32,
    /// If the counter is running
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const NRF_CLOCK_32: ClockSpec = ClockSpec {
        input_hz: 16_000_000,
        counter_bits: 32,
        max_prescaler: 9,
    };

    const NRF_CLOCK_16: ClockSpec = ClockSpec {
        input_hz: 16_000_000,
        counter_bits: 16,
        max_prescaler: 9,
    };

    fn assert_within_quantum(clock: &ClockSpec, period_us: u32) {
        let timing = compute_timing(clock, period_us).unwrap();
        let requested_ns = u64::from(period_us) * 1_000;
        let realised_ns = timing.period_ns(clock);
        let quantum_ns = timing.resolution_ns(clock);

        assert!(
            realised_ns.abs_diff(requested_ns) <= quantum_ns,
            "period {} us realised as {} ns with {:?}",
            period_us,
            realised_ns,
            timing
        );
        assert!(u64::from(timing.reload) <= clock.max_reload());
    }

    #[test]
    fn test_best_resolution_is_selected() {
        let timing = compute_timing(&NRF_CLOCK_32, 500_000).unwrap();
        assert_eq!(
            timing,
            Timing {
                prescaler: 0,
                reload: 8_000_000
            }
        );
    }

    #[test]
    fn test_prescaler_grows_with_period_in_narrow_counter() {
        // 16 MHz / 2^9 = 31.25 kHz, 32 us per tick
        let timing = compute_timing(&NRF_CLOCK_16, 2_000_000).unwrap();
        assert_eq!(
            timing,
            Timing {
                prescaler: 9,
                reload: 62_500
            }
        );
    }

    #[test]
    fn test_periods_in_range_are_realised_within_quantum() {
        for clock in [NRF_CLOCK_16, NRF_CLOCK_32] {
            for period_us in [1, 2, 3, 7, 99, 1_000, 4_095, 4_096, 65_537, 999_999, 2_000_000] {
                assert_within_quantum(&clock, period_us);
            }
        }
        assert_within_quantum(&NRF_CLOCK_32, u32::MAX);
    }

    #[test]
    fn test_zero_period_fails() {
        assert_eq!(
            compute_timing(&NRF_CLOCK_32, 0),
            Err(Error::PeriodOutOfRange)
        );
    }

    #[test]
    fn test_period_shorter_than_one_tick_fails() {
        let slow_clock = ClockSpec {
            input_hz: 32_768,
            counter_bits: 24,
            max_prescaler: 0,
        };
        // One tick is ~30.5 us
        assert_eq!(
            compute_timing(&slow_clock, 10),
            Err(Error::PeriodOutOfRange)
        );
        assert_eq!(
            compute_timing(&slow_clock, 20),
            Err(Error::PeriodOutOfRange)
        );
        assert_eq!(
            compute_timing(&slow_clock, 30),
            Err(Error::PeriodOutOfRange)
        );
        assert_eq!(
            compute_timing(&slow_clock, 31),
            Ok(Timing {
                prescaler: 0,
                reload: 1
            })
        );
    }

    #[test]
    fn test_extreme_clock_specs_do_not_overflow() {
        let wide_clock = ClockSpec {
            input_hz: 1,
            counter_bits: 64,
            max_prescaler: u8::MAX,
        };
        assert_eq!(wide_clock.max_reload(), u64::from(u32::MAX));
        assert_eq!(
            compute_timing(&wide_clock, u32::MAX),
            Ok(Timing {
                prescaler: 0,
                reload: 4_295
            })
        );
        assert_eq!(
            compute_timing(&wide_clock, 1),
            Err(Error::PeriodOutOfRange)
        );

        // Nothing fits a zero-width counter, prescalers are tried until the tick overflows
        let narrow_clock = ClockSpec {
            input_hz: u32::MAX,
            counter_bits: 0,
            max_prescaler: u8::MAX,
        };
        assert_eq!(
            compute_timing(&narrow_clock, u32::MAX),
            Err(Error::PeriodOutOfRange)
        );

        let coarse = Timing {
            prescaler: 200,
            reload: u32::MAX,
        };
        assert_eq!(coarse.divisor(), u64::MAX);
        assert_eq!(coarse.period_ns(&wide_clock), u64::MAX);
        assert_eq!(coarse.resolution_ns(&wide_clock), u64::MAX);
    }

    #[test]
    fn test_period_longer_than_saturated_prescaler_fails() {
        // 65535 ticks of 32 us
        assert!(compute_timing(&NRF_CLOCK_16, 2_097_120).is_ok());
        assert_eq!(
            compute_timing(&NRF_CLOCK_16, 2_100_000),
            Err(Error::PeriodOutOfRange)
        );
    }

    #[test]
    fn test_instance_display() {
        assert_eq!(Instance::Timer3.to_string(), "TIMER3");
    }
}
