#![cfg_attr(not(any(test, doctest)), no_std)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

//! Periodic callbacks driven by hardware timers of Nordic nRF SoCs.
//!
//! Each hardware `TIMER` instance is bound to a single [`Channel`](channel::Channel) calling one
//! user function from the timer's interrupt at a configured period. Periods can be changed at run
//! time without re-initialising the peripheral.
//!
//! Currently only nRF52840 is supported, but the timer peripheral is accessed through the
//! [`TimerDevice`](hw::timer::traits::TimerDevice) trait, so porting to other SoCs means writing
//! one more binding.

#[cfg(not(any(feature = "mocked_platform", feature = "nrf52840")))]
compile_error!("One platform must be enabled as a build feature");

#[cfg(all(feature = "mocked_platform", feature = "nrf52840"))]
compile_error!("Cannot enable multiple platforms simultaneously (mocked and nrf52840)");

#[cfg(all(test, not(feature = "mocked_platform")))]
compile_error!("For tests \"mocked_platform\" feature shall be selected");

#[macro_use]
mod log;

pub mod crit_sect;
pub mod hw;
pub mod mutex;

/// Defines errors reported by this crate
pub mod error;

/// Run-time binding of a user callback to a hardware timer.
///
/// To use this module create a [`Channel`](channel::Channel) for a timer binding, then
/// [`attach`](channel::Channel::attach) a callback with a period.
pub mod channel;

pub mod control_loop;
pub mod diagnostics;
pub mod dispatch;
pub mod telemetry;
