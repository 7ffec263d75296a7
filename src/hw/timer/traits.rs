//! Traits required from a portable timer object

use super::{ClockSpec, Instance, RegisterSnapshot, Timing};
use crate::error::Error;

#[cfg(test)]
use mockall::*;

/// Defines functions required by any timer binding usable by a
/// [`Channel`](crate::channel::Channel)
///
/// A binding owns the register space of one hardware timer. Methods taking `&self` are safe to
/// call from the timer's ISR, all the others are called from thread mode with the timer's
/// interrupt masked.
#[cfg_attr(test, automock)]
pub trait TimerDevice {
    /// Hardware instance driven by this binding
    fn instance(&self) -> Instance;

    /// Description of the clock feeding this timer
    fn clock(&self) -> ClockSpec;

    /// Timing programmed by the last successful [`configure`](TimerDevice::configure)
    fn timing(&self) -> Option<Timing>;

    /// Program the timer to overflow every `period_us` microseconds
    ///
    /// The counter is cleared and any pending overflow event is dropped. The running state is not
    /// changed.
    ///
    /// Returns [`Err(Error::PeriodOutOfRange)`](Error::PeriodOutOfRange) if the period cannot be
    /// represented by this timer. In that case no register is modified.
    fn configure(&mut self, period_us: u32) -> Result<Timing, Error>;

    /// Start counting. Starting a running timer does nothing
    fn start(&mut self);

    /// Stop counting. Stopping a stopped timer does nothing
    fn stop(&mut self);

    /// Check if the timer is counting
    fn is_running(&self) -> bool;

    /// Allow the overflow event to raise the timer's interrupt
    fn enable_irq(&self);

    /// Prevent the overflow event from raising the timer's interrupt
    fn disable_irq(&self);

    /// Check if an overflow event is pending
    fn is_overflow_pending(&self) -> bool;

    /// Clear a pending overflow event
    fn clear_overflow(&self);

    /// Read registers of this timer for diagnostics
    ///
    /// Taking a snapshot has no effect on the timer's operation.
    fn snapshot(&self) -> RegisterSnapshot;
}
