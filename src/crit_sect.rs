//! Critical sections protecting data shared with timer IRQs
//!
//! Two flavours are available:
//!
//! * [`locked`] disables all interrupts. It is used for the few instructions needed to swap data
//!   read by an ISR, like a callback reference.
//! * [`masked`] masks only the interrupt of a single timer peripheral. It is used while
//!   reprogramming that peripheral, so that interrupts of other timers keep firing on time.

use crate::hw::timer::traits::TimerDevice;

// TODO: instead of disabling all interrupts in `locked`, mask the NVIC lines of armed timers only
/// Proof that interrupts touching shared data cannot preempt the current context
pub struct CriticalSection<'a> {
    _internal_cs: &'a cortex_m::interrupt::CriticalSection,
}

impl<'a> CriticalSection<'a> {
    fn new(internal_cs: &'a cortex_m::interrupt::CriticalSection) -> Self {
        Self {
            _internal_cs: internal_cs,
        }
    }
}

/// Run `f` with all interrupts disabled
#[cfg(not(feature = "mocked_platform"))]
pub fn locked<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    cortex_m::interrupt::free(|cs| f(&CriticalSection::new(cs)))
}

/// Run `f` with all interrupts disabled
///
/// The mocked platform has no interrupts. Simulated ISRs run in the thread which raises them, so
/// PRIMASK is not touched.
#[cfg(feature = "mocked_platform")]
pub fn locked<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    // Safety: nothing preempts the caller on the host
    let internal_cs = unsafe { cortex_m::interrupt::CriticalSection::new() };
    f(&CriticalSection::new(&internal_cs))
}

/// Run `f` with the interrupt of `device` masked
///
/// The interrupt is masked immediately before `f` is called. It is unmasked right after `f`
/// returns [`Ok`]. When `f` fails the interrupt stays masked, what prevents a half configured
/// peripheral from calling anything.
pub fn masked<D, F, R, E>(device: &mut D, f: F) -> Result<R, E>
where
    D: TimerDevice,
    F: FnOnce(&mut D) -> Result<R, E>,
{
    device.disable_irq();
    let result = f(device);
    if result.is_ok() {
        device.enable_irq();
    }
    result
}
