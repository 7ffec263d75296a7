//! Interrupt dispatch of timer overflows to user callbacks
//!
//! Each timer instance has a slot holding the callback currently bound to the instance. Slots are
//! modified by [`Channel`](crate::channel::Channel) from thread mode and read by
//! [`irq_handler`] from the timer's ISR.
//!
//! The ISR of each used timer must call [`irq_handler`] with a binding of that timer.
//!
//! Callbacks run in the ISR context. They must be short, must not block, and must not use
//! anything that is not safe to call from an ISR. A callback running longer than the period of its
//! timer makes the timer lose overflows. It is not detected.

use crate::crit_sect;
use crate::error::Error;
use crate::hw::timer::traits::TimerDevice;
use crate::hw::timer::{Instance, NUM_INSTANCES};
use crate::mutex::Mutex;

/// Type of the function called on each timer overflow
pub type Callback = fn();

#[derive(Clone, Copy)]
enum Slot {
    // No channel uses the timer
    Free,
    // A channel uses the timer, but no callback is attached
    Idle,
    Armed(Callback),
}

// using magic number because of https://github.com/JoshMcguigan/arr_macro/issues/2
static SLOTS: [Mutex<Slot>; NUM_INSTANCES] = arr_macro::arr![Mutex::new(Slot::Free); 5];

/// Reset module
///
/// This function is intended to be used between unit tests
#[doc(hidden)]
pub fn reset() {
    crit_sect::locked(|cs| {
        for slot in SLOTS.iter() {
            *slot.borrow_mut(cs) = Slot::Free;
        }
    });
}

/// Reserve the slot of `instance` for a new channel
pub(crate) fn claim(instance: Instance) -> Result<(), Error> {
    crit_sect::locked(|cs| {
        let mut slot = SLOTS[instance.index()].borrow_mut(cs);
        match *slot {
            Slot::Free => {
                *slot = Slot::Idle;
                Ok(())
            }
            _ => Err(Error::InstanceInUse),
        }
    })
}

/// Free the slot of `instance`, dropping any callback in it
pub(crate) fn release(instance: Instance) {
    crit_sect::locked(|cs| {
        *SLOTS[instance.index()].borrow_mut(cs) = Slot::Free;
    });
}

/// Bind `callback` to `instance`, replacing the previous one
pub(crate) fn install(instance: Instance, callback: Callback) {
    crit_sect::locked(|cs| {
        *SLOTS[instance.index()].borrow_mut(cs) = Slot::Armed(callback);
    });
}

/// Unbind the callback from `instance`
pub(crate) fn remove(instance: Instance) {
    crit_sect::locked(|cs| {
        let mut slot = SLOTS[instance.index()].borrow_mut(cs);
        if let Slot::Armed(_) = *slot {
            *slot = Slot::Idle;
        }
    });
}

/// Check if a callback is bound to `instance`
pub fn is_armed(instance: Instance) -> bool {
    crit_sect::locked(|cs| matches!(*SLOTS[instance.index()].borrow(cs), Slot::Armed(_)))
}

/// Handle an interrupt of the timer driven by `device`
///
/// If the overflow event is pending, the callback bound to the timer is called and the event is
/// cleared. An overflow of a timer without a bound callback is cleared without calling anything.
/// The callback is called outside of any critical section, so interrupts of other timers are not
/// delayed by it.
pub fn irq_handler<D: TimerDevice + ?Sized>(device: &D) {
    if !device.is_overflow_pending() {
        return;
    }

    let callback = crit_sect::locked(|cs| match *SLOTS[device.instance().index()].borrow(cs) {
        Slot::Armed(callback) => Some(callback),
        _ => None,
    });

    if let Some(callback) = callback {
        callback();
    }

    device.clear_overflow();
}
