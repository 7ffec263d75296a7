//! Mutex guarding variables shared between thread mode and timer IRQs.
//!
//! Access requires a [`CriticalSection`] token obtained from [`crit_sect::locked`], what proves
//! that no timer IRQ can preempt the borrower.
//!
//! [`crit_sect::locked`]: crate::crit_sect::locked

use crate::crit_sect::CriticalSection;
use core::cell::{Ref, RefCell, RefMut};

/// Wraps a variable accessible from a timer IRQ
pub struct Mutex<T>(RefCell<T>);

impl<T> Mutex<T> {
    /// Creates new wrapper for a variable accessible from an IRQ
    ///
    /// # Example
    ///
    /// ```
    /// use nrf_periodic_timer::mutex::Mutex;
    ///
    /// static OVERFLOWS_SEEN: Mutex<u32> = Mutex::new(0);
    /// ```
    pub const fn new(value: T) -> Mutex<T> {
        Self(RefCell::new(value))
    }

    /// Borrows the wrapped variable for reading
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() {
    /// use nrf_periodic_timer::crit_sect;
    /// use nrf_periodic_timer::mutex::Mutex;
    ///
    /// static PERIOD_US: Mutex<u32> = Mutex::new(500_000);
    ///
    /// crit_sect::locked(|cs| {
    ///   assert_eq!(*PERIOD_US.borrow(cs), 500_000);
    /// });
    /// # }
    /// ```
    pub fn borrow<'cs>(&'cs self, _cs: &'cs CriticalSection) -> Ref<'cs, T> {
        self.0.borrow()
    }

    /// Borrows the wrapped variable for writing
    ///
    /// # Example
    ///
    /// ```
    /// # fn main() {
    /// use nrf_periodic_timer::crit_sect;
    /// use nrf_periodic_timer::mutex::Mutex;
    ///
    /// static PERIOD_US: Mutex<u32> = Mutex::new(500_000);
    ///
    /// crit_sect::locked(|cs| {
    ///   *PERIOD_US.borrow_mut(cs) = 1_000_000;
    /// });
    /// # }
    /// ```
    pub fn borrow_mut<'cs>(&'cs self, _cs: &'cs CriticalSection) -> RefMut<'cs, T> {
        self.0.borrow_mut()
    }
}

// Safety: Mutex is Sync assumming contained type is Send and the CriticalSection token prevents
// concurrent access from thread mode and IRQs. A violation of this assumption is detected run-time
// by the RefCell used inside the mutex
unsafe impl<T> Sync for Mutex<T> where T: Send {}
