//! Timer binding based on the TIMER peripherals available in nRF MCUs
//!
//! The TIMER is clocked from a 16 MHz source divided by `2^PRESCALER`. The COMPARE[0] event
//! together with the COMPARE0_CLEAR shortcut work as an auto-reload: the counter restarts from zero
//! each time it reaches `CC[0]`, and the COMPARE[0] event raises the interrupt.
//!
//! `CC[1]` is used to capture the counter value for diagnostics.

use super::traits::TimerDevice;
use super::{compute_timing, ClockSpec, Instance, RegisterSnapshot, Timing};
use crate::error::Error;
use core::ops::Deref;

use nrf52840_hal::pac;
use nrf52840_hal::pac::timer0;
type TimerRegisterBlock = timer0::RegisterBlock;

//// Timer Periph Wrapper
//// It allows overriding TIMER peripheral memory space with arbitrary selected memory space (like
//// an array) in unit tests running on a host PC.
struct TimerPeriphWrapper {
    ptr: *const TimerRegisterBlock,
}
impl TimerPeriphWrapper {
    pub fn new(timer: &TimerRegisterBlock) -> Self {
        TimerPeriphWrapper { ptr: timer }
    }
}
impl Deref for TimerPeriphWrapper {
    type Target = TimerRegisterBlock;
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.ptr }
    }
}
// Safety: the wrapped register block is only accessed by the binding owning it and by the ISR of
// the same timer, which touches the COMPARE[0] event only
unsafe impl Send for TimerPeriphWrapper {}

const BASE_CLOCK_HZ: u32 = 16_000_000;
const MAX_PRESCALER: u8 = 9;
const RELOAD_CC: usize = 0;
const COUNTER_CAPTURE_CC: usize = 1;

/// Width of the TIMER's counter
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterWidth {
    /// 8 bit counter
    Bits8,
    /// 16 bit counter
    Bits16,
    /// 24 bit counter
    Bits24,
    /// 32 bit counter
    Bits32,
}

impl CounterWidth {
    fn bits(self) -> u8 {
        match self {
            CounterWidth::Bits8 => 8,
            CounterWidth::Bits16 => 16,
            CounterWidth::Bits24 => 24,
            CounterWidth::Bits32 => 32,
        }
    }

    fn bitmode(self) -> timer0::bitmode::BITMODE_A {
        match self {
            CounterWidth::Bits8 => timer0::bitmode::BITMODE_A::_08BIT,
            CounterWidth::Bits16 => timer0::bitmode::BITMODE_A::_16BIT,
            CounterWidth::Bits24 => timer0::bitmode::BITMODE_A::_24BIT,
            CounterWidth::Bits32 => timer0::bitmode::BITMODE_A::_32BIT,
        }
    }
}

/// Timer binding using a `TIMER` peripheral
pub struct NrfTimer {
    instance: Instance,
    timer: TimerPeriphWrapper,
    clock: ClockSpec,
    width: CounterWidth,
    timing: Option<Timing>,
    running: bool,
}

impl NrfTimer {
    /// Create a new [`NrfTimer`] instance using passed hardware TIMER
    ///
    /// `instance` must identify the same peripheral as `timer`, because it selects the interrupt
    /// dispatch slot.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # fn main() {
    /// use nrf_periodic_timer::hw::timer::Instance;
    /// use nrf_periodic_timer::hw::timer::nrf_timer::{CounterWidth, NrfTimer};
    /// use nrf52840_hal::pac::Peripherals;
    ///
    /// let peripherals = Peripherals::take().unwrap();
    ///
    /// let timer = NrfTimer::new(Instance::Timer1, &peripherals.TIMER1, CounterWidth::Bits32);
    /// # }
    /// ```
    pub fn new(instance: Instance, timer: &TimerRegisterBlock, width: CounterWidth) -> Self {
        Self {
            instance,
            timer: TimerPeriphWrapper::new(timer),
            clock: ClockSpec {
                input_hz: BASE_CLOCK_HZ,
                counter_bits: width.bits(),
                max_prescaler: MAX_PRESCALER,
            },
            width,
            timing: None,
            running: false,
        }
    }

    /// Create a binding for `instance` without owning the peripheral
    ///
    /// It is intended to be used in ISRs, which need to pass the binding to
    /// [`irq_handler`](crate::dispatch::irq_handler).
    ///
    /// [`enable_irq`](TimerDevice::enable_irq) only sets `INTENSET` of the peripheral. The
    /// application must define the `TIMERn` ISR and unmask its line in NVIC once, before the first
    /// channel is attached:
    ///
    /// ```no_run
    /// # fn main() {
    /// use nrf52840_hal::pac::{self, Interrupt};
    /// use nrf_periodic_timer::dispatch;
    /// use nrf_periodic_timer::hw::timer::Instance;
    /// use nrf_periodic_timer::hw::timer::nrf_timer::{CounterWidth, NrfTimer};
    ///
    /// // #[interrupt]
    /// fn TIMER1() {
    ///     // Safety: the ISR only touches the COMPARE[0] event of TIMER1
    ///     let timer = unsafe { NrfTimer::steal(Instance::Timer1, CounterWidth::Bits32) };
    ///     dispatch::irq_handler(&timer);
    /// }
    ///
    /// // Safety: TIMER1 ISR is defined above and does not break any critical section
    /// unsafe { pac::NVIC::unmask(Interrupt::TIMER1) };
    /// # }
    /// ```
    ///
    /// # Safety
    ///
    /// The returned binding aliases the peripheral owned by another binding. It may only be used to
    /// handle the overflow event.
    pub unsafe fn steal(instance: Instance, width: CounterWidth) -> Self {
        // TIMER3 and TIMER4 have more CC registers, but share the layout of TIMER0
        let ptr = match instance {
            Instance::Timer0 => pac::TIMER0::ptr() as *const TimerRegisterBlock,
            Instance::Timer1 => pac::TIMER1::ptr() as *const TimerRegisterBlock,
            Instance::Timer2 => pac::TIMER2::ptr() as *const TimerRegisterBlock,
            Instance::Timer3 => pac::TIMER3::ptr() as *const TimerRegisterBlock,
            Instance::Timer4 => pac::TIMER4::ptr() as *const TimerRegisterBlock,
        };
        Self::new(instance, &*ptr, width)
    }
}

impl TimerDevice for NrfTimer {
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

        self.timer
            .mode
            .write(|w| w.mode().variant(timer0::mode::MODE_A::TIMER));
        self.timer
            .bitmode
            .write(|w| w.bitmode().variant(self.width.bitmode()));
        self.timer
            .prescaler
            .write(|w| w.prescaler().variant(timing.prescaler));
        self.timer.cc[RELOAD_CC].write(|w| w.cc().variant(timing.reload));
        self.timer.shorts.write(|w| w.compare0_clear().set_bit());
        self.timer.tasks_clear.write(|w| w.tasks_clear().set_bit());
        self.clear_overflow();

        self.timing = Some(timing);
        Ok(timing)
    }

    fn start(&mut self) {
        self.timer.tasks_start.write(|w| w.tasks_start().set_bit());
        self.running = true;
    }

    fn stop(&mut self) {
        self.timer.tasks_stop.write(|w| w.tasks_stop().set_bit());
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn enable_irq(&self) {
        self.timer.intenset.write(|w| w.compare0().set_bit());
    }

    fn disable_irq(&self) {
        self.timer.intenclr.write(|w| w.compare0().set_bit());
    }

    fn is_overflow_pending(&self) -> bool {
        self.timer.events_compare[RELOAD_CC].read().bits() != 0
    }

    fn clear_overflow(&self) {
        self.timer.events_compare[RELOAD_CC].write(|w| w.events_compare().clear_bit());
    }

    fn snapshot(&self) -> RegisterSnapshot {
        self.timer.tasks_capture[COUNTER_CAPTURE_CC].write(|w| w.tasks_capture().set_bit());

        RegisterSnapshot {
            control: self.timer.mode.read().bits(),
            width: self.timer.bitmode.read().bits(),
            prescaler: self.timer.prescaler.read().bits(),
            shortcuts: self.timer.shorts.read().bits(),
            interrupts: self.timer.intenset.read().bits(),
            status: self.timer.events_compare[RELOAD_CC].read().bits(),
            compare: self.timer.cc[RELOAD_CC].read().bits(),
            counter: self.timer.cc[COUNTER_CAPTURE_CC].read().bits(),
            running: self.running,
        }
    }
}
