use crate::crit_sect;
use crate::dispatch::{self, Callback};
use crate::error::Error;
use crate::hw::timer::traits::TimerDevice;
use crate::hw::timer::RegisterSnapshot;

/// State of a [`Channel`]
///
/// ```text
///             attach               set_interval (ok)
/// Unattached -------> Running <----------------------+
///     ^                  |  \                        |
///     |                  |   +-- set_interval (err) -+-> Failed
///     +---- detach ------+---------------------------------+
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No callback is bound. The timer is stopped and its interrupt masked
    Unattached,
    /// The callback is called periodically
    Running,
    /// The last [`set_interval`](Channel::set_interval) failed. The timer is stopped, its
    /// interrupt masked, and no callback is bound until a successful `set_interval`
    Failed,
}

/// A hardware timer calling a single callback periodically
///
/// The channel exclusively owns its timer binding. Only one channel may exist for each timer
/// instance at a time.
///
/// # Examples
///
/// ```no_run
/// use nrf52840_hal::pac::Peripherals;
/// use nrf_periodic_timer::channel::Channel;
/// use nrf_periodic_timer::hw::timer::Instance;
/// use nrf_periodic_timer::hw::timer::nrf_timer::{CounterWidth, NrfTimer};
/// use nrf_periodic_timer::telemetry::TelemetryCounter;
///
/// static TICKS: TelemetryCounter = TelemetryCounter::new();
///
/// fn on_tick() {
///     TICKS.increment();
/// }
///
/// fn main() {
///     let peripherals = Peripherals::take().unwrap();
///     let timer = NrfTimer::new(Instance::Timer1, &peripherals.TIMER1, CounterWidth::Bits32);
///
///     let mut channel = Channel::new(timer).unwrap();
///     channel.attach(500_000, on_tick).unwrap();
///
///     // Twice slower from now on
///     channel.set_interval(1_000_000, on_tick).unwrap();
/// }
/// ```
pub struct Channel<D: TimerDevice> {
    device: D,
    state: State,
    period_us: u32,
}

impl<D: TimerDevice> Channel<D> {
    /// Create an unattached channel driving `device`
    ///
    /// Returns [`Err(Error::InstanceInUse)`](Error::InstanceInUse) if another channel already
    /// drives the same timer instance.
    pub fn new(device: D) -> Result<Self, Error> {
        dispatch::claim(device.instance())?;

        Ok(Self {
            device,
            state: State::Unattached,
            period_us: 0,
        })
    }

    /// Current state of this channel
    pub fn state(&self) -> State {
        self.state
    }

    /// Period of the last successful [`attach`](Channel::attach) or
    /// [`set_interval`](Channel::set_interval), in microseconds
    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    /// Period actually realised by the timer, in nanoseconds
    ///
    /// It differs from the requested period by less than one timer tick.
    pub fn realised_period_ns(&self) -> Option<u64> {
        match self.state {
            State::Running => self
                .device
                .timing()
                .map(|timing| timing.period_ns(&self.device.clock())),
            _ => None,
        }
    }

    /// Timer binding driven by this channel
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Read registers of the timer for diagnostics
    pub fn snapshot(&self) -> RegisterSnapshot {
        self.device.snapshot()
    }

    /// Start calling `callback` every `period_us` microseconds
    ///
    /// Returns:
    /// * [`Ok(())`](core::result::Result::Ok) if the timer is running
    /// * [`Err(Error::AlreadyAttached)`](Error::AlreadyAttached) if the channel is not
    ///   [`Unattached`](State::Unattached)
    /// * [`Err(Error::PeriodOutOfRange)`](Error::PeriodOutOfRange) if the timer cannot realise the
    ///   period. The channel stays unattached
    pub fn attach(&mut self, period_us: u32, callback: Callback) -> Result<(), Error> {
        if self.state != State::Unattached {
            return Err(Error::AlreadyAttached);
        }

        let instance = self.device.instance();
        let result = crit_sect::masked(&mut self.device, |device| {
            let timing = device.configure(period_us)?;
            dispatch::install(instance, callback);
            device.start();
            Ok(timing)
        });

        match result {
            Ok(timing) => {
                self.state = State::Running;
                self.period_us = period_us;
                info!(
                    "{} attached, period {} us, prescaler {}, reload {}",
                    instance, period_us, timing.prescaler, timing.reload
                );
                Ok(())
            }
            Err(e) => {
                warn!("{} attach with period {} us failed: {}", instance, period_us, e);
                Err(e)
            }
        }
    }

    /// Change the period and the callback of a channel
    ///
    /// The timer is stopped, reprogrammed and started again with its interrupt masked, so the
    /// previous callback cannot be called with a half-applied configuration. The phase of the
    /// timer restarts: the first call of `callback` happens `period_us` after this function
    /// returns.
    ///
    /// Returns:
    /// * [`Ok(())`](core::result::Result::Ok) if the timer is running with the new period
    /// * [`Err(Error::NotAttached)`](Error::NotAttached) if the channel is
    ///   [`Unattached`](State::Unattached)
    /// * [`Err(Error::PeriodOutOfRange)`](Error::PeriodOutOfRange) if the timer cannot realise the
    ///   period. The channel enters the [`Failed`](State::Failed) state
    pub fn set_interval(&mut self, period_us: u32, callback: Callback) -> Result<(), Error> {
        if self.state == State::Unattached {
            return Err(Error::NotAttached);
        }

        let instance = self.device.instance();
        let result = crit_sect::masked(&mut self.device, |device| {
            device.stop();
            let timing = match device.configure(period_us) {
                Ok(timing) => timing,
                Err(e) => {
                    dispatch::remove(instance);
                    return Err(e);
                }
            };
            dispatch::install(instance, callback);
            device.start();
            Ok(timing)
        });

        match result {
            Ok(timing) => {
                self.state = State::Running;
                self.period_us = period_us;
                debug!(
                    "{} period changed to {} us, prescaler {}, reload {}",
                    instance, period_us, timing.prescaler, timing.reload
                );
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                error!(
                    "{} period change to {} us failed, timer stopped: {}",
                    instance, period_us, e
                );
                Err(e)
            }
        }
    }

    /// Stop calling the callback
    ///
    /// The timer is stopped and its interrupt masked. Detaching an unattached channel does nothing.
    pub fn detach(&mut self) {
        if self.state == State::Unattached {
            return;
        }

        self.device.disable_irq();
        self.device.stop();
        dispatch::remove(self.device.instance());
        self.state = State::Unattached;
        debug!("{} detached", self.device.instance());
    }
}

impl<D: TimerDevice> Drop for Channel<D> {
    fn drop(&mut self) {
        self.detach();
        dispatch::release(self.device.instance());
    }
}
