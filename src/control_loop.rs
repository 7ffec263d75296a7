//! Cooperative foreground loop supervising timer channels
//!
//! The loop runs in thread mode and never blocks, except for waiting for the console at
//! [`start`](ForegroundLoop::start). On each [`poll`](ForegroundLoop::poll) it checks:
//!
//! * the console input: any received byte requests a register dump of every attached channel
//! * the report interval: counters of all channels are printed
//! * the reconfigure interval: the period multiplier is toggled and every attached channel gets
//!   its scaled period with [`set_interval`](crate::channel::Channel::set_interval)
//!
//! Intervals are compared using wrapping arithmetic, so the millisecond clock may overflow.
//!
//! A failed reconfiguration is reported on the console and the loop continues. The failed channel
//! stays stopped until the next reconfiguration succeeds.

use crate::channel::{Channel, State};
use crate::diagnostics;
use crate::dispatch::Callback;
use crate::error::Error;
use crate::hw::timer::traits::TimerDevice;
use crate::telemetry::TelemetryCounter;
use core::fmt::Write;

#[cfg(test)]
use mockall::*;

/// Monotonic millisecond clock
#[cfg_attr(test, automock)]
pub trait Clock {
    /// Milliseconds since an arbitrary origin, wrapping around at `u32::MAX`
    fn now_ms(&self) -> u32;
}

/// Text console used for reports
///
/// Written text may be buffered, so the console must not be used from an ISR.
pub trait Console: Write {
    /// Check if the console is ready to transmit
    fn is_ready(&self) -> bool;

    /// Discard all received bytes and return their number
    fn drain_input(&mut self) -> usize;
}

/// Intervals and period multipliers used by [`ForegroundLoop`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LoopConfig {
    /// Interval between counter reports
    pub report_interval_ms: u32,
    /// Interval between period changes
    pub reconfigure_interval_ms: u32,
    /// Multipliers of base periods used alternately, starting from the first one
    pub multipliers: [u32; 2],
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            report_interval_ms: 10_000,
            reconfigure_interval_ms: 20_000,
            multipliers: [1, 2],
        }
    }
}

/// A channel supervised by [`ForegroundLoop`], with its callback and the callback's counter
pub struct ManagedChannel<D: TimerDevice> {
    label: &'static str,
    channel: Channel<D>,
    base_period_us: u32,
    callback: Callback,
    counter: &'static TelemetryCounter,
}

impl<D: TimerDevice> ManagedChannel<D> {
    /// Bundle a channel with its base period, callback and the counter the callback increments
    pub fn new(
        label: &'static str,
        channel: Channel<D>,
        base_period_us: u32,
        callback: Callback,
        counter: &'static TelemetryCounter,
    ) -> Self {
        Self {
            label,
            channel,
            base_period_us,
            callback,
            counter,
        }
    }

    /// Name used in reports
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// The supervised channel
    pub fn channel(&self) -> &Channel<D> {
        &self.channel
    }

    /// Counter incremented by the callback
    pub fn counter(&self) -> &'static TelemetryCounter {
        self.counter
    }

    fn scaled_period(&self, multiplier: u32) -> Result<u32, Error> {
        self.base_period_us
            .checked_mul(multiplier)
            .ok_or(Error::PeriodOutOfRange)
    }
}

/// Foreground loop supervising `N` channels
pub struct ForegroundLoop<D: TimerDevice, C: Clock, S: Console, const N: usize> {
    config: LoopConfig,
    clock: C,
    console: S,
    channels: [ManagedChannel<D>; N],
    started_ms: u32,
    last_report_ms: u32,
    last_reconfigure_ms: u32,
    multiplier_index: usize,
}

impl<D: TimerDevice, C: Clock, S: Console, const N: usize> ForegroundLoop<D, C, S, N> {
    /// Create a loop. Channels are not attached until [`start`](ForegroundLoop::start)
    pub fn new(config: LoopConfig, clock: C, console: S, channels: [ManagedChannel<D>; N]) -> Self {
        Self {
            config,
            clock,
            console,
            channels,
            started_ms: 0,
            last_report_ms: 0,
            last_reconfigure_ms: 0,
            multiplier_index: 0,
        }
    }

    /// Supervised channels
    pub fn channels(&self) -> &[ManagedChannel<D>; N] {
        &self.channels
    }

    /// Console used for reports
    pub fn console(&self) -> &S {
        &self.console
    }

    /// Multiplier currently applied to base periods
    pub fn multiplier(&self) -> u32 {
        self.config.multipliers[self.multiplier_index]
    }

    /// Wait for the console, then attach every channel
    ///
    /// The result of each attach is reported on the console. A channel which failed to attach is
    /// left unattached and skipped by later reconfigurations.
    ///
    /// Returns the number of attached channels.
    pub fn start(&mut self) -> usize {
        while !self.console.is_ready() {}

        let now = self.clock.now_ms();
        self.started_ms = now;
        self.last_report_ms = now;
        self.last_reconfigure_ms = now;

        let multiplier = self.multiplier();
        let mut attached = 0;
        for managed in self.channels.iter_mut() {
            let instance = managed.channel.device().instance();
            let result = managed
                .scaled_period(multiplier)
                .and_then(|period_us| managed.channel.attach(period_us, managed.callback));

            // Console errors are not fatal, there is nowhere else to report them
            let _ = match result {
                Ok(()) => {
                    attached += 1;
                    writeln!(
                        self.console,
                        "Starting {} on {} OK, period = {} us",
                        managed.label,
                        instance,
                        managed.channel.period_us()
                    )
                }
                Err(e) => writeln!(
                    self.console,
                    "Can't start {} on {}: {}",
                    managed.label, instance, e
                ),
            };
        }

        info!("{} of {} channels attached", attached, N);
        attached
    }

    /// Run a single iteration of the loop without blocking
    pub fn poll(&mut self) {
        let now = self.clock.now_ms();

        if self.console.drain_input() > 0 {
            self.dump_registers();
        }

        if now.wrapping_sub(self.last_report_ms) >= self.config.report_interval_ms {
            self.last_report_ms = now;
            self.report(now);
        }

        if now.wrapping_sub(self.last_reconfigure_ms) >= self.config.reconfigure_interval_ms {
            self.last_reconfigure_ms = now;
            self.reconfigure();
        }
    }

    /// Poll forever
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }

    fn report(&mut self, now: u32) {
        let elapsed_ms = now.wrapping_sub(self.started_ms);
        let counters = self
            .channels
            .iter()
            .map(|managed| (managed.label, managed.counter.get()));
        let _ = diagnostics::write_counters(&mut self.console, elapsed_ms, counters);
    }

    fn reconfigure(&mut self) {
        self.multiplier_index = (self.multiplier_index + 1) % self.config.multipliers.len();
        let multiplier = self.multiplier();

        for managed in self.channels.iter_mut() {
            if managed.channel.state() == State::Unattached {
                continue;
            }

            let instance = managed.channel.device().instance();
            let result = managed
                .scaled_period(multiplier)
                .and_then(|period_us| managed.channel.set_interval(period_us, managed.callback));

            let _ = match result {
                Ok(()) => writeln!(
                    self.console,
                    "Changing {} on {} period to {} us",
                    managed.label,
                    instance,
                    managed.channel.period_us()
                ),
                Err(e) => {
                    warn!("{} left stopped after failed period change", instance);
                    writeln!(
                        self.console,
                        "Failed to change {} on {} period (x{}): {}, timer stopped",
                        managed.label, instance, multiplier, e
                    )
                }
            };
        }
    }

    fn dump_registers(&mut self) {
        for managed in self.channels.iter() {
            if managed.channel.state() == State::Unattached {
                continue;
            }
            let snapshot = managed.channel.snapshot();
            let _ = diagnostics::write_register_dump(
                &mut self.console,
                managed.label,
                managed.channel.device().instance(),
                &snapshot,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::hw::timer::sim::SimTimer;
    use crate::hw::timer::Instance;
    use core::cell::Cell;
    use serial_test::serial;

    struct TestClock<'a>(&'a Cell<u32>);

    impl Clock for TestClock<'_> {
        fn now_ms(&self) -> u32 {
            self.0.get()
        }
    }

    struct TestConsole<'a> {
        output: String,
        input: &'a Cell<usize>,
        busy_polls: Cell<u32>,
    }

    impl<'a> TestConsole<'a> {
        fn new(input: &'a Cell<usize>) -> Self {
            Self {
                output: String::new(),
                input,
                busy_polls: Cell::new(0),
            }
        }
    }

    impl Write for TestConsole<'_> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            self.output.push_str(s);
            Ok(())
        }
    }

    impl Console for TestConsole<'_> {
        fn is_ready(&self) -> bool {
            let busy_polls = self.busy_polls.get();
            if busy_polls == 0 {
                true
            } else {
                self.busy_polls.set(busy_polls - 1);
                false
            }
        }

        fn drain_input(&mut self) -> usize {
            self.input.replace(0)
        }
    }

    type TestLoop<'a, const N: usize> = ForegroundLoop<SimTimer, TestClock<'a>, TestConsole<'a>, N>;

    fn managed(
        label: &'static str,
        instance: Instance,
        base_period_us: u32,
        callback: Callback,
        counter: &'static TelemetryCounter,
    ) -> ManagedChannel<SimTimer> {
        let channel = Channel::new(SimTimer::new(instance)).unwrap();
        ManagedChannel::new(label, channel, base_period_us, callback, counter)
    }

    /// Move simulated time by 1 ms steps, polling the loop after each step
    fn run_for<const N: usize>(lp: &mut TestLoop<'_, N>, now: &Cell<u32>, duration_ms: u32) {
        for _ in 0..duration_ms {
            now.set(now.get().wrapping_add(1));
            for managed in lp.channels().iter() {
                managed.channel().device().advance(1_000);
            }
            lp.poll();
        }
    }

    #[test]
    #[serial]
    fn test_start_reports_each_channel() {
        static TICKS_A: TelemetryCounter = TelemetryCounter::new();
        static TICKS_B: TelemetryCounter = TelemetryCounter::new();
        fn tick_a() {
            TICKS_A.increment();
        }
        fn tick_b() {
            TICKS_B.increment();
        }

        dispatch::reset();
        let now = Cell::new(0);
        let input = Cell::new(0);
        let console = TestConsole::new(&input);
        console.busy_polls.set(3);

        let channels = [
            managed("A", Instance::Timer1, 500_000, tick_a, &TICKS_A),
            // Longer than the simulated timer can count
            managed("B", Instance::Timer2, 10_000_000, tick_b, &TICKS_B),
        ];
        let mut lp = ForegroundLoop::new(
            LoopConfig::default(),
            TestClock(&now),
            console,
            channels,
        );

        assert_eq!(lp.start(), 1);

        let output = &lp.console().output;
        assert!(output.contains("Starting A on TIMER1 OK, period = 500000 us\n"));
        assert!(output.contains("Can't start B on TIMER2: period out of range for this timer\n"));
        assert_eq!(lp.console().busy_polls.get(), 0);
        assert_eq!(lp.channels()[0].channel().state(), State::Running);
        assert_eq!(lp.channels()[1].channel().state(), State::Unattached);
    }

    #[test]
    #[serial]
    fn test_counters_follow_doubled_periods() {
        static TICKS_A: TelemetryCounter = TelemetryCounter::new();
        static TICKS_B: TelemetryCounter = TelemetryCounter::new();
        fn tick_a() {
            TICKS_A.increment();
        }
        fn tick_b() {
            TICKS_B.increment();
        }

        dispatch::reset();
        let now = Cell::new(0);
        let input = Cell::new(0);
        let config = LoopConfig {
            report_interval_ms: 10_000,
            reconfigure_interval_ms: 10_000,
            multipliers: [1, 2],
        };
        let channels = [
            managed("A", Instance::Timer1, 500_000, tick_a, &TICKS_A),
            managed("B", Instance::Timer2, 1_000_000, tick_b, &TICKS_B),
        ];
        let mut lp = ForegroundLoop::new(
            config,
            TestClock(&now),
            TestConsole::new(&input),
            channels,
        );
        assert_eq!(lp.start(), 2);

        run_for(&mut lp, &now, 10_000);
        assert_eq!(TICKS_A.get(), 20);
        assert_eq!(TICKS_B.get(), 10);
        assert_eq!(lp.multiplier(), 2);
        assert_eq!(lp.channels()[0].channel().period_us(), 1_000_000);
        assert_eq!(lp.channels()[1].channel().period_us(), 2_000_000);

        run_for(&mut lp, &now, 10_000);
        assert_eq!(TICKS_A.get(), 30);
        assert_eq!(TICKS_B.get(), 15);
        assert_eq!(lp.multiplier(), 1);

        let output = &lp.console().output;
        assert!(output.contains("[10000 ms] A = 20, B = 10\n"));
        assert!(output.contains("Changing A on TIMER1 period to 1000000 us\n"));
        assert!(output.contains("Changing B on TIMER2 period to 2000000 us\n"));
        assert!(output.contains("[20000 ms] A = 30, B = 15\n"));
        assert!(output.contains("Changing B on TIMER2 period to 1000000 us\n"));
    }

    #[test]
    #[serial]
    fn test_failed_reconfiguration_is_reported_and_retried() {
        static TICKS: TelemetryCounter = TelemetryCounter::new();
        fn tick() {
            TICKS.increment();
        }

        dispatch::reset();
        let now = Cell::new(0);
        let input = Cell::new(0);
        let config = LoopConfig {
            report_interval_ms: 1_000_000,
            reconfigure_interval_ms: 10_000,
            multipliers: [1, 2],
        };
        // 40000 ticks at the largest prescaler, doubled period does not fit the simulated timer
        let channels = [managed("A", Instance::Timer3, 5_120_000, tick, &TICKS)];
        let mut lp = ForegroundLoop::new(
            config,
            TestClock(&now),
            TestConsole::new(&input),
            channels,
        );
        lp.start();

        run_for(&mut lp, &now, 10_000);
        assert_eq!(TICKS.get(), 1);
        assert_eq!(lp.channels()[0].channel().state(), State::Failed);
        assert!(lp.console().output.contains(
            "Failed to change A on TIMER3 period (x2): period out of range for this timer, \
             timer stopped\n"
        ));

        // Stopped channel does not count
        run_for(&mut lp, &now, 10_000);
        assert_eq!(TICKS.get(), 1);

        // Back to x1
        assert_eq!(lp.channels()[0].channel().state(), State::Running);
        assert!(lp
            .console()
            .output
            .contains("Changing A on TIMER3 period to 5120000 us\n"));
        run_for(&mut lp, &now, 5_120);
        assert_eq!(TICKS.get(), 2);
    }

    #[test]
    #[serial]
    fn test_input_requests_register_dump() {
        static TICKS_A: TelemetryCounter = TelemetryCounter::new();
        static TICKS_B: TelemetryCounter = TelemetryCounter::new();
        fn tick_a() {
            TICKS_A.increment();
        }
        fn tick_b() {
            TICKS_B.increment();
        }

        dispatch::reset();
        let now = Cell::new(0);
        let input = Cell::new(0);
        let channels = [
            managed("A", Instance::Timer1, 1_000, tick_a, &TICKS_A),
            managed("B", Instance::Timer2, 0, tick_b, &TICKS_B),
        ];
        let mut lp = ForegroundLoop::new(
            LoopConfig::default(),
            TestClock(&now),
            TestConsole::new(&input),
            channels,
        );
        lp.start();
        run_for(&mut lp, &now, 5);
        let ticks_before = TICKS_A.get();
        let output_before = lp.console().output.len();

        input.set(3);
        lp.poll();

        assert_eq!(input.get(), 0);
        let dump = &lp.console().output[output_before..];
        assert!(dump.starts_with("A on TIMER1, running\n"));
        assert!(dump.contains("CC[0]      = 0x000003e8"));
        assert!(!dump.contains("B on TIMER2"));

        assert_eq!(TICKS_A.get(), ticks_before);
        assert_eq!(lp.channels()[0].channel().state(), State::Running);

        // Nothing more without input
        let output_len = lp.console().output.len();
        lp.poll();
        assert_eq!(lp.console().output.len(), output_len);
    }

    #[test]
    #[serial]
    fn test_intervals_survive_clock_wraparound() {
        let input = Cell::new(0);
        let config = LoopConfig {
            report_interval_ms: 5_000,
            reconfigure_interval_ms: u32::MAX,
            multipliers: [1, 2],
        };

        let mut seq = Sequence::new();
        let mut clock = MockClock::new();
        for now in [u32::MAX - 499, 4_499, 4_500] {
            clock
                .expect_now_ms()
                .times(1)
                .in_sequence(&mut seq)
                .return_const(now);
        }

        let mut lp = ForegroundLoop::<SimTimer, _, _, 0>::new(
            config,
            clock,
            TestConsole::new(&input),
            [],
        );
        lp.start();

        lp.poll();
        assert_eq!(lp.console().output, "");

        lp.poll();
        assert_eq!(lp.console().output, "[5000 ms]\n");
    }
}
