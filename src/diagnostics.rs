//! Human readable reports of timer channels
//!
//! The functions only format values passed to them, so they never change the state of a timer.
//! They write to a buffered console and are not safe to call from an ISR.

use crate::hw::timer::{Instance, RegisterSnapshot};
use core::fmt::{self, Write};

/// Write a register dump of a timer
///
/// Each register is printed in its own line, in hexadecimal, with a short description.
///
/// # Examples
///
/// ```
/// use nrf_periodic_timer::diagnostics::write_register_dump;
/// use nrf_periodic_timer::hw::timer::{Instance, RegisterSnapshot};
///
/// let mut out = String::new();
/// let snapshot = RegisterSnapshot { compare: 0x7a1200, running: true, ..Default::default() };
/// write_register_dump(&mut out, "blink", Instance::Timer1, &snapshot).unwrap();
///
/// assert!(out.starts_with("blink on TIMER1, running\n"));
/// assert!(out.contains("CC[0]      = 0x007a1200"));
/// ```
pub fn write_register_dump<W: Write + ?Sized>(
    out: &mut W,
    label: &str,
    instance: Instance,
    snapshot: &RegisterSnapshot,
) -> fmt::Result {
    let state = if snapshot.running {
        "running"
    } else {
        "stopped"
    };
    writeln!(out, "{} on {}, {}", label, instance, state)?;

    let fields = [
        ("MODE", snapshot.control, "Timer mode, 0 = timer"),
        ("BITMODE", snapshot.width, "Counter width"),
        ("PRESCALER", snapshot.prescaler, "Clock divided by 2^n"),
        ("SHORTS", snapshot.shortcuts, "Bit 0: clear on COMPARE[0]"),
        ("INTEN", snapshot.interrupts, "Enabled interrupts"),
        ("EVENTS", snapshot.status, "Pending COMPARE[0] event"),
        ("CC[0]", snapshot.compare, "Reload value in ticks"),
        ("COUNTER", snapshot.counter, "Counter at dump time"),
    ];
    for (name, value, description) in fields {
        writeln!(out, "  {:<10} = {:#010x}  {}", name, value, description)?;
    }
    Ok(())
}

/// Write a single line with elapsed time and a counter of each channel
///
/// # Examples
///
/// ```
/// use nrf_periodic_timer::diagnostics::write_counters;
///
/// let mut out = String::new();
/// write_counters(&mut out, 10_000, [("A", 20), ("B", 10)]).unwrap();
///
/// assert_eq!(out, "[10000 ms] A = 20, B = 10\n");
/// ```
pub fn write_counters<'a, W, I>(out: &mut W, elapsed_ms: u32, counters: I) -> fmt::Result
where
    W: Write + ?Sized,
    I: IntoIterator<Item = (&'a str, u32)>,
{
    write!(out, "[{} ms]", elapsed_ms)?;
    for (i, (label, count)) in counters.into_iter().enumerate() {
        let separator = if i == 0 { " " } else { ", " };
        write!(out, "{}{} = {}", separator, label, count)?;
    }
    writeln!(out)
}
