use core::fmt;

/// Errors reported by timer channels
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The requested period cannot be represented by the timer's prescaler and counter width
    PeriodOutOfRange,
    /// The channel already runs a callback and must be detached first
    AlreadyAttached,
    /// The channel has no callback attached
    NotAttached,
    /// Another channel already uses the selected timer instance
    InstanceInUse,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::PeriodOutOfRange => "period out of range for this timer",
            Error::AlreadyAttached => "channel already attached",
            Error::NotAttached => "channel not attached",
            Error::InstanceInUse => "timer instance already in use",
        };
        f.write_str(text)
    }
}
