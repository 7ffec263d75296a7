//! Hardware abstraction of the peripherals used by timer channels

pub mod timer;
