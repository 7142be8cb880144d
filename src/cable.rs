//! The pin-level capability the TAP engine is built on.  Hardware backends implement the
//! `Cable` trait: drive an output line, read TDO, and wait.  Nothing above this layer touches
//! hardware registers directly, so the same engine runs on the microcontroller (`gpio`) and on a
//! host (`sim`).
use core::time::Duration;

use embedded_hal::digital::PinState;

use crate::error::Result;

pub mod gpio;
pub mod sim;

/// The four JTAG signal lines.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Pin {
    Tms,
    Tck,
    Tdi,
    Tdo,
}

pub trait Cable {
    /// Drive an output line.  `Pin::Tdo` is an input; backends may reject it with
    /// `ErrorKind::Other`.
    fn set_pin(&mut self, pin: Pin, level: PinState) -> Result<()>;
    /// Sample a line.  Only `Pin::Tdo` is required to be readable.
    fn read_pin(&mut self, pin: Pin) -> Result<PinState>;
    /// Busy-wait for at least `duration`.
    fn delay(&mut self, duration: Duration);
}

impl<T: Cable + ?Sized> Cable for &mut T {
    fn set_pin(&mut self, pin: Pin, level: PinState) -> Result<()> {
        (**self).set_pin(pin, level)
    }

    fn read_pin(&mut self, pin: Pin) -> Result<PinState> {
        (**self).read_pin(pin)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}
