//! Status LED blinking.  The blink pattern tells the user what the bootloader is doing: a short
//! flash every few seconds while waiting for a host, steady once attached, and an even blink
//! while data is arriving.
use embedded_hal::digital::{OutputPin, PinState};

use crate::error::{Error, Result};

/// Something the dispatcher did that the outside world may want to show.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Activity {
    /// A control request arrived from the host
    Attached,
    /// The first OUT packet of a SetReport arrived
    Receiving,
    /// An FPGA configuration finished
    ConfigFinished,
}

pub trait ActivityListener {
    fn activity(&mut self, event: Activity);
}

/// LED on and off times, in timer ticks.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct BlinkRate {
    pub on: u16,
    pub off: u16,
}

impl BlinkRate {
    pub const WAITING: BlinkRate = BlinkRate { on: 1000, off: 20000 };
    pub const ATTACHED: BlinkRate = BlinkRate { on: 1000, off: 1 };
    pub const BUSY: BlinkRate = BlinkRate { on: 1600, off: 1600 };
}

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct StatusLed {
    rate: BlinkRate,
}

impl StatusLed {
    pub fn new() -> Self {
        StatusLed { rate: BlinkRate::WAITING }
    }

    pub fn rate(&self) -> BlinkRate {
        self.rate
    }

    /// Whether the LED should be lit at free-running timer value `tick`.
    pub fn is_lit(&self, tick: u16) -> bool {
        let period = self.rate.on as u32 + self.rate.off as u32;
        (tick as u32) % period < self.rate.on as u32
    }

    /// Drive `led` for timer value `tick`.  Meant to be called from the main loop.
    pub fn update<P: OutputPin>(&self, tick: u16, led: &mut P) -> Result<()> {
        led.set_state(PinState::from(self.is_lit(tick))).map_err(Error::pin)
    }
}

impl Default for StatusLed {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityListener for StatusLed {
    fn activity(&mut self, event: Activity) {
        self.rate = match event {
            Activity::Attached | Activity::ConfigFinished => BlinkRate::ATTACHED,
            Activity::Receiving => BlinkRate::BUSY,
        };
    }
}
