//! Bit-banged JTAG over four microcontroller GPIO lines.
use core::time::Duration;

use embedded_hal::{delay::DelayNs, digital::{ErrorKind, InputPin, OutputPin, PinState}};

use crate::cable::{Cable, Pin};
use crate::error::{Error, Result};

pub struct Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    delay: Delay,
    clock: Clk,
    tdi: Tdi,
    tdo: Tdo,
    tms: Tms
}

impl<Clk, Tdi, Tdo, Tms, Delay> Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    /// Take ownership of the JTAG lines.  TCK idles high and TMS starts low.
    pub fn new(mut clock: Clk, tdi: Tdi, tdo: Tdo, mut tms: Tms, delay: Delay) -> Result<Self> {
        clock.set_high().map_err(Error::pin)?;
        tms.set_low().map_err(Error::pin)?;
        Ok(Gpio { clock, tdi, tdo, tms, delay })
    }

    /// Give the pins back, e.g. before jumping to the application.
    pub fn release(self) -> (Clk, Tdi, Tdo, Tms, Delay) {
        (self.clock, self.tdi, self.tdo, self.tms, self.delay)
    }
}

impl<Clk, Tdi, Tdo, Tms, Delay> Cable for Gpio<Clk, Tdi, Tdo, Tms, Delay> where Clk: OutputPin, Tdi: OutputPin, Tdo: InputPin, Tms: OutputPin, Delay: DelayNs {
    fn set_pin(&mut self, pin: Pin, level: PinState) -> Result<()> {
        match pin {
            Pin::Tck => self.clock.set_state(level).map_err(Error::pin),
            Pin::Tdi => self.tdi.set_state(level).map_err(Error::pin),
            Pin::Tms => self.tms.set_state(level).map_err(Error::pin),
            Pin::Tdo => Err(Error::Pin(ErrorKind::Other)),
        }
    }

    fn read_pin(&mut self, pin: Pin) -> Result<PinState> {
        match pin {
            Pin::Tdo => {
                let high = self.tdo.is_high().map_err(Error::pin)?;
                Ok(PinState::from(high))
            }
            // The outputs are write-only here
            _ => Err(Error::Pin(ErrorKind::Other)),
        }
    }

    fn delay(&mut self, duration: Duration) {
        // DelayNs takes u32; split anything longer than ~4 s into millisecond chunks
        let nanos = duration.as_nanos();
        if nanos <= u32::MAX as u128 {
            self.delay.delay_ns(nanos as u32);
        } else {
            let mut millis = duration.as_millis();
            while millis > 0 {
                let chunk = millis.min(u32::MAX as u128) as u32;
                self.delay.delay_ms(chunk);
                millis -= chunk as u128;
            }
        }
    }
}
