//! The USB side of the bootloader: a control endpoint carrying HID SetReport data in OUT
//! packets.  The dispatcher reads the payload through this trait one byte or word at a time and
//! pulls the next packet when the current one runs dry.
use crate::config::WaitLimit;
use crate::error::{Error, Result};

pub trait Transport {
    /// Acknowledge the SETUP packet of the current control request.
    fn clear_setup(&mut self);
    /// Whether an OUT packet has arrived and is ready to be read.
    fn is_out_received(&mut self) -> bool;
    /// Unread bytes left in the current OUT packet.
    fn bytes_available(&mut self) -> u16;
    fn read_u8(&mut self) -> u8;
    /// Release the current OUT packet so the host can send the next one.
    fn clear_out(&mut self);
    fn clear_status_stage(&mut self);
    /// Drop off the bus.
    fn detach(&mut self);

    fn read_u16_le(&mut self) -> u16 {
        let lo = self.read_u8();
        let hi = self.read_u8();
        u16::from_le_bytes([lo, hi])
    }

    /// Poll until an OUT packet arrives.
    fn wait_out_ready(&mut self, limit: WaitLimit) -> Result<()> {
        if limit.poll(|| self.is_out_received()) {
            Ok(())
        } else {
            log::warn!("timed out waiting for an OUT packet");
            Err(Error::Timeout)
        }
    }

    /// Make sure there is something to read, moving on to the next OUT packet if the current one
    /// is exhausted.
    fn refill(&mut self, limit: WaitLimit) -> Result<()> {
        if self.bytes_available() == 0 {
            self.clear_out();
            self.wait_out_ready(limit)?;
        }
        Ok(())
    }
}
