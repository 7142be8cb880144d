//! Simulated targets, so the engine and everything above it can run on a host.  Both simulators
//! follow TMS on every rising TCK edge with their own copy of the TAP controller and record what
//! they saw.
use alloc::vec::Vec;
use core::time::Duration;

use embedded_hal::digital::{ErrorKind, PinState};

use crate::cable::{Cable, Pin};
use crate::error::{Error, Result};
use crate::statemachine::JtagState;

/// Line levels on one rising TCK edge.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Pulse {
    pub tms: bool,
    pub tdi: bool,
    pub tdo: bool,
}

/// TDO wired straight back to TDI.
pub struct Loopback {
    pub tms: bool,
    pub tck: bool,
    pub tdi: bool,
    pub state: JtagState,
    pub pulses: Vec<Pulse>,
    pub delayed: Duration,
}

impl Loopback {
    pub fn new() -> Self {
        Loopback {
            tms: false,
            tck: true,
            tdi: false,
            state: JtagState::Reset,
            pulses: Vec::new(),
            delayed: Duration::ZERO,
        }
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl Cable for Loopback {
    fn set_pin(&mut self, pin: Pin, level: PinState) -> Result<()> {
        let high = level == PinState::High;
        match pin {
            Pin::Tms => self.tms = high,
            Pin::Tdi => self.tdi = high,
            Pin::Tck => {
                if high && !self.tck {
                    self.pulses.push(Pulse { tms: self.tms, tdi: self.tdi, tdo: self.tdi });
                    self.state = self.state.next(self.tms);
                }
                self.tck = high;
            }
            Pin::Tdo => return Err(Error::Pin(ErrorKind::Other)),
        }
        Ok(())
    }

    fn read_pin(&mut self, pin: Pin) -> Result<PinState> {
        let high = match pin {
            Pin::Tms => self.tms,
            Pin::Tck => self.tck,
            Pin::Tdi | Pin::Tdo => self.tdi,
        };
        Ok(PinState::from(high))
    }

    fn delay(&mut self, duration: Duration) {
        self.delayed += duration;
    }
}

/// One device on a simulated scan chain.  A device with an IDCODE answers it when that
/// instruction is loaded; every other instruction, and every device without one, selects the
/// one-bit bypass register.
#[derive(Clone,Debug)]
pub struct SimTap {
    ir_len: u8,
    idcode: Option<(u32, u32)>,
    ir: u32,
    ir_shift: u32,
    dr_shift: u64,
    dr_len: u8,
}

impl SimTap {
    pub fn device(ir_len: u8, idcode_inst: u32, idcode: u32) -> Self {
        let mut tap = Self::bypass(ir_len);
        tap.idcode = Some((idcode_inst, idcode));
        tap.reset();
        tap
    }

    pub fn bypass(ir_len: u8) -> Self {
        let mut tap = SimTap { ir_len, idcode: None, ir: 0, ir_shift: 0, dr_shift: 0, dr_len: 1 };
        tap.reset();
        tap
    }

    /// Instruction currently latched.
    pub fn ir(&self) -> u32 {
        self.ir
    }

    fn ir_mask(&self) -> u32 {
        (1u32 << self.ir_len) - 1
    }

    fn reset(&mut self) {
        self.ir = match self.idcode {
            Some((inst, _)) => inst,
            None => self.ir_mask(),
        };
    }

    fn capture_ir(&mut self) {
        self.ir_shift = 0b01;
    }

    fn capture_dr(&mut self) {
        match self.idcode {
            Some((inst, id)) if inst == self.ir => {
                self.dr_shift = id as u64;
                self.dr_len = 32;
            }
            _ => {
                self.dr_shift = 0;
                self.dr_len = 1;
            }
        }
    }

    fn out(&self, reg: JtagState) -> bool {
        match reg {
            JtagState::ShiftIR => self.ir_shift & 1 != 0,
            _ => self.dr_shift & 1 != 0,
        }
    }

    fn shift(&mut self, reg: JtagState, tdi: bool) {
        if reg == JtagState::ShiftIR {
            self.ir_shift = (self.ir_shift >> 1) | ((tdi as u32) << (self.ir_len - 1));
        } else {
            self.dr_shift = (self.dr_shift >> 1) | ((tdi as u64) << (self.dr_len - 1));
        }
    }
}

/// The bits clocked into the chain during one data register scan, recorded on Update-DR.
#[derive(Clone,Debug,PartialEq,Eq)]
pub struct DrScan {
    /// Instruction of the device nearest TDI during the scan
    pub ir: u32,
    pub bits: Vec<bool>,
}

impl DrScan {
    /// Pack the scanned bits into bytes, LSB first, after dropping `skip` header bits.
    pub fn bytes(&self, skip: usize) -> Vec<u8> {
        self.bits[skip.min(self.bits.len())..]
            .chunks(8)
            .map(|c| c.iter().enumerate().fold(0u8, |b, (i, &bit)| b | ((bit as u8) << i)))
            .collect()
    }
}

/// A scan chain of simulated devices.  `taps[0]` is nearest TDI.
pub struct SimChain {
    pub taps: Vec<SimTap>,
    pub state: JtagState,
    /// Instruction latched by `taps[0]` on every Update-IR
    pub instructions: Vec<u32>,
    pub scans: Vec<DrScan>,
    /// Rising edges spent in Run-Test/Idle
    pub idle_clocks: u32,
    pub pulses: usize,
    tms: bool,
    tck: bool,
    tdi: bool,
    scanning: Vec<bool>,
}

impl SimChain {
    pub fn new(taps: Vec<SimTap>) -> Self {
        SimChain {
            taps,
            state: JtagState::Reset,
            instructions: Vec::new(),
            scans: Vec::new(),
            idle_clocks: 0,
            pulses: 0,
            tms: false,
            tck: true,
            tdi: false,
            scanning: Vec::new(),
        }
    }

    fn tdo(&self) -> bool {
        match (self.state, self.taps.last()) {
            (JtagState::ShiftIR | JtagState::ShiftDR, Some(tap)) => tap.out(self.state),
            (JtagState::ShiftIR | JtagState::ShiftDR, None) => self.tdi,
            _ => false,
        }
    }

    fn rising_edge(&mut self) {
        self.pulses += 1;
        match self.state {
            JtagState::Idle if !self.tms => self.idle_clocks += 1,
            JtagState::CaptureIR => self.taps.iter_mut().for_each(SimTap::capture_ir),
            JtagState::CaptureDR => {
                self.taps.iter_mut().for_each(SimTap::capture_dr);
                self.scanning.clear();
            }
            JtagState::ShiftIR | JtagState::ShiftDR => {
                let reg = self.state;
                if reg == JtagState::ShiftDR {
                    self.scanning.push(self.tdi);
                }
                let mut bit = self.tdi;
                for tap in self.taps.iter_mut() {
                    let out = tap.out(reg);
                    tap.shift(reg, bit);
                    bit = out;
                }
            }
            _ => {}
        }

        self.state = self.state.next(self.tms);
        match self.state {
            JtagState::Reset => self.taps.iter_mut().for_each(SimTap::reset),
            JtagState::UpdateIR => {
                for tap in self.taps.iter_mut() {
                    tap.ir = tap.ir_shift & tap.ir_mask();
                }
                if let Some(tap) = self.taps.first() {
                    self.instructions.push(tap.ir);
                }
            }
            JtagState::UpdateDR => {
                let ir = self.taps.first().map_or(0, |t| t.ir);
                let bits = core::mem::take(&mut self.scanning);
                self.scans.push(DrScan { ir, bits });
            }
            _ => {}
        }
    }
}

impl Cable for SimChain {
    fn set_pin(&mut self, pin: Pin, level: PinState) -> Result<()> {
        let high = level == PinState::High;
        match pin {
            Pin::Tms => self.tms = high,
            Pin::Tdi => self.tdi = high,
            Pin::Tck => {
                if high && !self.tck {
                    self.rising_edge();
                }
                self.tck = high;
            }
            Pin::Tdo => return Err(Error::Pin(ErrorKind::Other)),
        }
        Ok(())
    }

    fn read_pin(&mut self, pin: Pin) -> Result<PinState> {
        let high = match pin {
            Pin::Tms => self.tms,
            Pin::Tck => self.tck,
            Pin::Tdi => self.tdi,
            Pin::Tdo => self.tdo(),
        };
        Ok(PinState::from(high))
    }

    fn delay(&mut self, _duration: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    fn clock(chain: &mut SimChain, tms: &[u8], tdi: bool) -> Vec<bool> {
        let mut out = Vec::new();
        for &t in tms {
            chain.set_pin(Pin::Tms, PinState::from(t != 0)).unwrap();
            chain.set_pin(Pin::Tdi, PinState::from(tdi)).unwrap();
            chain.set_pin(Pin::Tck, PinState::Low).unwrap();
            out.push(chain.read_pin(Pin::Tdo).unwrap() == PinState::High);
            chain.set_pin(Pin::Tck, PinState::High).unwrap();
        }
        out
    }

    #[test]
    fn chain_follows_tms() {
        let mut chain = SimChain::new(vec![SimTap::bypass(4)]);
        clock(&mut chain, &[0, 1, 0, 0], false);
        assert_eq!(chain.state, JtagState::ShiftDR);
        clock(&mut chain, &[1, 1, 1, 1, 1], false);
        assert_eq!(chain.state, JtagState::Reset);
        assert_eq!(chain.pulses, 9);
    }

    #[test]
    fn reads_idcode_after_reset() {
        let mut chain = SimChain::new(vec![SimTap::device(6, 0x09, 0xf5046093)]);
        clock(&mut chain, &[0, 1, 0, 0], false);
        let bits = clock(&mut chain, &[0; 32], false);
        let id = bits.iter().enumerate().fold(0u32, |v, (i, &b)| v | ((b as u32) << i));
        assert_eq!(id, 0xf5046093);
    }

    #[test]
    fn dr_scan_bytes() {
        let scan = DrScan { ir: 5, bits: vec![false, true, false, true, true, true, true, false, false, true] };
        assert_eq!(scan.bytes(1), [0x3d, 0x01]);
        assert_eq!(scan.bytes(20), Vec::<u8>::new());
    }

    #[test]
    fn loopback_echoes_tdi() {
        let mut wire = Loopback::new();
        wire.set_pin(Pin::Tdi, PinState::High).unwrap();
        assert_eq!(wire.read_pin(Pin::Tdo).unwrap(), PinState::High);
        assert!(wire.set_pin(Pin::Tdo, PinState::Low).is_err());
    }
}
