//! Spartan-3E configuration over JTAG, built on `JtagSM`.
use embedded_hal::digital::OutputPin;

use crate::cable::Cable;
use crate::error::{Error, Result};
use crate::statemachine::{JtagSM, JtagState};

/// A JTAG instruction: opcode and instruction register width.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub bits: u8,
}

impl Instruction {
    /// Only 6 and 8 bit instruction registers are supported.
    pub const fn new(opcode: u8, bits: u8) -> Option<Self> {
        match bits {
            6 | 8 => Some(Instruction { opcode, bits }),
            _ => None,
        }
    }

    pub const IDCODE: Instruction = Instruction { opcode: 0x09, bits: 6 };
    /// Same as pulsing PROG_B
    pub const JPROGRAM: Instruction = Instruction { opcode: 0x0b, bits: 6 };
    pub const CFG_IN: Instruction = Instruction { opcode: 0x05, bits: 6 };
    pub const JSTART: Instruction = Instruction { opcode: 0x0c, bits: 6 };
}

/// Clocks in Run-Test/Idle between JPROGRAM and loading the configuration
pub const INIT_CLOCKS: u32 = 14_000;
/// Clocks in Run-Test/Idle after JSTART for the startup sequence
pub const STARTUP_CLOCKS: u32 = 100;

/// The operations the command dispatcher needs from a configurable FPGA.
pub trait FpgaTarget {
    fn set_power(&mut self, on: bool) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
    fn get_id_code(&mut self) -> Result<u32>;
    fn init_config(&mut self, jtag_driven: bool) -> Result<()>;
    fn send_config_byte(&mut self, byte: u8, first: bool, last: bool) -> Result<()>;
    fn finish_config(&mut self) -> Result<()>;
}

pub struct Fpga<C, P> {
    pub jtag: JtagSM<C>,
    power: P,
}

impl<C: Cable, P: OutputPin> Fpga<C, P> {
    pub fn new(jtag: JtagSM<C>, power: P) -> Self {
        Fpga { jtag, power }
    }

    pub fn release(self) -> (JtagSM<C>, P) {
        (self.jtag, self.power)
    }

    fn instruction(&mut self, inst: Instruction) -> Result<()> {
        self.jtag.shift_instruction(inst.opcode, inst.bits, true, true)
    }
}

impl<C: Cable, P: OutputPin> FpgaTarget for Fpga<C, P> {
    fn set_power(&mut self, on: bool) -> Result<()> {
        log::debug!("FPGA power {}", if on { "on" } else { "off" });
        if on {
            self.power.set_high().map_err(Error::pin)
        } else {
            self.power.set_low().map_err(Error::pin)
        }
    }

    /// Reset the FPGA's TAP.  Safe at any time.
    fn reset(&mut self) -> Result<()> {
        self.jtag.reset()
    }

    fn get_id_code(&mut self) -> Result<u32> {
        self.reset()?;
        self.instruction(Instruction::IDCODE)?;

        let mut id = [0u8; 4];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = self.jtag.shift_data(0x00, 8, i == 0, i == 3)?;
        }
        let id = u32::from_le_bytes(id);
        log::info!("FPGA IDCODE {:#010x}", id);
        Ok(id)
    }

    /// Reset the FPGA and clear its configuration.  With `jtag_driven` the FPGA is then
    /// prepared to receive a bitstream through CFG_IN; otherwise it configures itself according
    /// to its mode pins (on the Basys2, from the PROM).  In that case the TAP is still walked on
    /// through Update-IR to Run-Test/Idle, since JPROGRAM only takes effect once it is latched.
    fn init_config(&mut self, jtag_driven: bool) -> Result<()> {
        log::debug!("starting FPGA configuration (jtag: {})", jtag_driven);
        self.reset()?;
        self.instruction(Instruction::JPROGRAM)?;

        if jtag_driven {
            self.instruction(Instruction::CFG_IN)?;
            self.jtag.run_test(INIT_CLOCKS)?;
            self.instruction(Instruction::CFG_IN)?;

            // 95 zeroes flush the configuration register
            for i in 0..11 {
                self.jtag.shift_data(0x00, 8, i == 0, false)?;
            }
            self.jtag.shift_data(0x00, 7, false, true)?;

            self.instruction(Instruction::CFG_IN)?;
        } else {
            // Latch JPROGRAM; the FPGA takes it from here
            self.jtag.set_state(JtagState::Idle)?;
        }
        Ok(())
    }

    /// Send one byte of the bitstream.  The caller brackets the whole bitstream with `first`
    /// and `last`.
    fn send_config_byte(&mut self, byte: u8, first: bool, last: bool) -> Result<()> {
        self.jtag.shift_data(byte, 8, first, last)?;
        Ok(())
    }

    /// Start the FPGA.  Nothing checks that configuration actually succeeded.
    fn finish_config(&mut self) -> Result<()> {
        self.instruction(Instruction::JSTART)?;
        for i in 0..4 {
            self.jtag.shift_data(0x00, 8, i == 0, i == 3)?;
        }
        self.jtag.set_state(JtagState::Idle)?;
        self.jtag.run_test(STARTUP_CLOCKS)?;
        log::info!("FPGA configuration finished");
        Ok(())
    }
}
