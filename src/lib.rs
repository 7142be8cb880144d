//! This crate is the core of a USB HID bootloader for AVR microcontrollers which sit next to an
//! FPGA on the same board.  The host sends HID reports; each one either programs a page of the
//! microcontroller's own flash or carries part of an FPGA bitstream, which is loaded over JTAG.
//!
//! At the lowest level is the Cable trait, which drives and samples the four JTAG lines and
//! waits.  The gpio cable does this with embedded-hal pins; the sim module provides simulated
//! scan chains so everything above it can be exercised on a PC.
//!
//! The next level is the JtagSM, which keeps track of the mode of the TAPs.  You tell it which
//! mode you want (e.g., Reset or ShiftDR) and it walks there one TMS bit at a time.  It can also
//! shift instruction and data registers, padding the scan so other devices on the chain stay in
//! BYPASS.
//!
//! On top of that, Fpga knows the instruction sequences that configure a Spartan-3E, and the
//! Bootloader in the dispatcher module ties the USB transport, the FPGA and the flash programmer
//! together.
//!
//! # Example
//! ```
//! use uniloader::cable::sim::Loopback;
//! use uniloader::config::{ScanPadding, Timing};
//! use uniloader::statemachine::{JtagSM, JtagState};
//!
//! let mut jtag = JtagSM::new(Loopback::new(), Timing::NONE, ScanPadding::NONE).unwrap();
//! jtag.set_state(JtagState::ShiftDR).unwrap();
//! assert_eq!(jtag.shift_bits(0xa5, 8, false).unwrap(), 0xa5);
//! assert_eq!(jtag.state(), JtagState::ShiftDR);
//! ```

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

pub mod cable;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flash;
pub mod fpga;
pub mod statemachine;
pub mod status;
pub mod transport;
