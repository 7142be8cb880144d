//! The TAP engine.  `JtagSM` keeps track of the state of the target's TAP controller and walks it
//! to any requested state one TCK pulse at a time, following the same table the controller itself
//! implements.  It also shifts bits through the instruction and data registers.
use embedded_hal::digital::PinState;

use crate::cable::{Cable, Pin};
use crate::config::{ScanPadding, Timing};
use crate::error::{Error, Result};

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum Register {
    Data,
    Instruction
}

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum JtagState {
    Reset = 0,
    Idle = 1,
    SelectDR = 2,
    CaptureDR = 3,
    ShiftDR = 4,
    Exit1DR = 5,
    PauseDR = 6,
    Exit2DR = 7,
    UpdateDR = 8,
    SelectIR = 9,
    CaptureIR = 10,
    ShiftIR = 11,
    Exit1IR = 12,
    PauseIR = 13,
    Exit2IR = 14,
    UpdateIR = 15,
}

/// No walk between two reachable states is longer than seven pulses; anything beyond this is going
/// around in circles.
const MAX_WALK: usize = 7;

/// Whether following the table from `from` ever arrives at `to`.
fn reaches(from: JtagState, to: JtagState) -> bool {
    let mut state = from;
    for _ in 0..MAX_WALK {
        if state == to {
            return true;
        }
        state = state.next(state.step_toward(to));
    }
    state == to
}

impl JtagState {
    pub const ALL: [JtagState; 16] = [
        JtagState::Reset, JtagState::Idle,
        JtagState::SelectDR, JtagState::CaptureDR, JtagState::ShiftDR, JtagState::Exit1DR,
        JtagState::PauseDR, JtagState::Exit2DR, JtagState::UpdateDR,
        JtagState::SelectIR, JtagState::CaptureIR, JtagState::ShiftIR, JtagState::Exit1IR,
        JtagState::PauseIR, JtagState::Exit2IR, JtagState::UpdateIR,
    ];

    /// True for the states of the instruction register column.
    pub fn is_ir(self) -> bool {
        self as u8 >= JtagState::SelectIR as u8
    }

    /// The state the TAP controller moves to on a rising TCK edge with the given TMS level.
    pub fn next(self, tms: bool) -> JtagState {
        use JtagState::*;
        match (self, tms) {
            (Reset, false) => Idle,
            (Reset, true) => Reset,
            (Idle, false) => Idle,
            (Idle, true) => SelectDR,
            (SelectDR, false) => CaptureDR,
            (SelectDR, true) => SelectIR,
            (CaptureDR, false) | (ShiftDR, false) | (Exit2DR, false) => ShiftDR,
            (CaptureDR, true) | (ShiftDR, true) => Exit1DR,
            (Exit1DR, false) | (PauseDR, false) => PauseDR,
            (Exit1DR, true) | (Exit2DR, true) => UpdateDR,
            (PauseDR, true) => Exit2DR,
            (UpdateDR, false) | (UpdateIR, false) => Idle,
            (UpdateDR, true) | (UpdateIR, true) => SelectDR,
            (SelectIR, false) => CaptureIR,
            (SelectIR, true) => Reset,
            (CaptureIR, false) | (ShiftIR, false) | (Exit2IR, false) => ShiftIR,
            (CaptureIR, true) | (ShiftIR, true) => Exit1IR,
            (Exit1IR, false) | (PauseIR, false) => PauseIR,
            (Exit1IR, true) | (Exit2IR, true) => UpdateIR,
            (PauseIR, true) => Exit2IR,
        }
    }

    /// The TMS level that takes one step from this state toward `target`.  Only the branch
    /// points look at the target: whether it lies in the instruction column, and whether it is
    /// the shift, pause or idle state reachable from here.
    pub fn step_toward(self, target: JtagState) -> bool {
        use JtagState::*;
        match self {
            Reset => false,
            Idle => true,
            SelectDR => target.is_ir(),
            CaptureDR | Exit2DR => target != ShiftDR,
            ShiftDR | PauseDR => true,
            Exit1DR => target != PauseDR,
            UpdateDR | UpdateIR => target != Idle,
            SelectIR => false,
            CaptureIR | Exit2IR => target != ShiftIR,
            ShiftIR | PauseIR => true,
            Exit1IR => target != PauseIR,
        }
    }
}

pub struct JtagSM<C> {
    pub cable: C,
    state: JtagState,
    timing: Timing,
    padding: ScanPadding,
}

impl<C: Cable> JtagSM<C> {
    /// Create a JTAG state machine using an existing `Cable`.  The TAP is reset so that the
    /// tracked state is known.
    pub fn new(cable: C, timing: Timing, padding: ScanPadding) -> Result<Self> {
        let mut sm = Self {
            cable,
            state: JtagState::Reset,
            timing,
            padding,
        };
        sm.reset()?;
        Ok(sm)
    }

    pub fn state(&self) -> JtagState {
        self.state
    }

    pub fn release(self) -> C {
        self.cable
    }

    fn hold(&mut self) {
        if self.timing.tck_hold != 0 {
            self.cable.delay(self.timing.hold());
        }
    }

    /// One TCK period: low, sample TDO, high.  TCK idles high, so the rising edge is in the
    /// middle.  Returns TDO as it was just before the edge.
    fn pulse(&mut self) -> Result<bool> {
        self.cable.set_pin(Pin::Tck, PinState::Low)?;
        self.hold();
        let tdo = self.cable.read_pin(Pin::Tdo)? == PinState::High;
        self.cable.set_pin(Pin::Tck, PinState::High)?;
        self.hold();
        Ok(tdo)
    }

    fn bit_delay(&mut self) {
        if let Some(delay) = self.timing.bit() {
            self.cable.delay(delay);
        }
    }

    /// Set TMS and pulse TCK
    fn tms_advance(&mut self, tms: bool) -> Result<bool> {
        self.cable.set_pin(Pin::Tms, PinState::from(tms))?;
        self.bit_delay();
        self.pulse()
    }

    /// Reset the TAP by driving TMS high for 5 clocks.  Works from any state, including an
    /// unknown one.
    pub fn reset(&mut self) -> Result<()> {
        log::trace!("TAP reset");
        self.cable.set_pin(Pin::Tms, PinState::High)?;
        for _ in 0..5 {
            self.pulse()?;
        }
        self.cable.set_pin(Pin::Tms, PinState::Low)?;
        self.state = JtagState::Reset;
        Ok(())
    }

    /// Walk the TAP to `target`, one pulse per step.  Asking for `Reset` always performs the
    /// five-pulse reset.  Asking for the pause state the TAP is already in leaves the pause
    /// first (pause toggles, as in SVF) and then walks back round to it.
    pub fn set_state(&mut self, target: JtagState) -> Result<()> {
        if target == JtagState::Reset {
            return self.reset();
        }

        let toggle = match (self.state == target, target) {
            (true, JtagState::PauseDR) | (true, JtagState::PauseIR) => true,
            (true, _) => return Ok(()),
            (false, _) => false,
        };

        // Check the walk terminates before touching TMS
        let start = if toggle { self.state.next(true) } else { self.state };
        if !reaches(start, target) {
            return Err(Error::UnreachableState { from: self.state, to: target });
        }

        log::trace!("TAP {:?} -> {:?}", self.state, target);
        if toggle {
            self.tms_advance(true)?;
            self.state = start;
        }
        while self.state != target {
            let tms = self.state.step_toward(target);
            self.tms_advance(tms)?;
            self.state = self.state.next(tms);
        }
        Ok(())
    }

    /// Clock `bits` bits of `value` out on TDI, LSB first, and return the bits sampled from TDO.
    /// With `advance`, TMS is raised for the last bit so the TAP moves on to the exit state as
    /// that bit is shifted.
    pub fn shift_bits(&mut self, value: u8, bits: u8, advance: bool) -> Result<u8> {
        if !(1..=8).contains(&bits) {
            return Err(Error::BitCount(bits));
        }

        let mut received = 0;
        for i in 0..bits {
            let tdi = value & (1 << i) != 0;
            self.cable.set_pin(Pin::Tdi, PinState::from(tdi))?;
            self.bit_delay();

            let tdo = if advance && i == bits - 1 {
                let tdo = self.tms_advance(true)?;
                self.state = self.state.next(true);
                tdo
            } else {
                self.pulse()?
            };
            received |= (tdo as u8) << i;
        }
        log::trace!("shifted {} bits of {:#04x}, received {:#04x}", bits, value, received);
        Ok(received)
    }

    /// Stay in Run-Test/Idle for `clocks` TCK cycles.
    pub fn run_test(&mut self, clocks: u32) -> Result<()> {
        self.set_state(JtagState::Idle)?;
        self.cable.set_pin(Pin::Tms, PinState::Low)?;
        for _ in 0..clocks {
            self.pulse()?;
        }
        Ok(())
    }

    /// Shift part of a register.  `first` enters Shift-IR or Shift-DR and emits the scan
    /// header for the rest of the chain; `last` finishes in Exit1.  A register longer than eight
    /// bits is sent as several calls bracketed by `first` and `last`.
    pub fn shift_reg(&mut self, reg: Register, value: u8, bits: u8, first: bool, last: bool) -> Result<u8> {
        if first {
            match reg {
                Register::Instruction => {
                    self.set_state(JtagState::ShiftIR)?;
                    // Everything else on the chain goes to BYPASS
                    let n = self.padding.ir_header_bits;
                    if n > 0 {
                        self.shift_bits(0xff, n, false)?;
                    }
                }
                Register::Data => {
                    self.set_state(JtagState::ShiftDR)?;
                    let n = self.padding.dr_header_bits;
                    if n > 0 {
                        self.shift_bits(0x00, n, false)?;
                    }
                }
            }
        }
        self.shift_bits(value, bits, last)
    }

    pub fn shift_instruction(&mut self, value: u8, bits: u8, first: bool, last: bool) -> Result<()> {
        self.shift_reg(Register::Instruction, value, bits, first, last)?;
        Ok(())
    }

    pub fn shift_data(&mut self, value: u8, bits: u8, first: bool, last: bool) -> Result<u8> {
        self.shift_reg(Register::Data, value, bits, first, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cable::sim::{Loopback, SimChain, SimTap};
    use core::time::Duration;
    use std::vec;
    use std::vec::Vec;
    use JtagState::*;

    fn engine() -> JtagSM<Loopback> {
        let mut sm = JtagSM::new(Loopback::new(), Timing::NONE, ScanPadding::NONE).unwrap();
        sm.cable.pulses.clear();
        sm
    }

    fn tms_trace(sm: &JtagSM<Loopback>) -> Vec<u8> {
        sm.cable.pulses.iter().map(|p| p.tms as u8).collect()
    }

    /// Put the engine in `state` and forget how it got there.
    fn park(sm: &mut JtagSM<Loopback>, state: JtagState) {
        match state {
            Exit2DR => {
                sm.set_state(PauseDR).unwrap();
                sm.set_state(Exit2DR).unwrap();
            }
            Exit2IR => {
                sm.set_state(PauseIR).unwrap();
                sm.set_state(Exit2IR).unwrap();
            }
            s => sm.set_state(s).unwrap(),
        }
        assert_eq!(sm.state(), state);
        assert_eq!(sm.cable.state, state);
        sm.cable.pulses.clear();
    }

    #[test]
    fn reset_from_every_state() {
        for &from in JtagState::ALL.iter() {
            let mut sm = engine();
            park(&mut sm, from);
            sm.reset().unwrap();
            assert_eq!(tms_trace(&sm), [1, 1, 1, 1, 1]);
            assert_eq!(sm.state(), Reset);
            assert_eq!(sm.cable.state, Reset);
            assert!(!sm.cable.tms);
        }
    }

    #[test]
    fn table_paths() {
        let cases: &[(JtagState, JtagState, &[u8])] = &[
            (Reset, Idle, &[0]),
            (Reset, ShiftDR, &[0, 1, 0, 0]),
            (Reset, ShiftIR, &[0, 1, 1, 0, 0]),
            (Idle, PauseDR, &[1, 0, 1, 0]),
            (ShiftDR, Idle, &[1, 1, 0]),
            (ShiftIR, ShiftDR, &[1, 1, 1, 0, 0]),
            (Exit1DR, ShiftIR, &[1, 1, 1, 0, 0]),
            (Exit1IR, Idle, &[1, 0]),
            (PauseDR, ShiftDR, &[1, 0]),
            (PauseIR, Idle, &[1, 1, 0]),
            (Exit2DR, PauseDR, &[1, 1, 0, 1, 0]),
            (UpdateIR, SelectIR, &[1, 1]),
            (SelectIR, Idle, &[0, 1, 1, 0]),
        ];
        for &(from, to, tms) in cases {
            let mut sm = engine();
            park(&mut sm, from);
            sm.set_state(to).unwrap();
            assert_eq!(tms_trace(&sm), tms, "{:?} -> {:?}", from, to);
            assert_eq!(sm.state(), to);
        }
    }

    #[test]
    fn every_pair_agrees_with_the_controller() {
        for &from in JtagState::ALL.iter() {
            for &to in JtagState::ALL.iter() {
                let mut sm = engine();
                park(&mut sm, from);
                let result = sm.set_state(to);

                let exit2_from_outside = (to == Exit2DR && from != PauseDR && from != Exit2DR)
                    || (to == Exit2IR && from != PauseIR && from != Exit2IR);
                if exit2_from_outside {
                    assert_eq!(result, Err(Error::UnreachableState { from, to }));
                    assert!(sm.cable.pulses.is_empty());
                    assert_eq!(sm.state(), from);
                    continue;
                }

                result.unwrap();
                assert_eq!(sm.state(), to, "{:?} -> {:?}", from, to);
                // The simulated controller followed the TMS levels independently
                assert_eq!(sm.cable.state, to, "{:?} -> {:?}", from, to);
                assert!(sm.cable.pulses.len() <= 7);
            }
        }
    }

    #[test]
    fn controller_successors() {
        // (state, next with TMS low, next with TMS high), from the IEEE 1149.1 diagram
        let table = [
            (Reset, Idle, Reset),
            (Idle, Idle, SelectDR),
            (SelectDR, CaptureDR, SelectIR),
            (CaptureDR, ShiftDR, Exit1DR),
            (ShiftDR, ShiftDR, Exit1DR),
            (Exit1DR, PauseDR, UpdateDR),
            (PauseDR, PauseDR, Exit2DR),
            (Exit2DR, ShiftDR, UpdateDR),
            (UpdateDR, Idle, SelectDR),
            (SelectIR, CaptureIR, Reset),
            (CaptureIR, ShiftIR, Exit1IR),
            (ShiftIR, ShiftIR, Exit1IR),
            (Exit1IR, PauseIR, UpdateIR),
            (PauseIR, PauseIR, Exit2IR),
            (Exit2IR, ShiftIR, UpdateIR),
            (UpdateIR, Idle, SelectDR),
        ];
        assert_eq!(table.len(), JtagState::ALL.len());
        for &(state, low, high) in table.iter() {
            assert_eq!(state.next(false), low, "{:?} with TMS low", state);
            assert_eq!(state.next(true), high, "{:?} with TMS high", state);
        }
    }

    #[test]
    fn walks_follow_the_diagram() {
        let successor = |s: JtagState, tms: u8| -> JtagState {
            match (s, tms) {
                (Reset, 0) | (Idle, 0) | (UpdateDR, 0) | (UpdateIR, 0) => Idle,
                (Reset, _) | (SelectIR, 1) => Reset,
                (Idle, _) | (UpdateDR, _) | (UpdateIR, _) => SelectDR,
                (SelectDR, 0) => CaptureDR,
                (SelectDR, _) => SelectIR,
                (CaptureDR, 0) | (ShiftDR, 0) | (Exit2DR, 0) => ShiftDR,
                (CaptureDR, _) | (ShiftDR, _) => Exit1DR,
                (Exit1DR, 0) | (PauseDR, 0) => PauseDR,
                (Exit1DR, _) | (Exit2DR, _) => UpdateDR,
                (PauseDR, _) => Exit2DR,
                (SelectIR, _) => CaptureIR,
                (CaptureIR, 0) | (ShiftIR, 0) | (Exit2IR, 0) => ShiftIR,
                (CaptureIR, _) | (ShiftIR, _) => Exit1IR,
                (Exit1IR, 0) | (PauseIR, 0) => PauseIR,
                (Exit1IR, _) | (Exit2IR, _) => UpdateIR,
                (PauseIR, _) => Exit2IR,
            }
        };
        for &from in JtagState::ALL.iter() {
            for &to in JtagState::ALL.iter() {
                let mut sm = engine();
                park(&mut sm, from);
                if sm.set_state(to).is_err() {
                    continue;
                }
                let end = tms_trace(&sm).iter().fold(from, |s, &tms| successor(s, tms));
                assert_eq!(end, to, "{:?} -> {:?}", from, to);
            }
        }
    }

    #[test]
    fn repeated_request_is_a_no_op() {
        for &s in JtagState::ALL.iter() {
            if matches!(s, Reset | PauseDR | PauseIR) {
                continue;
            }
            let mut sm = engine();
            park(&mut sm, s);
            sm.set_state(s).unwrap();
            assert!(sm.cable.pulses.is_empty(), "{:?}", s);
        }
    }

    #[test]
    fn pause_toggles() {
        let mut sm = engine();
        park(&mut sm, PauseDR);
        sm.set_state(PauseDR).unwrap();
        assert_eq!(tms_trace(&sm), [1, 1, 1, 0, 1, 0]);
        assert_eq!(sm.state(), PauseDR);

        park(&mut sm, PauseIR);
        sm.set_state(PauseIR).unwrap();
        assert_eq!(tms_trace(&sm), [1, 1, 1, 1, 0, 1, 0]);
        assert_eq!(sm.state(), PauseIR);
        assert_eq!(sm.cable.state, PauseIR);
    }

    #[test]
    fn loopback_returns_what_was_sent() {
        let mut sm = engine();
        park(&mut sm, ShiftDR);
        for bits in 1..=8u8 {
            for &value in &[0x00u8, 0xff, 0xa5, 0x5a, 0x01, 0x80, 0x3c] {
                let mask = if bits == 8 { 0xff } else { (1u8 << bits) - 1 };
                let got = sm.shift_bits(value, bits, false).unwrap();
                assert_eq!(got, value & mask, "{} bits of {:#x}", bits, value);
            }
        }
        assert_eq!(sm.state(), ShiftDR);
    }

    #[test]
    fn shift_is_lsb_first() {
        let mut sm = engine();
        park(&mut sm, ShiftIR);
        sm.shift_bits(0b0000_1011, 6, false).unwrap();
        let tdi: Vec<u8> = sm.cable.pulses.iter().map(|p| p.tdi as u8).collect();
        assert_eq!(tdi, [1, 1, 0, 1, 0, 0]);
    }

    #[test]
    fn advance_on_last_bit() {
        let mut sm = engine();
        park(&mut sm, ShiftDR);
        let got = sm.shift_bits(0x96, 8, true).unwrap();
        assert_eq!(got, 0x96);
        assert_eq!(tms_trace(&sm), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(sm.state(), Exit1DR);
        assert_eq!(sm.cable.state, Exit1DR);
    }

    #[test]
    fn bit_count_is_checked() {
        let mut sm = engine();
        park(&mut sm, ShiftDR);
        assert_eq!(sm.shift_bits(0, 0, false), Err(Error::BitCount(0)));
        assert_eq!(sm.shift_bits(0, 9, false), Err(Error::BitCount(9)));
        assert!(sm.cable.pulses.is_empty());
    }

    #[test]
    fn run_test_clocks_in_idle() {
        let mut sm = engine();
        park(&mut sm, Exit1IR);
        sm.run_test(10).unwrap();
        assert_eq!(sm.cable.pulses.len(), 12);
        assert!(sm.cable.pulses[2..].iter().all(|p| !p.tms));
        assert_eq!(sm.cable.state, Idle);
    }

    #[test]
    fn timing_profiles() {
        let fast = Timing { bit_delay: Some(5), ..Timing::FAST };
        let mut sm = JtagSM::new(Loopback::new(), fast, ScanPadding::NONE).unwrap();
        // five reset pulses, each held low then high
        assert_eq!(sm.cable.delayed, Duration::from_micros(10));
        sm.cable.delayed = Duration::ZERO;
        sm.set_state(Idle).unwrap();
        assert_eq!(sm.cable.delayed, Duration::from_micros(2 + 5));

        let mut sm = JtagSM::new(Loopback::new(), Timing::SLOW, ScanPadding::NONE).unwrap();
        assert_eq!(sm.cable.delayed, Duration::from_millis(10));
        sm.cable.delayed = Duration::ZERO;
        sm.set_state(ShiftDR).unwrap();
        sm.shift_bits(0xff, 8, false).unwrap();
        assert_eq!(sm.cable.delayed, Duration::from_millis(2 * (4 + 8)));
    }

    #[test]
    fn headers_put_the_rest_of_the_chain_in_bypass() {
        let chain = SimChain::new(vec![SimTap::device(6, 0x09, 0x1234_5093), SimTap::bypass(8)]);
        let mut sm = JtagSM::new(chain, Timing::NONE, ScanPadding::BASYS2).unwrap();

        sm.shift_instruction(0x09, 6, true, true).unwrap();
        assert_eq!(sm.state(), Exit1IR);
        let mut id = [0u8; 4];
        for (i, byte) in id.iter_mut().enumerate() {
            *byte = sm.shift_data(0x00, 8, i == 0, i == 3).unwrap();
        }
        assert_eq!(u32::from_le_bytes(id), 0x1234_5093);
        assert_eq!(sm.cable.instructions, [0x09]);
        assert_eq!(sm.cable.taps[1].ir(), 0xff);
    }
}
