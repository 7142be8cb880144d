//! The bootload session.  Each HID SetReport from the host starts with a 16-bit word which is
//! either one of the `Command`s or the address of a flash page to program; the rest of the
//! report (and as many further OUT packets as needed) is that command's payload.
use num_enum::TryFromPrimitive;

use crate::config::{BoardConfig, WaitLimit};
use crate::error::{Error, Result};
use crate::flash::{FlashProgrammer, PageWrite, SelfProgram};
use crate::fpga::FpgaTarget;
use crate::transport::Transport;

pub use crate::status::{Activity, ActivityListener};

/// Size of a HID report, and of an FPGA configuration chunk.
pub const REPORT_SIZE: usize = 128;
const CHUNK_SIZE: u8 = 128;

#[derive(Copy,Clone,Debug,Eq,PartialEq,TryFromPrimitive)]
#[repr(u16)]
pub enum Command {
    HardReset = 0xffff,
    /// Leave the bootloader and jump to the application
    SoftReset = 0xf001,
    /// Reserved; does nothing
    FpgaOff = 0xf020,
    /// Begin configuration; the rest of the report is the first chunk of bitstream
    FpgaConfigStart = 0xf022,
    FpgaConfigSend = 0xf023,
    /// One length byte, then the final chunk
    FpgaConfigEnd = 0xf024,
}

/// What handling a report did.
#[derive(Copy,Clone,Debug,Eq,PartialEq)]
pub enum Dispatch {
    FlashWritten(u16),
    FlashIgnored(u16),
    FpgaStarted,
    FpgaChunk,
    FpgaFinished,
    FpgaOff,
    HardReset,
    SoftReset,
}

/// System control the dispatcher needs from the board.  On hardware neither reset returns.
pub trait Board: ActivityListener {
    fn hard_reset(&mut self);
    fn start_application(&mut self);
}

/// The last report received, sent back verbatim when the host asks for one.
#[derive(Clone,Debug)]
pub struct ReportEcho {
    id: u8,
    size: usize,
    data: [u8; REPORT_SIZE],
    /// A report is being latched as it is read
    open: bool,
}

impl ReportEcho {
    pub const fn new() -> Self {
        ReportEcho { id: 0, size: 0, data: [0; REPORT_SIZE], open: false }
    }

    fn begin(&mut self, id: u8) {
        self.id = id;
        self.size = 0;
        self.open = true;
    }

    fn push(&mut self, byte: u8) {
        if self.open && self.size < REPORT_SIZE {
            self.data[self.size] = byte;
            self.size += 1;
        }
    }

    fn close(&mut self) {
        self.open = false;
    }

    /// Latch a report.  Anything past `REPORT_SIZE` bytes is dropped.
    pub fn process_report(&mut self, id: u8, data: &[u8]) {
        let size = data.len().min(REPORT_SIZE);
        self.id = id;
        self.size = size;
        self.open = false;
        self.data[..size].copy_from_slice(&data[..size]);
    }

    /// Copy the latched report into `buf`.  Returns its report ID, if it had one, and the number
    /// of bytes written.
    pub fn create_report(&self, buf: &mut [u8]) -> (Option<u8>, usize) {
        let size = self.size.min(buf.len());
        buf[..size].copy_from_slice(&self.data[..size]);
        let id = if self.id != 0 { Some(self.id) } else { None };
        (id, size)
    }
}

impl Default for ReportEcho {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a byte, latching it while the first OUT packet of the report is being read.
fn read_u8<T: Transport>(usb: &mut T, echo: &mut ReportEcho) -> u8 {
    let byte = usb.read_u8();
    echo.push(byte);
    byte
}

fn read_u16_le<T: Transport>(usb: &mut T, echo: &mut ReportEcho) -> u16 {
    let lo = read_u8(usb, echo);
    let hi = read_u8(usb, echo);
    u16::from_le_bytes([lo, hi])
}

/// `Transport::refill`, ending the latched report once the first packet runs dry.
fn refill<T: Transport>(usb: &mut T, echo: &mut ReportEcho, limit: WaitLimit) -> Result<()> {
    if usb.bytes_available() == 0 {
        echo.close();
    }
    usb.refill(limit)
}

/// Latch whatever the command left unread in the first packet.
fn drain<T: Transport>(usb: &mut T, echo: &mut ReportEcho) {
    if echo.open {
        while usb.bytes_available() > 0 {
            read_u8(usb, echo);
        }
        echo.close();
    }
}

pub struct Bootloader<T, G, F, B> {
    usb: T,
    fpga: G,
    flash: FlashProgrammer<F>,
    board: B,
    config: BoardConfig,
    echo: ReportEcho,
}

impl<T, G, F, B> Bootloader<T, G, F, B>
where
    T: Transport,
    G: FpgaTarget,
    F: SelfProgram,
    B: Board,
{
    pub fn new(usb: T, fpga: G, spm: F, board: B, config: BoardConfig) -> Self {
        Bootloader {
            usb,
            fpga,
            flash: FlashProgrammer::new(spm, config.flash, config.wait),
            board,
            config,
            echo: ReportEcho::new(),
        }
    }

    pub fn fpga(&mut self) -> &mut G {
        &mut self.fpga
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn process_report(&mut self, id: u8, data: &[u8]) {
        self.echo.process_report(id, data);
    }

    pub fn create_report(&self, buf: &mut [u8]) -> (Option<u8>, usize) {
        self.echo.create_report(buf)
    }

    /// Entry point for control requests the USB stack does not handle itself.  Only SetReport
    /// carries a command; `set_report` holds its report ID.
    pub fn handle_control_request(&mut self, set_report: Option<u8>) -> Result<Option<Dispatch>> {
        self.board.activity(Activity::Attached);
        match set_report {
            Some(id) => self.handle_set_report(id).map(Some),
            None => Ok(None),
        }
    }

    /// Read one command from the host and carry it out.  The first OUT packet of the report is
    /// latched for `create_report`.  The OUT data is discarded and the status stage completed
    /// afterwards, even if the command failed.
    pub fn handle_set_report(&mut self, id: u8) -> Result<Dispatch> {
        self.usb.clear_setup();
        self.usb.wait_out_ready(self.config.wait)?;
        self.board.activity(Activity::Receiving);

        self.echo.begin(id);
        let word = read_u16_le(&mut self.usb, &mut self.echo);
        let mut status_completed = false;
        let result = self.dispatch(word, &mut status_completed);

        if !status_completed {
            self.finish_status();
        }
        result
    }

    fn finish_status(&mut self) {
        drain(&mut self.usb, &mut self.echo);
        self.usb.clear_out();
        self.usb.clear_status_stage();
    }

    fn command(&self, word: u16) -> Option<Command> {
        let command = Command::try_from(word).ok()?;
        match command {
            Command::HardReset | Command::SoftReset => Some(command),
            _ if self.config.fpga_commands => Some(command),
            _ => None,
        }
    }

    fn dispatch(&mut self, word: u16, status_completed: &mut bool) -> Result<Dispatch> {
        let command = match self.command(word) {
            Some(command) => command,
            None => return self.program_page(word),
        };
        log::debug!("command {:?}", command);

        match command {
            Command::HardReset => {
                self.board.hard_reset();
                Ok(Dispatch::HardReset)
            }
            Command::SoftReset => {
                self.usb.detach();
                self.board.start_application();
                Ok(Dispatch::SoftReset)
            }
            Command::FpgaOff => {
                log::warn!("FPGA power off is not implemented");
                Ok(Dispatch::FpgaOff)
            }
            Command::FpgaConfigStart => {
                self.fpga.set_power(true)?;
                self.fpga.reset()?;
                self.fpga.init_config(true)?;
                self.send_chunk(true)?;
                Ok(Dispatch::FpgaStarted)
            }
            Command::FpgaConfigSend => {
                self.send_chunk(false)?;
                Ok(Dispatch::FpgaChunk)
            }
            Command::FpgaConfigEnd => {
                self.send_final_chunk(status_completed)?;
                Ok(Dispatch::FpgaFinished)
            }
        }
    }

    /// Send a full chunk of bitstream.  The first byte of the chunk opens the data scan when the
    /// chunk arrived with `FpgaConfigStart`.
    fn send_chunk(&mut self, start: bool) -> Result<()> {
        for i in 0..CHUNK_SIZE {
            refill(&mut self.usb, &mut self.echo, self.config.wait)?;
            let byte = read_u8(&mut self.usb, &mut self.echo);
            self.fpga.send_config_byte(byte, start && i == 0, false)?;
        }
        Ok(())
    }

    fn send_final_chunk(&mut self, status_completed: &mut bool) -> Result<()> {
        refill(&mut self.usb, &mut self.echo, self.config.wait)?;
        let len = read_u8(&mut self.usb, &mut self.echo);
        if len > CHUNK_SIZE {
            return Err(Error::ChunkLength(len));
        }
        log::debug!("final chunk of {} bytes", len);

        for i in 0..len {
            refill(&mut self.usb, &mut self.echo, self.config.wait)?;
            let byte = read_u8(&mut self.usb, &mut self.echo);
            self.fpga.send_config_byte(byte, false, i == len - 1)?;
        }

        // The startup clocks take a while; let the host go first
        self.finish_status();
        *status_completed = true;

        self.fpga.finish_config()?;
        self.board.activity(Activity::ConfigFinished);
        Ok(())
    }

    fn program_page(&mut self, address: u16) -> Result<Dispatch> {
        let limit = self.config.wait;
        let (usb, echo) = (&mut self.usb, &mut self.echo);
        let write = self.flash.write_page_with(address, || {
            refill(usb, echo, limit)?;
            Ok(read_u16_le(usb, echo))
        })?;
        Ok(match write {
            PageWrite::Written => Dispatch::FlashWritten(address),
            PageWrite::Ignored => Dispatch::FlashIgnored(address),
        })
    }
}
