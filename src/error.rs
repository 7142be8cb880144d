//! Errors shared by every layer of the bootloader.
use embedded_hal::digital::ErrorKind;
use thiserror::Error;

use crate::statemachine::JtagState;

#[derive(Error,Debug,Clone,Copy,PartialEq,Eq)]
pub enum Error {
    #[error("GPIO error: {0:?}")]
    Pin(ErrorKind),
    #[error("Cannot shift {0} bits at once, expected 1 to 8")]
    BitCount(u8),
    #[error("No TAP path from {from:?} to {to:?}")]
    UnreachableState { from: JtagState, to: JtagState },
    #[error("Final configuration chunk claims {0} bytes, at most 128 fit")]
    ChunkLength(u8),
    #[error("Timed out waiting for hardware")]
    Timeout,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Convert any embedded-hal pin error into ours.
    pub fn pin<E: embedded_hal::digital::Error>(e: E) -> Self {
        Error::Pin(e.kind())
    }
}
