//! Self-programming of the microcontroller's own flash, one page at a time.
use crate::config::{FlashLayout, WaitLimit};
use crate::error::{Error, Result};

/// The store-program-memory primitives of the part.  All addresses are byte addresses.
pub trait SelfProgram {
    fn page_erase(&mut self, address: u16);
    /// Load one word into the temporary page buffer.
    fn page_fill(&mut self, address: u16, word: u16);
    fn page_write(&mut self, address: u16);
    /// True while an erase or write is in progress.
    fn is_busy(&mut self) -> bool;
    /// Re-enable the read-while-write section after programming.
    fn rww_enable(&mut self);
}

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum PageWrite {
    Written,
    /// The address was unaligned or inside the bootloader; nothing was touched.
    Ignored,
}

pub struct FlashProgrammer<F> {
    spm: F,
    layout: FlashLayout,
    wait: WaitLimit,
}

impl<F: SelfProgram> FlashProgrammer<F> {
    pub fn new(spm: F, layout: FlashLayout, wait: WaitLimit) -> Self {
        FlashProgrammer { spm, layout, wait }
    }

    pub fn layout(&self) -> FlashLayout {
        self.layout
    }

    pub fn spm(&self) -> &F {
        &self.spm
    }

    fn busy_wait(&mut self) -> Result<()> {
        let spm = &mut self.spm;
        if self.wait.poll(|| !spm.is_busy()) {
            Ok(())
        } else {
            log::warn!("flash stayed busy");
            Err(Error::Timeout)
        }
    }

    /// Erase the page at `address` and program it with `words`.  At most one page of words is
    /// used.
    pub fn write_page(&mut self, address: u16, words: &[u16]) -> Result<PageWrite> {
        let count = words.len().min(self.layout.words_per_page() as usize);
        let mut words = words.iter().copied();
        self.program(address, count as u16, || Ok(words.next().unwrap_or(0xffff)))
    }

    /// Like `write_page`, but pulls a whole page of words from `next_word` as the page buffer is
    /// filled.  `next_word` is not called at all when the write is refused.
    pub fn write_page_with(&mut self, address: u16, next_word: impl FnMut() -> Result<u16>) -> Result<PageWrite> {
        self.program(address, self.layout.words_per_page(), next_word)
    }

    fn program(&mut self, address: u16, count: u16, mut next_word: impl FnMut() -> Result<u16>) -> Result<PageWrite> {
        if !self.layout.is_writable(address) {
            log::warn!("refusing to program page at {:#06x}", address);
            return Ok(PageWrite::Ignored);
        }
        log::debug!("programming page at {:#06x}", address);

        self.spm.page_erase(address);
        self.busy_wait()?;

        for offset in (0..count).map(|w| w * 2) {
            let word = next_word()?;
            self.spm.page_fill(address + offset, word);
        }

        self.spm.page_write(address);
        self.busy_wait()?;

        self.spm.rww_enable();
        Ok(PageWrite::Written)
    }
}
