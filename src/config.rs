//! Board and timing configuration.  Everything here is a plain `Copy` value with `const` presets
//! for the supported boards; there is no runtime configuration store.
use core::time::Duration;

/// Unit the `Timing` values are expressed in.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum ClockScale {
    Micros,
    /// 1000x slower, for debugging or sluggish targets
    Millis,
}

/// TCK pulse timing.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct Timing {
    /// Minimum time TCK is held low, and then high, per pulse
    pub tck_hold: u32,
    /// Extra delay before each bit is driven
    pub bit_delay: Option<u32>,
    pub scale: ClockScale,
}

impl Timing {
    /// Run TCK as fast as the pins toggle.
    pub const NONE: Timing = Timing { tck_hold: 0, bit_delay: None, scale: ClockScale::Micros };
    pub const FAST: Timing = Timing { tck_hold: 1, bit_delay: None, scale: ClockScale::Micros };
    pub const SLOW: Timing = Timing { tck_hold: 1, bit_delay: None, scale: ClockScale::Millis };

    fn duration(&self, amount: u32) -> Duration {
        match self.scale {
            ClockScale::Micros => Duration::from_micros(amount as u64),
            ClockScale::Millis => Duration::from_millis(amount as u64),
        }
    }

    pub fn hold(&self) -> Duration {
        self.duration(self.tck_hold)
    }

    pub fn bit(&self) -> Option<Duration> {
        self.bit_delay.map(|d| self.duration(d))
    }
}

/// Bits emitted in front of every instruction and data scan.  On the Basys2 the FPGA shares its
/// chain with a configuration PROM which is kept in BYPASS: eight ones load its instruction
/// register with BYPASS and a single zero fills its one-bit bypass register.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct ScanPadding {
    pub ir_header_bits: u8,
    pub dr_header_bits: u8,
}

impl ScanPadding {
    pub const NONE: ScanPadding = ScanPadding { ir_header_bits: 0, dr_header_bits: 0 };
    pub const BASYS2: ScanPadding = ScanPadding { ir_header_bits: 8, dr_header_bits: 1 };
}

/// Geometry of the self-programmable flash.  Addresses are byte addresses.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct FlashLayout {
    pub page_size: u16,
    /// First byte of the resident bootloader; nothing at or above this is writable
    pub bootloader_start: u16,
}

impl FlashLayout {
    pub const ATMEGA32U4: FlashLayout = FlashLayout { page_size: 128, bootloader_start: 0x7000 };
    pub const AT90USB162: FlashLayout = FlashLayout { page_size: 128, bootloader_start: 0x3000 };

    pub fn words_per_page(&self) -> u16 {
        self.page_size / 2
    }

    pub fn is_page_aligned(&self, address: u16) -> bool {
        address % self.page_size == 0
    }

    /// Whether a page write to `address` is allowed.
    pub fn is_writable(&self, address: u16) -> bool {
        self.is_page_aligned(address) && address < self.bootloader_start
    }
}

/// How long to poll a hardware ready flag before giving up.
#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub enum WaitLimit {
    Forever,
    Polls(u32),
}

impl WaitLimit {
    /// Poll `ready` until it returns true or the limit is exhausted.  Returns whether it became
    /// ready.
    pub fn poll(self, mut ready: impl FnMut() -> bool) -> bool {
        match self {
            WaitLimit::Forever => {
                while !ready() {}
                true
            }
            WaitLimit::Polls(n) => (0..n).any(|_| ready()),
        }
    }
}

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
pub struct BoardConfig {
    pub timing: Timing,
    pub padding: ScanPadding,
    pub flash: FlashLayout,
    pub wait: WaitLimit,
    /// Whether the 0xF02x FPGA commands are recognised
    pub fpga_commands: bool,
}

impl BoardConfig {
    pub const BASYS2_100K: BoardConfig = BoardConfig {
        timing: Timing::NONE,
        padding: ScanPadding::BASYS2,
        flash: FlashLayout::AT90USB162,
        wait: WaitLimit::Forever,
        fpga_commands: true,
    };
    pub const BASYS2_250K: BoardConfig = BoardConfig::BASYS2_100K;
    pub const MARK1: BoardConfig = BoardConfig {
        timing: Timing::NONE,
        padding: ScanPadding::BASYS2,
        flash: FlashLayout::ATMEGA32U4,
        wait: WaitLimit::Forever,
        fpga_commands: true,
    };
    pub const BREADBOARD: BoardConfig = BoardConfig {
        timing: Timing::NONE,
        padding: ScanPadding::NONE,
        flash: FlashLayout::ATMEGA32U4,
        wait: WaitLimit::Forever,
        fpga_commands: false,
    };

    pub fn with_wait(mut self, wait: WaitLimit) -> Self {
        self.wait = wait;
        self
    }
}
