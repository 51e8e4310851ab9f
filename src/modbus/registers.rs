//! Detector holding-register map.
//!
//! Addresses are documented 1-based (`4xxxx`); the wire offset is the
//! documented number minus 40001.
//!
//! | Register | Offset | Meaning                          |
//! |----------|-------:|----------------------------------|
//! | 40001    | 0      | status; bit 6 = AL1, bit 7 = AL2 |
//! | 40005    | 4      | reading, engineering units       |
//! | 40008    | 7      | error bits 0..=3                 |
//! | 40011    | 10     | bar-graph percent 0..=100        |
//! | 40022-24 | 21..24 | firmware words (informational)   |

use crate::app::ports::RegisterLink;
use crate::channel::display::SegmentText;
use crate::error::LinkError;
use crate::task::StopToken;

pub const STATUS: u16 = 0;
pub const READING: u16 = 4;
pub const ERROR_BITS: u16 = 7;
pub const BAR: u16 = 10;
pub const FIRMWARE: u16 = 21;
pub const FIRMWARE_WORDS: u16 = 3;

const AL1_BIT: u16 = 1 << 6;
const AL2_BIT: u16 = 1 << 7;
const ERROR_MASK: u16 = 0x000F;

/// One poll cycle's worth of registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterFrame {
    pub status: u16,
    pub reading: u16,
    pub error_bits: u16,
    pub bar: u16,
}

impl RegisterFrame {
    pub fn al1(&self) -> bool {
        self.status & AL1_BIT != 0
    }

    pub fn al2(&self) -> bool {
        self.status & AL2_BIT != 0
    }

    /// Display code for the lowest set error bit, if any.
    pub fn error_code(&self) -> Option<SegmentText> {
        SegmentText::error_code(self.error_bits & ERROR_MASK)
    }

    /// Bar level clamped to 0..=100.
    pub fn bar_percent(&self) -> u8 {
        self.bar.min(100) as u8
    }

    /// Read the four registers of one cycle, in wire order.
    pub fn read_from<L: RegisterLink + ?Sized>(link: &mut L) -> Result<Self, LinkError> {
        Self::read_until(link, &StopToken::new()).map(|frame| frame.unwrap_or_default())
    }

    /// Like [`read_from`](Self::read_from), but checks `stop` before each
    /// request so a slow device holds off cancellation by at most one read
    /// timeout.  `Ok(None)` means the cycle was abandoned.
    pub fn read_until<L: RegisterLink + ?Sized>(
        link: &mut L,
        stop: &StopToken,
    ) -> Result<Option<Self>, LinkError> {
        let mut regs = [0u16; 4];
        for (slot, addr) in regs.iter_mut().zip([STATUS, READING, ERROR_BITS, BAR]) {
            if stop.is_stopped() {
                return Ok(None);
            }
            *slot = read_one(link, addr)?;
        }
        let [status, reading, error_bits, bar] = regs;
        Ok(Some(Self {
            status,
            reading,
            error_bits,
            bar,
        }))
    }
}

/// Raw firmware words from 40022..40024.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo(pub [u16; FIRMWARE_WORDS as usize]);

impl FirmwareInfo {
    pub fn read_from<L: RegisterLink + ?Sized>(link: &mut L) -> Result<Self, LinkError> {
        let regs = link.read_holding(FIRMWARE, FIRMWARE_WORDS)?;
        match regs.as_slice() {
            [a, b, c, ..] => Ok(Self([*a, *b, *c])),
            _ => Err(LinkError::ShortResponse {
                expected: FIRMWARE_WORDS,
                got: regs.len(),
            }),
        }
    }
}

impl core::fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a:04X} {b:04X} {c:04X}")
    }
}

fn read_one<L: RegisterLink + ?Sized>(link: &mut L, addr: u16) -> Result<u16, LinkError> {
    let regs = link.read_holding(addr, 1)?;
    regs.first()
        .copied()
        .ok_or(LinkError::ShortResponse { expected: 1, got: 0 })
}
