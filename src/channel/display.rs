//! Four-character seven-segment display text.

use core::fmt;

/// Number of digits on a channel display.
pub const DIGITS: usize = 4;

/// Mask with every digit position set.
pub const ALL_DIGITS: u8 = 0b1111;

/// Detector error codes by error bit, lowest bit first.
const ERROR_CODES: [&[u8; 4]; 4] = [b"E-10", b"E-22", b"E-12", b"E-23"];

/// Exactly four ASCII characters, as driven onto the segment display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentText([u8; DIGITS]);

impl SegmentText {
    /// All segments off.
    pub const BLANK: SegmentText = SegmentText(*b"    ");

    /// Decimal rendering with leading-zero blanking; the units digit is
    /// always shown.  Values above 9999 saturate.
    pub fn from_value(value: u16) -> Self {
        let mut out = [b' '; DIGITS];
        let mut n = value.min(9999);
        for slot in out.iter_mut().rev() {
            *slot = b'0' + (n % 10) as u8;
            n /= 10;
            if n == 0 {
                break;
            }
        }
        Self(out)
    }

    /// Right-align `s` in four characters, space padded on the left.
    /// Non-ASCII characters render as `?`; anything past four is cut.
    pub fn from_str_padded(s: &str) -> Self {
        let bytes: Vec<u8> = s
            .chars()
            .take(DIGITS)
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .collect();
        let mut out = [b' '; DIGITS];
        out[DIGITS - bytes.len()..].copy_from_slice(&bytes);
        Self(out)
    }

    /// Error code for the lowest set bit among error bits 0..=3.
    pub fn error_code(error_bits: u16) -> Option<Self> {
        (0..ERROR_CODES.len())
            .find(|bit| error_bits & (1 << bit) != 0)
            .map(|bit| Self(*ERROR_CODES[bit]))
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// True when every position is a space (segments off).
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|&b| b == b' ')
    }

    /// Copy with the digits in `mask` blanked (bit 0 = leftmost digit).
    #[must_use]
    pub fn masked(&self, mask: u8) -> Self {
        let mut out = self.0;
        for (i, slot) in out.iter_mut().enumerate() {
            if mask & (1 << i) != 0 {
                *slot = b' ';
            }
        }
        Self(out)
    }
}

impl fmt::Debug for SegmentText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for SegmentText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
