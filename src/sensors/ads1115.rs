//! ADS1115 16-bit ADC, single-shot, gain 2/3 (±6.144 V).
//!
//! The driver holds only the device address; the bus is passed per call so
//! the four converters can share one controller handle.

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::i2c::{Error as _, I2c};

use crate::error::BusError;

pub const REG_CONVERSION: u8 = 0x00;
pub const REG_CONFIG: u8 = 0x01;

/// Start a single conversion (write) / conversion idle (read).
pub const CONFIG_OS: u16 = 0x8000;
const MUX_SINGLE_ENDED: u16 = 0x4 << 12;
const PGA_6_144V: u16 = 0x0000;
const MODE_SINGLE_SHOT: u16 = 0x0100;
const DR_860SPS: u16 = 0x00E0;
const COMP_DISABLE: u16 = 0x0003;

const FULL_SCALE_V: f32 = 6.144;
const LOOP_SHUNT_OHMS: f32 = 250.0;
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Config word that starts a conversion of single-ended input `ch`.
pub const fn config_word(ch: u8) -> u16 {
    CONFIG_OS
        | (MUX_SINGLE_ENDED + ((ch as u16 & 0x3) << 12))
        | PGA_6_144V
        | MODE_SINGLE_SHOT
        | DR_860SPS
        | COMP_DISABLE
}

/// Raw conversion → volts at gain 2/3.
pub fn raw_to_volts(raw: i16) -> f32 {
    f32::from(raw) * FULL_SCALE_V / 32767.0
}

/// Voltage across the 250 Ω loop resistor → milliamps.
pub fn volts_to_milliamps(volts: f32) -> f32 {
    volts / LOOP_SHUNT_OHMS * 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ads1115 {
    addr: u8,
}

impl Ads1115 {
    pub const fn new(addr: u8) -> Self {
        Self { addr }
    }

    pub const fn addr(&self) -> u8 {
        self.addr
    }

    /// Check the device answers by reading its config register.
    pub fn probe<B: I2c>(&self, bus: &mut B) -> Result<(), BusError> {
        self.read_reg(bus, REG_CONFIG).map(|_| ())
    }

    /// Convert input `ch` (0..=3) and return the signed raw result.
    pub fn read_raw<B: I2c>(&self, bus: &mut B, ch: u8, timeout: Duration) -> Result<i16, BusError> {
        let [hi, lo] = config_word(ch).to_be_bytes();
        bus.write(self.addr, &[REG_CONFIG, hi, lo])
            .map_err(|e| BusError::Transfer(e.kind()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if self.read_reg(bus, REG_CONFIG)? & CONFIG_OS != 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(BusError::ConversionTimeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(self.read_reg(bus, REG_CONVERSION)? as i16)
    }

    /// Convert input `ch` and scale to loop current.
    pub fn read_milliamps<B: I2c>(&self, bus: &mut B, ch: u8, timeout: Duration) -> Result<f32, BusError> {
        self.read_raw(bus, ch, timeout)
            .map(|raw| volts_to_milliamps(raw_to_volts(raw)))
    }

    fn read_reg<B: I2c>(&self, bus: &mut B, reg: u8) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        bus.write_read(self.addr, &[reg], &mut buf)
            .map_err(|e| BusError::Transfer(e.kind()))?;
        Ok(u16::from_be_bytes(buf))
    }
}
