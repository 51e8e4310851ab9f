//! INA219 bus/shunt monitor on the UPS board.

use embedded_hal::i2c::{Error as _, I2c};

use crate::error::BusError;

/// Default address (A0 = A1 = GND).
pub const INA219_ADDR: u8 = 0x40;

pub const REG_CONFIG: u8 = 0x00;
pub const REG_SHUNT: u8 = 0x01;
pub const REG_BUS: u8 = 0x02;

/// 32 V range, ±320 mV shunt range, 12-bit, continuous.
pub const CONFIG_DEFAULT: u16 = 0x399F;

/// Bus register → volts.  Bits 15..3 hold the reading in 4 mV steps.
pub fn bus_raw_to_volts(raw: u16) -> f32 {
    f32::from((raw >> 3) * 4) / 1000.0
}

/// Shunt register → millivolts, 10 µV per LSB, signed.
pub fn shunt_raw_to_millivolts(raw: u16) -> f32 {
    f32::from(raw as i16) * 0.01
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ina219 {
    addr: u8,
}

impl Ina219 {
    pub const fn new(addr: u8) -> Self {
        Self { addr }
    }

    /// Write the default configuration; fails if the device does not answer.
    pub fn probe<B: I2c>(&self, bus: &mut B) -> Result<(), BusError> {
        let [hi, lo] = CONFIG_DEFAULT.to_be_bytes();
        bus.write(self.addr, &[REG_CONFIG, hi, lo])
            .map_err(|e| BusError::Transfer(e.kind()))
    }

    pub fn bus_voltage<B: I2c>(&self, bus: &mut B) -> Result<f32, BusError> {
        self.read_reg(bus, REG_BUS).map(bus_raw_to_volts)
    }

    pub fn shunt_millivolts<B: I2c>(&self, bus: &mut B) -> Result<f32, BusError> {
        self.read_reg(bus, REG_SHUNT).map(shunt_raw_to_millivolts)
    }

    fn read_reg<B: I2c>(&self, bus: &mut B, reg: u8) -> Result<u16, BusError> {
        let mut buf = [0u8; 2];
        bus.write_read(self.addr, &[reg], &mut buf)
            .map_err(|e| BusError::Transfer(e.kind()))?;
        Ok(u16::from_be_bytes(buf))
    }
}
