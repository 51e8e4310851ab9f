//! I²C bus adapters and the [`Platform`] implementations built on them.
//!
//! | Platform        | Bus                   | Feature  |
//! |-----------------|-----------------------|----------|
//! | `LinuxPlatform` | `/dev/i2c-*` (I2cdev) | `rpi`    |
//! | `SimPlatform`   | [`SimBus`]            | default  |
//!
//! Both use the real Modbus/TCP connector.

use std::collections::BTreeMap;
use std::sync::Arc;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use parking_lot::Mutex;

use crate::app::ports::Platform;
use crate::error::BusError;
use crate::sensors::{ads1115, ina219};

use super::modbus_tcp::TcpConnector;

// ───────────────────────────────────────────────────────────────
// Simulated bus
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct SimAdc {
    inputs_ma: [f32; 4],
    pointer: u8,
    config: u16,
    broken_input: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct SimIna {
    bus_volts: f32,
    shunt_mv: f32,
    pointer: u8,
}

#[derive(Debug, Default)]
struct SimDevices {
    adcs: BTreeMap<u8, SimAdc>,
    ina: Option<SimIna>,
}

/// In-memory bus with ADS1115 and INA219 register models.  Clones share
/// the same devices, so every task can hold its own handle.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    devices: Arc<Mutex<SimDevices>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an ADS1115 at `addr` with the given loop currents.
    #[must_use]
    pub fn with_adc(self, addr: u8, inputs_ma: [f32; 4]) -> Self {
        self.devices.lock().adcs.insert(
            addr,
            SimAdc {
                inputs_ma,
                pointer: 0,
                config: 0x8583,
                broken_input: None,
            },
        );
        self
    }

    /// Add the UPS monitor.
    #[must_use]
    pub fn with_ups(self, bus_volts: f32, shunt_mv: f32) -> Self {
        self.devices.lock().ina = Some(SimIna {
            bus_volts,
            shunt_mv,
            pointer: 0,
        });
        self
    }

    pub fn set_loop_current(&self, addr: u8, input: u8, milliamps: f32) {
        if let Some(adc) = self.devices.lock().adcs.get_mut(&addr) {
            adc.inputs_ma[usize::from(input) % 4] = milliamps;
        }
    }

    /// Make conversions of one ADC input fail (`None` heals it).
    pub fn break_input(&self, addr: u8, input: Option<u8>) {
        if let Some(adc) = self.devices.lock().adcs.get_mut(&addr) {
            adc.broken_input = input;
        }
    }

    /// Make a device stop answering.
    pub fn detach(&self, addr: u8) {
        let mut devices = self.devices.lock();
        devices.adcs.remove(&addr);
        if addr == ina219::INA219_ADDR {
            devices.ina = None;
        }
    }

    /// A small demo panel: one ADC, a charged UPS.
    pub fn demo() -> Self {
        Self::new()
            .with_adc(0x48, [4.0, 12.0, 19.5, 0.0])
            .with_ups(24.6, 1.5)
    }
}

impl SimAdc {
    fn conversion_broken(&self) -> bool {
        let input = ((self.config >> 12) & 0x3) as u8;
        self.pointer == ads1115::REG_CONVERSION && self.broken_input == Some(input)
    }

    fn write(&mut self, bytes: &[u8]) {
        if let Some((&reg, value)) = bytes.split_first() {
            self.pointer = reg;
            if reg == ads1115::REG_CONFIG && value.len() >= 2 {
                self.config = u16::from_be_bytes([value[0], value[1]]);
            }
        }
    }

    fn read(&self, buf: &mut [u8]) {
        let value = match self.pointer {
            ads1115::REG_CONVERSION => {
                let input = usize::from((self.config >> 12) & 0x3);
                let volts = self.inputs_ma[input] / 1000.0 * 250.0;
                (volts / 6.144 * 32767.0).round().clamp(-32768.0, 32767.0) as i16 as u16
            }
            // Single-shot conversions complete immediately.
            ads1115::REG_CONFIG => self.config | ads1115::CONFIG_OS,
            _ => 0,
        };
        fill(buf, value);
    }
}

impl SimIna {
    fn write(&mut self, bytes: &[u8]) {
        if let Some(&reg) = bytes.first() {
            self.pointer = reg;
        }
    }

    fn read(&self, buf: &mut [u8]) {
        let value = match self.pointer {
            ina219::REG_CONFIG => ina219::CONFIG_DEFAULT,
            ina219::REG_SHUNT => (self.shunt_mv / 0.01).round() as i16 as u16,
            ina219::REG_BUS => ((self.bus_volts * 1000.0 / 4.0).round() as u16) << 3,
            _ => 0,
        };
        fill(buf, value);
    }
}

fn fill(buf: &mut [u8], value: u16) {
    for (dst, src) in buf.iter_mut().zip(value.to_be_bytes()) {
        *dst = src;
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut devices = self.devices.lock();
        let nack = ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address);

        if address == ina219::INA219_ADDR {
            let ina = devices.ina.as_mut().ok_or(nack)?;
            for op in operations {
                match op {
                    Operation::Write(bytes) => ina.write(bytes),
                    Operation::Read(buf) => ina.read(buf),
                }
            }
            return Ok(());
        }

        let adc = devices.adcs.get_mut(&address).ok_or(nack)?;
        for op in operations {
            match op {
                Operation::Write(bytes) => adc.write(bytes),
                Operation::Read(_) if adc.conversion_broken() => return Err(ErrorKind::Other),
                Operation::Read(buf) => adc.read(buf),
            }
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Platforms
// ───────────────────────────────────────────────────────────────

/// Host build: simulated bus, real network.
#[derive(Debug, Clone)]
pub struct SimPlatform {
    bus: SimBus,
}

impl SimPlatform {
    pub fn new(bus: SimBus) -> Self {
        Self { bus }
    }
}

impl Platform for SimPlatform {
    type Bus = SimBus;
    type Connector = TcpConnector;

    fn open_bus(&self) -> Result<SimBus, BusError> {
        Ok(self.bus.clone())
    }

    fn connector(&self) -> TcpConnector {
        TcpConnector
    }
}

/// Raspberry Pi build: `/dev/i2c-*` through `linux-embedded-hal`.
#[cfg(feature = "rpi")]
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    i2c_path: std::path::PathBuf,
}

#[cfg(feature = "rpi")]
impl LinuxPlatform {
    pub fn new(i2c_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            i2c_path: i2c_path.into(),
        }
    }
}

#[cfg(feature = "rpi")]
impl Platform for LinuxPlatform {
    type Bus = linux_embedded_hal::I2cdev;
    type Connector = TcpConnector;

    fn open_bus(&self) -> Result<Self::Bus, BusError> {
        linux_embedded_hal::I2cdev::new(&self.i2c_path).map_err(|e| {
            log::error!("i2c: cannot open {}: {e}", self.i2c_path.display());
            BusError::Open
        })
    }

    fn connector(&self) -> TcpConnector {
        TcpConnector
    }
}
