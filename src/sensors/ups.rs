//! UPS battery sampler (INA219, six-cell pack).

use std::sync::Arc;
use std::time::{Duration, Instant};

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::app::ports::EventSink;
use crate::error::Error;
use crate::events::{PanelEvent, UpsMode};
use crate::task::StopToken;

use super::ina219::{Ina219, INA219_ADDR};

const CELLS: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsTiming {
    pub period: Duration,
}

impl Default for UpsTiming {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
        }
    }
}

/// Per-cell voltage → state of charge, piecewise linear.
///
/// | cell V      | percent                  |
/// |-------------|--------------------------|
/// | ≥ 4.2       | 100                      |
/// | (3.7, 4.2)  | 50 + (v − 3.7) / 0.5 × 50 |
/// | (3.0, 3.7]  | (v − 3.0) / 0.7 × 50     |
/// | ≤ 3.0       | 0                        |
pub fn battery_percent(cell_volts: f32) -> u8 {
    let pct = if cell_volts >= 4.2 {
        100.0
    } else if cell_volts > 3.7 {
        50.0 + (cell_volts - 3.7) / 0.5 * 50.0
    } else if cell_volts > 3.0 {
        (cell_volts - 3.0) / 0.7 * 50.0
    } else {
        0.0
    };
    pct.round().clamp(0.0, 100.0) as u8
}

/// One UPS reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpsReading {
    pub volts: f32,
    pub percent: u8,
    pub mode: UpsMode,
}

pub struct UpsSampler<B: I2c> {
    bus: B,
    ina: Option<Ina219>,
    sink: Arc<dyn EventSink>,
    timing: UpsTiming,
    last_percent: u8,
}

impl<B: I2c> UpsSampler<B> {
    /// Probe the monitor.  If it does not answer, `UpsUnavailable` is
    /// emitted once and the sampler reports 0 % for the session.
    pub fn new(mut bus: B, sink: Arc<dyn EventSink>, timing: UpsTiming) -> Self {
        let ina = Ina219::new(INA219_ADDR);
        let ina = match ina.probe(&mut bus) {
            Ok(()) => {
                info!("ups: INA219 at 0x{INA219_ADDR:02X}");
                Some(ina)
            }
            Err(e) => {
                warn!("ups: monitor unavailable ({e})");
                sink.emit(PanelEvent::UpsUnavailable);
                None
            }
        };
        Self {
            bus,
            ina,
            sink,
            timing,
            last_percent: 0,
        }
    }

    pub fn is_available(&self) -> bool {
        self.ina.is_some()
    }

    /// Last reported state of charge; 0 when unavailable.
    pub fn percent(&self) -> u8 {
        self.last_percent
    }

    /// Read the monitor once.
    pub fn sample(&mut self) -> Result<UpsReading, Error> {
        let ina = self.ina.ok_or(Error::UpsUnavailable)?;
        let bus_v = ina.bus_voltage(&mut self.bus)?;
        let shunt_mv = ina.shunt_millivolts(&mut self.bus)?;
        let volts = bus_v + shunt_mv / 1000.0;
        Ok(UpsReading {
            volts,
            percent: battery_percent(volts / CELLS),
            mode: if shunt_mv >= 0.0 {
                UpsMode::Charging
            } else {
                UpsMode::Discharging
            },
        })
    }

    /// Sample once per period and emit `UpsBattery`.  Returns at once when
    /// the monitor is unavailable.
    pub fn run(&mut self, stop: &StopToken) {
        if self.ina.is_none() {
            return;
        }
        info!("ups: sampler started");
        let mut next = Instant::now();
        while !stop.is_stopped() {
            match self.sample() {
                Ok(reading) => {
                    self.last_percent = reading.percent;
                    self.sink.emit(PanelEvent::UpsBattery {
                        percent: reading.percent,
                        mode: reading.mode,
                    });
                }
                Err(e) => warn!("ups: read failed: {e}"),
            }
            next += self.timing.period;
            let now = Instant::now();
            if next <= now {
                next = now;
            } else if stop.wait_until(next) {
                break;
            }
        }
        info!("ups: sampler stopped");
    }
}
