//! 4–20 mA sampler.
//!
//! One task for every analog channel.  Each 100 ms cycle reads every
//! configured input of every present ADS1115 and feeds the channel
//! pipelines in input order.  A bus error on one converter skips all of
//! that converter's channels for the cycle; the other converters carry on.
//! After [`FAULT_THRESHOLD`] consecutive failing cycles the converter is
//! reported with `DeviceFault`, once, until it answers again.

use std::time::{Duration, Instant};

use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};

use crate::channel::pipeline::ChannelPipeline;
use crate::config::ADC_INPUTS;
use crate::events::PanelEvent;
use crate::task::StopToken;

use super::ads1115::Ads1115;

/// Consecutive failing cycles before a converter is reported faulty.
pub const FAULT_THRESHOLD: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalogTiming {
    pub cycle: Duration,
    pub conversion_timeout: Duration,
}

impl Default for AnalogTiming {
    fn default() -> Self {
        Self {
            cycle: Duration::from_millis(100),
            conversion_timeout: Duration::from_millis(100),
        }
    }
}

/// A converter and the pipelines wired to its inputs.
struct AdcSlot {
    adc: Ads1115,
    inputs: [Option<ChannelPipeline>; ADC_INPUTS],
    failures: u32,
    faulted: bool,
}

/// Owns the I²C handle and all analog channel pipelines.
pub struct AnalogSampler<B: I2c> {
    bus: B,
    slots: Vec<AdcSlot>,
    timing: AnalogTiming,
}

impl<B: I2c> AnalogSampler<B> {
    /// Group `channels` (ADC address, input, pipeline) by converter and probe
    /// each converter.  Converters that do not answer are left out; their
    /// channels never emit.
    pub fn new(
        mut bus: B,
        channels: impl IntoIterator<Item = (u8, u8, ChannelPipeline)>,
        timing: AnalogTiming,
    ) -> Self {
        let mut slots: Vec<AdcSlot> = Vec::new();
        for (addr, input, pipeline) in channels {
            let idx = match slots.iter().position(|s| s.adc.addr() == addr) {
                Some(idx) => idx,
                None => {
                    slots.push(AdcSlot {
                        adc: Ads1115::new(addr),
                        inputs: Default::default(),
                        failures: 0,
                        faulted: false,
                    });
                    slots.len() - 1
                }
            };
            slots[idx].inputs[usize::from(input) % ADC_INPUTS] = Some(pipeline);
        }

        slots.retain(|slot| match slot.adc.probe(&mut bus) {
            Ok(()) => {
                info!("analog: ADC 0x{:02X} present", slot.adc.addr());
                true
            }
            Err(e) => {
                warn!("analog: ADC 0x{:02X} absent ({e}), channels skipped", slot.adc.addr());
                false
            }
        });

        Self { bus, slots, timing }
    }

    /// Addresses of the converters that answered the probe.
    pub fn present(&self) -> Vec<u8> {
        self.slots.iter().map(|s| s.adc.addr()).collect()
    }

    /// One pass over every present converter.  A converter's channels are
    /// fed only when all of its inputs converted, so a failing converter
    /// skips the cycle as a whole.  Returns early if `stop` is set after a
    /// bus transfer.
    pub fn cycle(&mut self, stop: &StopToken) {
        let timeout = self.timing.conversion_timeout;
        for slot in &mut self.slots {
            let addr = slot.adc.addr();
            let mut readings = [None; ADC_INPUTS];
            let mut failed = false;
            for (input, reading) in readings.iter_mut().enumerate() {
                if slot.inputs[input].is_none() {
                    continue;
                }
                let result = slot.adc.read_milliamps(&mut self.bus, input as u8, timeout);
                if stop.is_stopped() {
                    return;
                }
                match result {
                    Ok(ma) => *reading = Some(ma),
                    Err(e) => {
                        debug!("analog: ADC 0x{addr:02X} input {input}: {e}");
                        failed = true;
                        break;
                    }
                }
            }

            if !failed {
                for (pipeline, ma) in slot.inputs.iter_mut().zip(readings) {
                    if let (Some(pipeline), Some(ma)) = (pipeline, ma) {
                        pipeline.feed_analog(ma);
                    }
                }
            }

            if failed {
                slot.failures = slot.failures.saturating_add(1);
                if slot.failures >= FAULT_THRESHOLD && !slot.faulted {
                    slot.faulted = true;
                    error!("analog: ADC 0x{addr:02X} failed {} cycles in a row", slot.failures);
                    if let Some(sink) = slot.inputs.iter().flatten().next().map(|p| p.sink()) {
                        sink.emit(PanelEvent::DeviceFault { adc_addr: addr });
                    }
                }
            } else {
                if slot.faulted {
                    info!("analog: ADC 0x{addr:02X} recovered");
                }
                slot.failures = 0;
                slot.faulted = false;
            }
        }
    }

    /// Run cycles until stopped.  A missed deadline re-anchors at now.
    pub fn run(&mut self, stop: &StopToken) {
        info!("analog: sampler started, {} ADC(s)", self.slots.len());
        let mut next = Instant::now();
        while !stop.is_stopped() {
            self.cycle(stop);
            next += self.timing.cycle;
            let now = Instant::now();
            if next <= now {
                next = now;
            } else if stop.wait_until(next) {
                break;
            }
        }
        info!("analog: sampler stopped");
    }
}
