//! Panel configuration.
//!
//! The persisted shape is the JSON object described in the config file
//! format: channel counts, per-channel gas types keyed `box_<i>`, and the
//! admin secret.  Encryption and file handling live in
//! [`crate::adapters::config_store`]; this module only knows the data and
//! its validation rules.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gas::GasKind;

/// Hard limit on detector channels the panel can display.
pub const MAX_CHANNELS: usize = 14;

/// I²C addresses of the four ADS1115 converters, four inputs each.
pub const ADC_ADDRESSES: [u8; 4] = [0x48, 0x49, 0x4A, 0x4B];

/// Inputs per ADS1115.
pub const ADC_INPUTS: usize = 4;

/// Standard Modbus/TCP port.
pub const MODBUS_PORT: u16 = 502;

/// Hosts without an explicit `modbus_hosts` entry get `<prefix><101 + i>`.
const DEFAULT_HOST_PREFIX: &str = "192.168.0.";

/// Persisted panel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Number of Modbus/TCP detector boxes (channels `0..modbus_boxes`).
    pub modbus_boxes: u8,
    /// Number of 4–20 mA boxes; they follow the Modbus channels.
    pub analog_boxes: u8,
    /// Settings-screen password, `None` until first set.
    #[serde(default)]
    pub admin_secret: Option<String>,
    /// Gas kind per channel; missing channels default to ORG.
    #[serde(default, with = "box_keyed")]
    pub gas_types: BTreeMap<u8, GasKind>,
    /// Optional host override per Modbus channel.
    #[serde(default, with = "box_keyed", skip_serializing_if = "BTreeMap::is_empty")]
    pub modbus_hosts: BTreeMap<u8, String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            modbus_boxes: MAX_CHANNELS as u8,
            analog_boxes: 0,
            admin_secret: None,
            gas_types: BTreeMap::new(),
            modbus_hosts: BTreeMap::new(),
        }
    }
}

/// Where a channel's samples come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSource {
    Modbus { host: String, port: u16 },
    Analog { adc_addr: u8, adc_channel: u8 },
}

/// Fully resolved description of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub index: u8,
    pub kind: GasKind,
    pub source: ChannelSource,
}

impl PanelConfig {
    /// Total configured channels.
    pub fn channel_count(&self) -> usize {
        self.modbus_boxes as usize + self.analog_boxes as usize
    }

    /// Gas kind for channel `ch` (ORG when unset).
    pub fn gas_kind(&self, ch: u8) -> GasKind {
        self.gas_types.get(&ch).copied().unwrap_or_default()
    }

    /// Resolve every configured channel to its source.
    pub fn channels(&self) -> Vec<ChannelSpec> {
        let modbus = (0..self.modbus_boxes).map(|i| ChannelSpec {
            index: i,
            kind: self.gas_kind(i),
            source: ChannelSource::Modbus {
                host: self
                    .modbus_hosts
                    .get(&i)
                    .cloned()
                    .unwrap_or_else(|| format!("{DEFAULT_HOST_PREFIX}{}", 101 + u16::from(i))),
                port: MODBUS_PORT,
            },
        });
        let analog = (0..self.analog_boxes).map(|k| {
            let index = self.modbus_boxes + k;
            ChannelSpec {
                index,
                kind: self.gas_kind(index),
                source: ChannelSource::Analog {
                    adc_addr: ADC_ADDRESSES[k as usize / ADC_INPUTS],
                    adc_channel: k % ADC_INPUTS as u8,
                },
            }
        });
        modbus.chain(analog).collect()
    }

    /// Range-check every field.  Called before persisting and after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_count() > MAX_CHANNELS {
            return Err(ConfigError::Validation(
                "modbus_boxes + analog_boxes must be at most 14",
            ));
        }
        if self.analog_boxes as usize > ADC_ADDRESSES.len() * ADC_INPUTS {
            return Err(ConfigError::Validation("analog_boxes must be at most 16"));
        }
        let count = self.channel_count();
        if self.gas_types.keys().any(|&ch| ch as usize >= count) {
            return Err(ConfigError::Validation(
                "gas_types references a channel beyond the configured count",
            ));
        }
        if self.modbus_hosts.keys().any(|&ch| ch >= self.modbus_boxes) {
            return Err(ConfigError::Validation(
                "modbus_hosts references a non-Modbus channel",
            ));
        }
        if self.modbus_hosts.values().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::Validation("modbus_hosts entries must be non-empty"));
        }
        Ok(())
    }

    /// Whether applying `next` requires restarting the acquisition tasks.
    pub fn needs_restart(&self, next: &PanelConfig) -> bool {
        self.modbus_boxes != next.modbus_boxes
            || self.analog_boxes != next.analog_boxes
            || self.gas_types != next.gas_types
            || self.modbus_hosts != next.modbus_hosts
    }
}

/// Read-mostly config snapshot shared between the supervisor (single writer)
/// and everything else.
pub struct SharedConfig {
    current: ArcSwap<PanelConfig>,
}

impl SharedConfig {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Cheap pointer snapshot, taken at cycle head by readers.
    pub fn snapshot(&self) -> Arc<PanelConfig> {
        self.current.load_full()
    }

    /// Publish a new config.  Only the supervisor calls this.
    pub fn publish(&self, config: PanelConfig) {
        self.current.store(Arc::new(config));
    }
}

/// Serde adapter for maps stored as `{"box_<i>": value}`.
mod box_keyed {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, V>(map: &BTreeMap<u8, V>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        s.collect_map(map.iter().map(|(k, v)| (format!("box_{k}"), v)))
    }

    pub fn deserialize<'de, D, V>(d: D) -> Result<BTreeMap<u8, V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        BTreeMap::<String, V>::deserialize(d)?
            .into_iter()
            .map(|(key, v)| {
                key.strip_prefix("box_")
                    .and_then(|n| n.parse::<u8>().ok())
                    .map(|ch| (ch, v))
                    .ok_or_else(|| D::Error::custom(format!("invalid channel key `{key}`")))
            })
            .collect()
    }
}
