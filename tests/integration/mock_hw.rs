//! Mock adapters for integration tests.
//!
//! Records every emitted event and scripts every Modbus session so tests
//! can assert on the full event history without a network or an I²C bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use gms1000::adapters::i2c::SimBus;
use gms1000::app::ports::{ConfigPort, EventSink, LinkConnector, Platform, RegisterLink};
use gms1000::config::PanelConfig;
use gms1000::error::{BusError, ConfigError, LinkError};
use gms1000::events::PanelEvent;
use gms1000::modbus::RegisterFrame;
use gms1000::modbus::registers::{BAR, ERROR_BITS, READING, STATUS};

// ── Event recorder ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PanelEvent>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<PanelEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn count(&self, pred: impl Fn(&PanelEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    pub fn link_states(&self, ch: u8) -> Vec<bool> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                PanelEvent::LinkState { ch: c, connected } if *c == ch => Some(*connected),
                _ => None,
            })
            .collect()
    }

    /// Poll until `pred` holds or `timeout` elapses.
    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&[PanelEvent]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if pred(&self.events.lock()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: PanelEvent) {
        self.events.lock().push(event);
    }
}

// ── Scripted Modbus detector ──────────────────────────────────

#[derive(Default)]
struct Detector {
    /// Connect attempts left to refuse.
    refuse_connects: u32,
    /// Refuse every connect.
    offline: bool,
    /// Frames served in order; the last one repeats.
    frames: VecDeque<RegisterFrame>,
    /// Fail the read after this many more successful frames.
    fail_after: Option<u32>,
    /// Delay the next cycle's first read by this much.
    stall: Option<Duration>,
    connects: u32,
    frames_served: u32,
}

/// Connector shared by every poller in a test; detectors are keyed by host.
#[derive(Clone, Default)]
pub struct FakeConnector {
    detectors: Arc<Mutex<HashMap<String, Detector>>>,
}

#[allow(dead_code)]
impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, host: &str, frames: impl IntoIterator<Item = RegisterFrame>) {
        self.detectors
            .lock()
            .entry(host.to_owned())
            .or_default()
            .frames
            .extend(frames);
    }

    pub fn refuse_connects(&self, host: &str, n: u32) {
        self.detectors.lock().entry(host.to_owned()).or_default().refuse_connects = n;
    }

    pub fn set_offline(&self, host: &str, offline: bool) {
        let mut detectors = self.detectors.lock();
        let d = detectors.entry(host.to_owned()).or_default();
        d.offline = offline;
        if !offline {
            d.fail_after = None;
        }
    }

    pub fn fail_after(&self, host: &str, frames: u32) {
        self.detectors.lock().entry(host.to_owned()).or_default().fail_after = Some(frames);
    }

    pub fn stall_next_read(&self, host: &str, delay: Duration) {
        self.detectors.lock().entry(host.to_owned()).or_default().stall = Some(delay);
    }

    pub fn connects(&self, host: &str) -> u32 {
        self.detectors.lock().get(host).map_or(0, |d| d.connects)
    }

    pub fn frames_served(&self, host: &str) -> u32 {
        self.detectors.lock().get(host).map_or(0, |d| d.frames_served)
    }
}

pub struct FakeLink {
    host: String,
    detectors: Arc<Mutex<HashMap<String, Detector>>>,
}

impl LinkConnector for FakeConnector {
    type Link = FakeLink;

    fn connect(
        &mut self,
        host: &str,
        _port: u16,
        _connect_timeout: Duration,
        _read_timeout: Duration,
    ) -> Result<FakeLink, LinkError> {
        let mut detectors = self.detectors.lock();
        let d = detectors.entry(host.to_owned()).or_default();
        d.connects += 1;
        if d.offline {
            return Err(LinkError::Connect(format!("{host}: connection refused")));
        }
        if d.refuse_connects > 0 {
            d.refuse_connects -= 1;
            return Err(LinkError::Connect(format!("{host}: connection refused")));
        }
        Ok(FakeLink {
            host: host.to_owned(),
            detectors: Arc::clone(&self.detectors),
        })
    }
}

impl RegisterLink for FakeLink {
    fn read_holding(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, LinkError> {
        if addr == STATUS {
            let stall = self.detectors.lock().get_mut(&self.host).and_then(|d| d.stall.take());
            if let Some(delay) = stall {
                std::thread::sleep(delay);
            }
        }
        let mut detectors = self.detectors.lock();
        let d = detectors.get_mut(&self.host).ok_or(LinkError::Timeout)?;
        if d.offline {
            return Err(LinkError::Timeout);
        }
        if count != 1 {
            return Err(LinkError::Exception("IllegalDataAddress".into()));
        }
        let frame = d.frames.front().copied().unwrap_or_default();
        let value = match addr {
            STATUS => {
                if let Some(left) = d.fail_after.as_mut() {
                    if *left == 0 {
                        d.offline = true;
                        return Err(LinkError::Timeout);
                    }
                    *left -= 1;
                }
                frame.status
            }
            READING => frame.reading,
            ERROR_BITS => frame.error_bits,
            BAR => {
                d.frames_served += 1;
                if d.frames.len() > 1 {
                    d.frames.pop_front();
                }
                frame.bar
            }
            _ => return Err(LinkError::Exception("IllegalDataAddress".into())),
        };
        Ok(vec![value])
    }
}

// ── Platform ──────────────────────────────────────────────────

pub struct TestPlatform {
    pub bus: SimBus,
    pub connector: FakeConnector,
    pub bus_opens: Arc<Mutex<u32>>,
    pub bus_missing: Arc<Mutex<bool>>,
}

#[allow(dead_code)]
impl TestPlatform {
    pub fn new(bus: SimBus, connector: FakeConnector) -> Self {
        Self {
            bus,
            connector,
            bus_opens: Arc::new(Mutex::new(0)),
            bus_missing: Arc::new(Mutex::new(false)),
        }
    }

    /// A platform whose I²C controller cannot be opened.
    pub fn without_bus(connector: FakeConnector) -> Self {
        let p = Self::new(SimBus::new(), connector);
        *p.bus_missing.lock() = true;
        p
    }
}

impl Platform for TestPlatform {
    type Bus = SimBus;
    type Connector = FakeConnector;

    fn open_bus(&self) -> Result<SimBus, BusError> {
        *self.bus_opens.lock() += 1;
        if *self.bus_missing.lock() {
            return Err(BusError::Open);
        }
        Ok(self.bus.clone())
    }

    fn connector(&self) -> FakeConnector {
        self.connector.clone()
    }
}

// ── In-memory config store ────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemConfig {
    pub stored: Arc<Mutex<Option<PanelConfig>>>,
    pub saves: Arc<Mutex<u32>>,
}

#[allow(dead_code)]
impl MemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, config: PanelConfig) {
        *self.stored.lock() = Some(config);
    }
}

impl ConfigPort for MemConfig {
    fn load(&self) -> Result<PanelConfig, ConfigError> {
        Ok(self.stored.lock().clone().unwrap_or_default())
    }

    fn save(&self, config: &PanelConfig) -> Result<(), ConfigError> {
        config.validate()?;
        *self.stored.lock() = Some(config.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

// ── Frames ────────────────────────────────────────────────────

#[allow(dead_code)]
pub fn frame(status: u16, reading: u16, error_bits: u16, bar: u16) -> RegisterFrame {
    RegisterFrame {
        status,
        reading,
        error_bits,
        bar,
    }
}
