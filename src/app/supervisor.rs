//! Task supervisor.
//!
//! Owns every acquisition task for the current configuration:
//!
//! | Task          | Count               | Body                          |
//! |---------------|---------------------|-------------------------------|
//! | `modbus-<i>`  | one per Modbus box  | [`ModbusPoller::run`]         |
//! | `analog`      | one if any analog   | [`AnalogSampler::run`]        |
//! | `ups`         | one                 | [`UpsSampler::run`]           |
//! | `blink`       | one                 | [`blink::run`]                |
//!
//! Each task runs under [`spawn_supervised`]: a panic is logged and the task
//! rebuilt from scratch after the restart back-off.  A configuration change
//! that touches the channel set stops everything, joins, and starts again.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info, warn};

use crate::app::ports::{ConfigPort, EventSink, Platform};
use crate::blink::{self, BlinkBoard, BLINK_PERIOD};
use crate::channel::pipeline::ChannelPipeline;
use crate::channel::{ChannelState, SourceKind};
use crate::config::{ChannelSource, PanelConfig, SharedConfig};
use crate::error::{Error, Result};
use crate::events::PanelEvent;
use crate::history::HistoryLog;
use crate::modbus::{ModbusPoller, PollerTiming};
use crate::sensors::{AnalogSampler, AnalogTiming, UpsSampler, UpsTiming};
use crate::task::{spawn_supervised, StopToken, RESTART_BACKOFF};

/// History subdirectory for Modbus channels.
pub const MODBUS_HISTORY_DIR: &str = "modbus";
/// History subdirectory for analog channels.
pub const ANALOG_HISTORY_DIR: &str = "analog";

/// Timing for every task the supervisor starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTiming {
    pub poller: PollerTiming,
    pub analog: AnalogTiming,
    pub ups: UpsTiming,
    pub blink: Duration,
    pub restart_backoff: Duration,
}

impl Default for SupervisorTiming {
    fn default() -> Self {
        Self {
            poller: PollerTiming::default(),
            analog: AnalogTiming::default(),
            ups: UpsTiming::default(),
            blink: BLINK_PERIOD,
            restart_backoff: RESTART_BACKOFF,
        }
    }
}

pub struct Supervisor<P: Platform, S: ConfigPort> {
    platform: Arc<P>,
    store: S,
    config: SharedConfig,
    sink: Arc<dyn EventSink>,
    board: Arc<BlinkBoard>,
    history_root: PathBuf,
    timing: SupervisorTiming,
    ups_unavailable: Arc<AtomicBool>,
    stop: StopToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl<P: Platform, S: ConfigPort> Supervisor<P, S> {
    pub fn new(
        platform: P,
        store: S,
        config: PanelConfig,
        sink: Arc<dyn EventSink>,
        history_root: impl Into<PathBuf>,
        timing: SupervisorTiming,
    ) -> Self {
        Self {
            platform: Arc::new(platform),
            store,
            config: SharedConfig::new(config),
            sink,
            board: Arc::new(BlinkBoard::new()),
            history_root: history_root.into(),
            timing,
            ups_unavailable: Arc::new(AtomicBool::new(false)),
            stop: StopToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<PanelConfig> {
        self.config.snapshot()
    }

    pub fn board(&self) -> &Arc<BlinkBoard> {
        &self.board
    }

    /// Number of task threads currently owned.
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Start every task for the current configuration.
    pub fn start(&mut self) -> Result<()> {
        if !self.tasks.is_empty() {
            return Ok(());
        }
        let config = self.config.snapshot();
        let modbus_log = HistoryLog::open(self.history_root.join(MODBUS_HISTORY_DIR))?;
        let analog_log = HistoryLog::open(self.history_root.join(ANALOG_HISTORY_DIR))?;

        let mut analog = Vec::new();
        for spec in config.channels() {
            match spec.source {
                ChannelSource::Modbus { host, port } => {
                    let platform = Arc::clone(&self.platform);
                    let board = Arc::clone(&self.board);
                    let sink = Arc::clone(&self.sink);
                    let log = modbus_log.clone();
                    let stop = self.stop.clone();
                    let timing = self.timing.poller;
                    self.spawn(&format!("modbus-{}", spec.index), move || {
                        let state = ChannelState::new(spec.index, spec.kind, SourceKind::Modbus);
                        let pipeline =
                            ChannelPipeline::new(state, log.clone(), Arc::clone(&board), Arc::clone(&sink));
                        ModbusPoller::new(host.clone(), port, platform.connector(), pipeline, timing)
                            .run(&stop);
                    })?;
                }
                ChannelSource::Analog {
                    adc_addr,
                    adc_channel,
                } => analog.push((spec.index, spec.kind, adc_addr, adc_channel)),
            }
        }

        if !analog.is_empty() {
            let platform = Arc::clone(&self.platform);
            let board = Arc::clone(&self.board);
            let sink = Arc::clone(&self.sink);
            let stop = self.stop.clone();
            let timing = self.timing.analog;
            self.spawn("analog", move || {
                let bus = match platform.open_bus() {
                    Ok(bus) => bus,
                    Err(e) => {
                        error!("analog: {e}; analog channels disabled");
                        let mut addrs: Vec<u8> = analog.iter().map(|&(_, _, addr, _)| addr).collect();
                        addrs.sort_unstable();
                        addrs.dedup();
                        for adc_addr in addrs {
                            sink.emit(PanelEvent::DeviceFault { adc_addr });
                        }
                        return;
                    }
                };
                let channels = analog.iter().map(|&(index, kind, addr, input)| {
                    let state = ChannelState::new(index, kind, SourceKind::Analog);
                    let pipeline =
                        ChannelPipeline::new(state, analog_log.clone(), Arc::clone(&board), Arc::clone(&sink));
                    (addr, input, pipeline)
                });
                AnalogSampler::new(bus, channels, timing).run(&stop);
            })?;
        }

        if self.ups_unavailable.load(Ordering::Relaxed) {
            info!("supervisor: UPS monitor unavailable this session, not sampling");
        } else {
            let platform = Arc::clone(&self.platform);
            let sink = Arc::clone(&self.sink);
            let stop = self.stop.clone();
            let unavailable = Arc::clone(&self.ups_unavailable);
            let timing = self.timing.ups;
            self.spawn("ups", move || {
                let bus = match platform.open_bus() {
                    Ok(bus) => bus,
                    Err(e) => {
                        error!("ups: {e}; monitor unavailable");
                        unavailable.store(true, Ordering::Relaxed);
                        sink.emit(PanelEvent::UpsUnavailable);
                        return;
                    }
                };
                let mut sampler = UpsSampler::new(bus, Arc::clone(&sink), timing);
                if !sampler.is_available() {
                    unavailable.store(true, Ordering::Relaxed);
                }
                sampler.run(&stop);
            })?;
        }

        {
            let board = Arc::clone(&self.board);
            let sink = Arc::clone(&self.sink);
            let stop = self.stop.clone();
            let period = self.timing.blink;
            self.spawn("blink", move || {
                blink::run(Arc::clone(&board), Arc::clone(&sink), period, stop.clone());
            })?;
        }

        info!(
            "supervisor: started {} task(s) for {} Modbus + {} analog channel(s)",
            self.tasks.len(),
            config.modbus_boxes,
            config.analog_boxes
        );
        Ok(())
    }

    /// Stop every task and wait for it to exit.
    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        info!("supervisor: stopping {} task(s)", self.tasks.len());
        self.stop.stop();
        for (name, handle) in self.tasks.drain(..) {
            if handle.join().is_err() {
                warn!("supervisor: task '{name}' ended abnormally");
            }
        }
        self.stop = StopToken::new();
        self.board.clear();
        info!("supervisor: all tasks stopped");
    }

    /// Validate, persist and apply a new configuration.  Tasks restart only
    /// if the channel set changed.
    pub fn reconfigure(&mut self, next: PanelConfig) -> Result<()> {
        next.validate()?;
        self.store.save(&next)?;
        self.apply(next)
    }

    /// Re-read the config file and apply it if it changed.
    pub fn reload(&mut self) -> Result<()> {
        let next = self.store.load()?;
        if *self.config.snapshot() == next {
            info!("supervisor: config unchanged");
            return Ok(());
        }
        self.apply(next)
    }

    /// Stop everything for process exit.
    pub fn shutdown(mut self) {
        self.stop();
        info!("supervisor: shut down");
    }

    fn apply(&mut self, next: PanelConfig) -> Result<()> {
        let restart = self.config.snapshot().needs_restart(&next);
        self.config.publish(next);
        if restart {
            info!("supervisor: channel set changed, restarting tasks");
            self.stop();
            self.start()?;
        }
        Ok(())
    }

    fn spawn<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let handle = spawn_supervised(name, self.stop.clone(), self.timing.restart_backoff, body)
            .map_err(Error::Task)?;
        self.tasks.push((name.to_owned(), handle));
        Ok(())
    }
}

impl<P: Platform, S: ConfigPort> Drop for Supervisor<P, S> {
    fn drop(&mut self) {
        self.stop();
    }
}
