//! Per-device Modbus/TCP poller.
//!
//! ```text
//!   Disconnected ──▶ Connecting ──▶ Connected ⇄ Reading
//!        ▲               │ 5 × fail            │ read error
//!        └───────────────┘                     ▼
//!                                        Reconnecting ──▶ Connecting
//! ```
//!
//! Connect: up to five attempts, a retry delay after each failure.  On
//! exhaustion the channel is reported down and the next attempt starts one
//! poll period later.  While connected, the four registers are read every
//! poll period; a missed deadline re-anchors at the current instant instead
//! of catching up.  Any read failure drops the session and reconnects.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::app::ports::LinkConnector;
use crate::channel::pipeline::ChannelPipeline;
use crate::events::PanelEvent;
use crate::task::StopToken;

use super::registers::{FirmwareInfo, RegisterFrame};

/// Poller timing.  Defaults are the production values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerTiming {
    pub poll_period: Duration,
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for PollerTiming {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_millis(400),
            connect_attempts: 5,
            connect_retry_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(3),
        }
    }
}

/// Link lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    Connecting,
    Connected,
    Reading,
    Reconnecting,
}

enum SessionEnd {
    Stopped,
    LinkFailed,
}

/// One detector box: owns its connector, session and channel pipeline.
pub struct ModbusPoller<C: LinkConnector> {
    host: String,
    port: u16,
    connector: C,
    pipeline: ChannelPipeline,
    timing: PollerTiming,
    phase: LinkPhase,
    reported: Option<bool>,
}

impl<C: LinkConnector> ModbusPoller<C> {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        connector: C,
        pipeline: ChannelPipeline,
        timing: PollerTiming,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            connector,
            pipeline,
            timing,
            phase: LinkPhase::Disconnected,
            reported: None,
        }
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn pipeline(&self) -> &ChannelPipeline {
        &self.pipeline
    }

    /// Run until `stop` is set.  Never returns an error: every failure is
    /// turned into a log line and a link event.
    pub fn run(&mut self, stop: &StopToken) {
        let ch = self.pipeline.index();
        info!("modbus[{ch}]: poller started for {}:{}", self.host, self.port);

        while !stop.is_stopped() {
            self.phase = LinkPhase::Connecting;
            let Some(mut link) = self.connect(stop) else {
                if stop.is_stopped() {
                    break;
                }
                self.phase = LinkPhase::Disconnected;
                self.report_link(false);
                if stop.wait_timeout(self.timing.poll_period) {
                    break;
                }
                continue;
            };

            self.phase = LinkPhase::Connected;
            self.report_link(true);
            match FirmwareInfo::read_from(&mut link) {
                Ok(fw) => info!("modbus[{ch}]: firmware {fw}"),
                Err(e) => debug!("modbus[{ch}]: firmware registers unavailable: {e}"),
            }

            match self.poll_session(&mut link, stop) {
                SessionEnd::Stopped => break,
                SessionEnd::LinkFailed => {
                    self.phase = LinkPhase::Reconnecting;
                    self.report_link(false);
                    self.pipeline.link_lost();
                }
            }
        }

        self.phase = LinkPhase::Disconnected;
        info!("modbus[{ch}]: poller stopped");
    }

    fn connect(&mut self, stop: &StopToken) -> Option<C::Link> {
        let ch = self.pipeline.index();
        for attempt in 1..=self.timing.connect_attempts {
            if stop.is_stopped() {
                return None;
            }
            match self.connector.connect(
                &self.host,
                self.port,
                self.timing.connect_timeout,
                self.timing.read_timeout,
            ) {
                Ok(link) => {
                    info!("modbus[{ch}]: connected to {}:{}", self.host, self.port);
                    return Some(link);
                }
                Err(e) => warn!(
                    "modbus[{ch}]: connect attempt {attempt}/{} failed: {e}",
                    self.timing.connect_attempts
                ),
            }
            if stop.wait_timeout(self.timing.connect_retry_delay) {
                return None;
            }
        }
        warn!(
            "modbus[{ch}]: giving up after {} attempts",
            self.timing.connect_attempts
        );
        None
    }

    fn poll_session(&mut self, link: &mut C::Link, stop: &StopToken) -> SessionEnd {
        let ch = self.pipeline.index();
        let mut next = Instant::now();
        loop {
            if stop.is_stopped() {
                return SessionEnd::Stopped;
            }
            self.phase = LinkPhase::Reading;
            let frame = RegisterFrame::read_until(link, stop);
            if stop.is_stopped() {
                return SessionEnd::Stopped;
            }
            match frame {
                Ok(Some(frame)) => {
                    self.pipeline.feed_modbus(&frame);
                }
                Ok(None) => return SessionEnd::Stopped,
                Err(e) => {
                    warn!("modbus[{ch}]: read failed: {e}");
                    return SessionEnd::LinkFailed;
                }
            }
            self.phase = LinkPhase::Connected;

            next += self.timing.poll_period;
            let now = Instant::now();
            if next <= now {
                debug!("modbus[{ch}]: poll deadline missed, re-anchoring");
                next = now;
            } else if stop.wait_until(next) {
                return SessionEnd::Stopped;
            }
        }
    }

    fn report_link(&mut self, connected: bool) {
        if self.reported == Some(connected) {
            return;
        }
        self.reported = Some(connected);
        let ch = self.pipeline.index();
        if connected {
            info!("modbus[{ch}]: link up");
        } else {
            warn!("modbus[{ch}]: link down");
        }
        self.pipeline
            .sink()
            .emit(PanelEvent::LinkState { ch, connected });
    }
}

