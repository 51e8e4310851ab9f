//! Log-based panel renderer.
//!
//! The binary's only UI: drains the [`EventBus`] on the UI thread, keeps a
//! [`PanelView`] of what a display would show, and writes state changes to
//! the log.  Blink-phase re-emits only touch the view (trace level), so the
//! log carries one line per real change.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::{info, trace, warn};

use crate::channel::display::SegmentText;
use crate::events::{ChannelIndex, EventBus, Lamps, PanelEvent, Stamped, UpsMode};

const POP_TIMEOUT: Duration = Duration::from_millis(200);

/// What one channel's display currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelView {
    pub text: Option<SegmentText>,
    pub blink_mask: u8,
    pub al1: bool,
    pub al2: bool,
    pub pwr: bool,
    pub fault: bool,
    pub lamps: Lamps,
    pub connected: Option<bool>,
    pub bar: Option<u8>,
}

/// Rendered panel state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelView {
    pub channels: BTreeMap<ChannelIndex, ChannelView>,
    pub ups: Option<(u8, UpsMode)>,
    pub ups_unavailable: bool,
    pub faulted_adcs: Vec<u8>,
}

/// UI-thread consumer of the event bus.
pub struct LogRenderer {
    bus: Arc<EventBus>,
    view: PanelView,
}

impl LogRenderer {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            view: PanelView::default(),
        }
    }

    pub fn view(&self) -> &PanelView {
        &self.view
    }

    /// Apply one event to the view and log it.
    pub fn handle(&mut self, stamped: &Stamped) {
        let at = stamped.at_ms;
        match stamped.event {
            PanelEvent::LinkState { ch, connected } => {
                self.channel(ch).connected = Some(connected);
                if connected {
                    info!("[{at:>8}] LINK  | box {ch:02} up");
                } else {
                    warn!("[{at:>8}] LINK  | box {ch:02} down");
                }
            }
            PanelEvent::AlarmChanged {
                ch,
                al1,
                al2,
                pwr,
                fault,
                lamps,
            } => {
                let view = self.channel(ch);
                let flags_changed =
                    (view.al1, view.al2, view.pwr, view.fault) != (al1, al2, pwr, fault);
                view.al1 = al1;
                view.al2 = al2;
                view.pwr = pwr;
                view.fault = fault;
                view.lamps = lamps;
                if flags_changed {
                    info!(
                        "[{at:>8}] ALARM | box {ch:02} | PWR={} AL1={} AL2={} FUT={}",
                        on_off(pwr),
                        on_off(al1),
                        on_off(al2),
                        on_off(fault)
                    );
                } else {
                    trace!("[{at:>8}] lamps box {ch:02} = 0b{:04b}", lamps.bits());
                }
            }
            PanelEvent::ValueChanged {
                ch,
                text,
                blink_mask,
            } => {
                let view = self.channel(ch);
                let text_changed = view.text != Some(text);
                view.text = Some(text);
                view.blink_mask = blink_mask;
                if text_changed {
                    info!("[{at:>8}] VALUE | box {ch:02} | [{text}]");
                } else {
                    trace!("[{at:>8}] digits box {ch:02} mask 0b{blink_mask:04b}");
                }
            }
            PanelEvent::BarLevel { ch, percent } => {
                self.channel(ch).bar = Some(percent);
                trace!("[{at:>8}] bar box {ch:02} = {percent}%");
            }
            PanelEvent::UpsBattery { percent, mode } => {
                if self.view.ups != Some((percent, mode)) {
                    info!("[{at:>8}] UPS   | {percent}% {mode:?}");
                }
                self.view.ups = Some((percent, mode));
            }
            PanelEvent::UpsUnavailable => {
                self.view.ups_unavailable = true;
                warn!("[{at:>8}] UPS   | monitor unavailable");
            }
            PanelEvent::DeviceFault { adc_addr } => {
                if !self.view.faulted_adcs.contains(&adc_addr) {
                    self.view.faulted_adcs.push(adc_addr);
                }
                warn!("[{at:>8}] FAULT | ADC 0x{adc_addr:02X} not responding");
            }
        }
    }

    /// Drain the bus until it is closed and empty.
    pub fn run(&mut self) {
        info!("ui: renderer started");
        loop {
            match self.bus.pop_timeout(POP_TIMEOUT) {
                Some(stamped) => self.handle(&stamped),
                None if self.bus.is_closed() && self.bus.is_empty() => break,
                None => {}
            }
        }
        info!("ui: renderer stopped");
    }

    fn channel(&mut self, ch: ChannelIndex) -> &mut ChannelView {
        self.view.channels.entry(ch).or_default()
    }
}

fn on_off(b: bool) -> &'static str {
    if b { "on" } else { "off" }
}
