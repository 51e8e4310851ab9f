//! Event bus between the acquisition tasks and the UI.
//!
//! Producers (Modbus pollers, the analog sampler, the UPS sampler and the
//! blink scheduler) push [`PanelEvent`]s; the UI thread is the single
//! consumer and the only code that touches the render surface.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Modbus ×N    │────▶│              │     │              │
//! │ Analog       │────▶│  EventBus    │────▶│  UI thread   │
//! │ UPS          │────▶│  (bounded)   │     │  (consumer)  │
//! │ Blink        │────▶│              │     │              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! The queue is bounded.  When full, the oldest sample-grade event
//! (`ValueChanged`, `BarLevel`, `UpsBattery`) is dropped.  State events
//! (`LinkState`, `AlarmChanged`, ...) are never dropped; if no sample can
//! be evicted, a state event replaces the pending one for the same channel.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::warn;
use parking_lot::{Condvar, Mutex};

use crate::adapters::time::MonotonicClock;
use crate::app::ports::EventSink;
use crate::channel::display::SegmentText;

/// Default queue bound.
pub const EVENT_QUEUE_CAP: usize = 1024;

/// Channel index `0..14`.
pub type ChannelIndex = u8;

/// Indicator lamps lit in the current blink phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lamps(u8);

impl Lamps {
    pub const PWR: Lamps = Lamps(0b0001);
    pub const AL1: Lamps = Lamps(0b0010);
    pub const AL2: Lamps = Lamps(0b0100);
    pub const FUT: Lamps = Lamps(0b1000);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Unknown bits are discarded.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    pub const fn contains(self, lamp: Lamps) -> bool {
        self.0 & lamp.0 == lamp.0
    }

    /// Return a copy with `lamp` switched on or off.
    #[must_use]
    pub const fn with(self, lamp: Lamps, on: bool) -> Self {
        if on {
            Self(self.0 | lamp.0)
        } else {
            Self(self.0 & !lamp.0)
        }
    }
}

/// Whether the UPS battery is being charged or drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsMode {
    Charging,
    Discharging,
}

/// Events delivered to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    /// Modbus link came up or went down.
    LinkState { ch: ChannelIndex, connected: bool },
    /// Alarm / power / fault flags, plus the lamps lit in the current phase.
    AlarmChanged {
        ch: ChannelIndex,
        al1: bool,
        al2: bool,
        pwr: bool,
        fault: bool,
        lamps: Lamps,
    },
    /// Four-character display text.  `blink_mask` marks digit positions
    /// hidden in the current blink phase (bit 0 = leftmost digit).
    ValueChanged {
        ch: ChannelIndex,
        text: SegmentText,
        blink_mask: u8,
    },
    /// Bar-graph level 0..=100 (Modbus register 40011).
    BarLevel { ch: ChannelIndex, percent: u8 },
    /// UPS battery state of charge.
    UpsBattery { percent: u8, mode: UpsMode },
    /// The UPS monitor did not answer at startup.  Sent once.
    UpsUnavailable,
    /// An ADC failed 30 consecutive cycles.
    DeviceFault { adc_addr: u8 },
}

impl PanelEvent {
    /// Sample-grade events may be dropped under back-pressure.
    pub fn is_sample_grade(&self) -> bool {
        matches!(
            self,
            Self::ValueChanged { .. } | Self::BarLevel { .. } | Self::UpsBattery { .. }
        )
    }

    /// Channel the event refers to, if any.
    pub fn channel(&self) -> Option<ChannelIndex> {
        match self {
            Self::LinkState { ch, .. }
            | Self::AlarmChanged { ch, .. }
            | Self::ValueChanged { ch, .. }
            | Self::BarLevel { ch, .. } => Some(*ch),
            _ => None,
        }
    }

    /// Identity used to coalesce pending state events.
    fn coalesce_key(&self) -> Option<(u8, u8)> {
        match self {
            Self::LinkState { ch, .. } => Some((0, *ch)),
            Self::AlarmChanged { ch, .. } => Some((1, *ch)),
            Self::UpsUnavailable => Some((2, 0)),
            Self::DeviceFault { adc_addr } => Some((3, *adc_addr)),
            _ => None,
        }
    }
}

/// An event with its monotonic enqueue time.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped {
    pub at_ms: u64,
    pub event: PanelEvent,
}

struct BusState {
    queue: VecDeque<Stamped>,
    dropped: u64,
    closed: bool,
}

/// Bounded many-producer, single-consumer event queue.
pub struct EventBus {
    state: Mutex<BusState>,
    ready: Condvar,
    capacity: usize,
    clock: MonotonicClock,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAP)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState {
                queue: VecDeque::with_capacity(capacity),
                dropped: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            capacity: capacity.max(1),
            clock: MonotonicClock::new(),
        }
    }

    /// Enqueue an event.  Returns `false` if it had to be discarded.
    pub fn push(&self, event: PanelEvent) -> bool {
        let stamped = Stamped {
            at_ms: self.clock.uptime_ms(),
            event,
        };

        let mut st = self.state.lock();
        if st.closed {
            return false;
        }

        if st.queue.len() >= self.capacity {
            if let Some(pos) = st.queue.iter().position(|s| s.event.is_sample_grade()) {
                st.queue.remove(pos);
                st.dropped += 1;
            } else if stamped.event.is_sample_grade() {
                st.dropped += 1;
                return false;
            } else {
                let key = stamped.event.coalesce_key();
                let pending = st
                    .queue
                    .iter()
                    .position(|s| key.is_some() && s.event.coalesce_key() == key);
                match pending {
                    Some(pos) => {
                        st.queue.remove(pos);
                    }
                    None => {
                        st.dropped += 1;
                        warn!("EventBus: queue saturated with state events, dropping {:?}", stamped.event);
                        return false;
                    }
                }
            }
        }

        st.queue.push_back(stamped);
        drop(st);
        self.ready.notify_one();
        true
    }

    /// Pop the next event without blocking.
    pub fn try_pop(&self) -> Option<Stamped> {
        self.state.lock().queue.pop_front()
    }

    /// Pop the next event, waiting up to `timeout`.  Returns `None` on
    /// timeout or once the bus is closed and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Stamped> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock();
        loop {
            if let Some(ev) = st.queue.pop_front() {
                return Some(ev);
            }
            if st.closed {
                return None;
            }
            if self.ready.wait_until(&mut st, deadline).timed_out() {
                return st.queue.pop_front();
            }
        }
    }

    /// Drain all pending events into a callback, in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Stamped)) {
        while let Some(ev) = self.try_pop() {
            handler(ev);
        }
    }

    /// Refuse further events and wake the consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events discarded under back-pressure since startup.
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: PanelEvent) {
        self.push(event);
    }
}
