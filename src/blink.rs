//! Blink scheduler.
//!
//! One global 600 ms symmetric toggle for every blinking lamp and display.
//! Producers publish each channel's [`DisplayState`] to the shared
//! [`BlinkBoard`]; the scheduler flips the phase bit and re-emits the masked
//! state of every channel whose state says something blinks.
//!
//! Publishing and toggling serialise on the board lock, so an event never
//! carries a phase older than one already delivered for that channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use crate::app::ports::EventSink;
use crate::channel::{DisplayState, Update};
use crate::events::ChannelIndex;
use crate::task::StopToken;

/// Blink half-period.
pub const BLINK_PERIOD: Duration = Duration::from_millis(600);

struct Board {
    phase_on: bool,
    channels: BTreeMap<ChannelIndex, DisplayState>,
}

/// Per-channel blink specifications plus the global phase bit.
pub struct BlinkBoard {
    inner: Mutex<Board>,
}

impl Default for BlinkBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl BlinkBoard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Board {
                phase_on: true,
                channels: BTreeMap::new(),
            }),
        }
    }

    pub fn phase_on(&self) -> bool {
        self.inner.lock().phase_on
    }

    /// Record the channel's new state and emit the update's events rendered
    /// in the current phase.
    pub fn publish(&self, ch: ChannelIndex, update: &Update, sink: &dyn EventSink) {
        let mut board = self.inner.lock();
        board.channels.insert(ch, update.state);
        for event in update.events(ch, board.phase_on) {
            sink.emit(event);
        }
    }

    /// Current state of `ch`, if it has published.
    pub fn state(&self, ch: ChannelIndex) -> Option<DisplayState> {
        self.inner.lock().channels.get(&ch).copied()
    }

    /// Forget every channel; used when the channel set is rebuilt.
    pub fn clear(&self) {
        let mut board = self.inner.lock();
        board.channels.clear();
        board.phase_on = true;
    }

    /// Flip the phase and emit the masked state of blinking channels.
    /// Returns the new phase.
    pub fn toggle(&self, sink: &dyn EventSink) -> bool {
        let mut board = self.inner.lock();
        board.phase_on = !board.phase_on;
        let phase_on = board.phase_on;
        for (&ch, state) in board.channels.iter().filter(|(_, s)| s.is_blinking()) {
            if state.blinking.bits() != 0 {
                sink.emit(state.alarm_event(ch, phase_on));
            }
            if state.blink_display {
                sink.emit(state.value_event(ch, phase_on));
            }
        }
        phase_on
    }
}

/// Scheduler task body: toggle every `period` until stopped.
pub fn run(board: Arc<BlinkBoard>, sink: Arc<dyn EventSink>, period: Duration, stop: StopToken) {
    info!("blink: scheduler started ({} ms)", period.as_millis());
    while !stop.wait_timeout(period) {
        board.toggle(sink.as_ref());
    }
    info!("blink: scheduler stopped");
}
