//! Channel state machine.
//!
//! Turns a raw sample into an engineering value, alarm flags, display text
//! and a blink specification, and decides which events the sample warrants.
//! Both source flavours share one classifier; they differ only in how the
//! flags are derived and in alarm lamp priority.
//!
//! ```text
//!   mA reading ──▶ SlidingMean ──▶ value ──┐
//!                                          ├──▶ DisplayState ──▶ Update
//!   RegisterFrame ─────────────────────────┘
//! ```
//!
//! The classifier never sleeps and never emits directly: it returns an
//! [`Update`] and the [`pipeline`] renders it against the current blink
//! phase.

pub mod display;
pub mod filter;
pub mod pipeline;

use crate::events::{ChannelIndex, Lamps, PanelEvent};
use crate::gas::{self, GasKind, GasProfile};
use crate::modbus::registers::RegisterFrame;

use display::{SegmentText, ALL_DIGITS};
use filter::SlidingMean;

/// Loop current below which the detector is considered unpowered.
pub const PWR_THRESHOLD_MA: f32 = 1.5;

const LOOP_ZERO_MA: f32 = 4.0;
const LOOP_SPAN_MA: f32 = 16.0;

/// Where a channel's samples come from.  Selects alarm lamp priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// 4–20 mA loop; each active alarm lamp blinks independently.
    Analog,
    /// Modbus/TCP detector; AL2 takes the lamp pattern exclusively.
    Modbus,
}

/// Alarm, power and fault flags as reported to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub al1: bool,
    pub al2: bool,
    pub pwr: bool,
    pub fault: bool,
}

/// What a channel shows, and which parts of it blink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayState {
    pub text: SegmentText,
    pub flags: Flags,
    /// Lamps lit in both phases.
    pub steady: Lamps,
    /// Lamps lit only in the "on" phase.
    pub blinking: Lamps,
    /// Whole display hidden in the "off" phase.
    pub blink_display: bool,
}

impl DisplayState {
    /// Unpowered / disconnected: everything dark.
    pub const DARK: DisplayState = DisplayState {
        text: SegmentText::BLANK,
        flags: Flags {
            al1: false,
            al2: false,
            pwr: false,
            fault: false,
        },
        steady: Lamps::empty(),
        blinking: Lamps::empty(),
        blink_display: false,
    };

    pub fn is_blinking(&self) -> bool {
        self.blink_display || self.blinking != Lamps::empty()
    }

    /// Lamps lit in the given phase.
    pub fn lamps(&self, phase_on: bool) -> Lamps {
        if phase_on {
            Lamps::from_bits(self.steady.bits() | self.blinking.bits())
        } else {
            self.steady
        }
    }

    /// Digit positions hidden in the given phase.
    pub fn blink_mask(&self, phase_on: bool) -> u8 {
        if self.blink_display && !phase_on { ALL_DIGITS } else { 0 }
    }

    pub fn alarm_event(&self, ch: ChannelIndex, phase_on: bool) -> PanelEvent {
        PanelEvent::AlarmChanged {
            ch,
            al1: self.flags.al1,
            al2: self.flags.al2,
            pwr: self.flags.pwr,
            fault: self.flags.fault,
            lamps: self.lamps(phase_on),
        }
    }

    pub fn value_event(&self, ch: ChannelIndex, phase_on: bool) -> PanelEvent {
        PanelEvent::ValueChanged {
            ch,
            text: self.text,
            blink_mask: self.blink_mask(phase_on),
        }
    }
}

/// Result of classifying one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    pub state: DisplayState,
    /// Engineering value, `0..=full_scale`.
    pub value: u16,
    pub alarm_changed: bool,
    pub value_changed: bool,
    pub bar: Option<u8>,
}

impl Update {
    /// Events for this update in emit order: AlarmChanged, ValueChanged,
    /// BarLevel.
    pub fn events(&self, ch: ChannelIndex, phase_on: bool) -> heapless::Vec<PanelEvent, 3> {
        let mut out = heapless::Vec::new();
        if self.alarm_changed {
            let _ = out.push(self.state.alarm_event(ch, phase_on));
        }
        if self.value_changed {
            let _ = out.push(self.state.value_event(ch, phase_on));
        }
        if let Some(percent) = self.bar {
            let _ = out.push(PanelEvent::BarLevel { ch, percent });
        }
        out
    }
}

/// Per-channel classifier state.  Owned by the channel's producer task.
#[derive(Debug, Clone)]
pub struct ChannelState {
    index: ChannelIndex,
    kind: GasKind,
    profile: GasProfile,
    source: SourceKind,
    filter: SlidingMean,
    emitted: Option<DisplayState>,
    last_bar: Option<u8>,
    value: u16,
}

impl ChannelState {
    pub fn new(index: ChannelIndex, kind: GasKind, source: SourceKind) -> Self {
        Self {
            index,
            kind,
            profile: gas::profile(kind),
            source,
            filter: SlidingMean::new(),
            emitted: None,
            last_bar: None,
            value: 0,
        }
    }

    pub fn index(&self) -> ChannelIndex {
        self.index
    }

    pub fn kind(&self) -> GasKind {
        self.kind
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    /// Last engineering value computed.
    pub fn value(&self) -> u16 {
        self.value
    }

    /// Last state handed to the UI.
    pub fn current(&self) -> Option<&DisplayState> {
        self.emitted.as_ref()
    }

    /// Classify one loop-current reading (mA).
    pub fn apply_analog(&mut self, milliamps: f32) -> Update {
        let avg = self.filter.push(milliamps);
        let value = scale_loop_current(avg, self.profile.full_scale);
        let pwr = avg >= PWR_THRESHOLD_MA;
        let flags = Flags {
            al1: pwr && value >= self.profile.al1,
            al2: pwr && value >= self.profile.al2,
            pwr,
            fault: false,
        };
        let text = if pwr {
            SegmentText::from_value(value)
        } else {
            SegmentText::BLANK
        };
        let state = self.lamp_pattern(text, flags);
        self.commit(value, state, None)
    }

    /// Classify one Modbus register frame.  The link is up, so PWR is on.
    pub fn apply_modbus(&mut self, frame: &RegisterFrame) -> Update {
        let value = frame.reading.min(self.profile.full_scale);
        let error = frame.error_code();
        let flags = Flags {
            al1: frame.al1(),
            al2: frame.al2(),
            pwr: true,
            fault: error.is_some(),
        };
        let text = error.unwrap_or_else(|| SegmentText::from_value(value));
        let state = self.lamp_pattern(text, flags);
        self.commit(value, state, Some(frame.bar_percent()))
    }

    /// The Modbus link went down: dark display, no alarms.
    pub fn apply_link_lost(&mut self) -> Update {
        self.last_bar = None;
        self.commit(0, DisplayState::DARK, None)
    }

    fn lamp_pattern(&self, text: SegmentText, flags: Flags) -> DisplayState {
        let steady = Lamps::empty().with(Lamps::PWR, flags.pwr);
        if flags.fault {
            return DisplayState {
                text,
                flags,
                steady,
                blinking: Lamps::FUT,
                blink_display: true,
            };
        }
        let blinking = match self.source {
            SourceKind::Modbus if flags.al2 => Lamps::AL2,
            SourceKind::Modbus if flags.al1 => Lamps::AL1,
            SourceKind::Modbus => Lamps::empty(),
            SourceKind::Analog => Lamps::empty()
                .with(Lamps::AL1, flags.al1)
                .with(Lamps::AL2, flags.al2),
        };
        DisplayState {
            text,
            flags,
            steady,
            blinking,
            blink_display: flags.al1 || flags.al2,
        }
    }

    fn commit(&mut self, value: u16, state: DisplayState, bar: Option<u8>) -> Update {
        let prev = self.emitted.replace(state);
        let alarm_changed = prev.is_none_or(|p| p.flags != state.flags);
        let value_changed =
            prev.is_none_or(|p| p.text != state.text || p.blink_display != state.blink_display);
        let bar = bar.filter(|b| self.last_bar != Some(*b));
        if bar.is_some() {
            self.last_bar = bar;
        }
        self.value = value;
        Update {
            state,
            value,
            alarm_changed,
            value_changed,
            bar,
        }
    }
}

/// `clamp(round((mA − 4) / 16 × full_scale), 0, full_scale)`.
pub fn scale_loop_current(milliamps: f32, full_scale: u16) -> u16 {
    let fs = f32::from(full_scale);
    let v = ((milliamps - LOOP_ZERO_MA) / LOOP_SPAN_MA * fs).round();
    // NaN saturates to 0 in the cast.
    v.clamp(0.0, fs) as u16
}
