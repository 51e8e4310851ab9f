//! Sample → classifier → board/sink → history, for one channel.

use std::sync::Arc;

use crate::app::ports::EventSink;
use crate::blink::BlinkBoard;
use crate::events::ChannelIndex;
use crate::history::{ChannelHistory, HistoryLog};
use crate::modbus::registers::RegisterFrame;

use super::{ChannelState, Update};

/// Everything a producer task owns for one of its channels.
pub struct ChannelPipeline {
    state: ChannelState,
    history: ChannelHistory,
    board: Arc<BlinkBoard>,
    sink: Arc<dyn EventSink>,
}

impl ChannelPipeline {
    pub fn new(
        state: ChannelState,
        log: HistoryLog,
        board: Arc<BlinkBoard>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let history = ChannelHistory::new(log, state.index());
        Self {
            state,
            history,
            board,
            sink,
        }
    }

    pub fn index(&self) -> ChannelIndex {
        self.state.index()
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn feed_analog(&mut self, milliamps: f32) -> Update {
        let update = self.state.apply_analog(milliamps);
        self.deliver(update)
    }

    pub fn feed_modbus(&mut self, frame: &RegisterFrame) -> Update {
        let update = self.state.apply_modbus(frame);
        self.deliver(update)
    }

    pub fn link_lost(&mut self) -> Update {
        let update = self.state.apply_link_lost();
        self.deliver(update)
    }

    pub fn sink(&self) -> &dyn EventSink {
        self.sink.as_ref()
    }

    fn deliver(&mut self, update: Update) -> Update {
        self.board.publish(self.state.index(), &update, self.sink.as_ref());
        self.history.record(&update.state.text);
        update
    }
}
