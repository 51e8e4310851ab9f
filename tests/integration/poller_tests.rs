//! Modbus poller against a scripted connector: connect back-off, link
//! events, link loss and recovery.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gms1000::blink::BlinkBoard;
use gms1000::channel::pipeline::ChannelPipeline;
use gms1000::channel::{ChannelState, SourceKind};
use gms1000::events::PanelEvent;
use gms1000::gas::GasKind;
use gms1000::history::HistoryLog;
use gms1000::modbus::{ModbusPoller, PollerTiming};
use gms1000::task::StopToken;

use super::mock_hw::{FakeConnector, RecordingSink, frame};

const HOST: &str = "192.168.0.101";
const WAIT: Duration = Duration::from_secs(5);

fn fast_timing() -> PollerTiming {
    PollerTiming {
        poll_period: Duration::from_millis(10),
        connect_attempts: 3,
        connect_retry_delay: Duration::from_millis(5),
        connect_timeout: Duration::from_millis(50),
        read_timeout: Duration::from_millis(50),
    }
}

struct Harness {
    sink: Arc<RecordingSink>,
    stop: StopToken,
    handle: thread::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn start(connector: FakeConnector) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::new();
        let pipeline = ChannelPipeline::new(
            ChannelState::new(0, GasKind::Org, SourceKind::Modbus),
            HistoryLog::open(dir.path()).unwrap(),
            Arc::new(BlinkBoard::new()),
            sink.clone(),
        );
        let mut poller = ModbusPoller::new(HOST, 502, connector, pipeline, fast_timing());
        let stop = StopToken::new();
        let token = stop.clone();
        let handle = thread::spawn(move || poller.run(&token));
        Self {
            sink,
            stop,
            handle,
            _dir: dir,
        }
    }

    fn finish(self) -> Arc<RecordingSink> {
        self.stop.stop();
        self.handle.join().unwrap();
        self.sink
    }
}

fn has_value(events: &[PanelEvent], want: &str) -> bool {
    events.iter().any(|e| matches!(
        e,
        PanelEvent::ValueChanged { ch: 0, text, .. } if text.as_str() == want
    ))
}

#[test]
fn connects_after_refusals_without_reporting_down() {
    let connector = FakeConnector::new();
    connector.refuse_connects(HOST, 2);
    connector.serve(HOST, [frame(0, 321, 0, 10)]);

    let h = Harness::start(connector.clone());
    assert!(h.sink.wait_for(WAIT, |e| has_value(e, " 321")));
    let sink = h.finish();

    assert_eq!(connector.connects(HOST), 3);
    assert_eq!(sink.link_states(0), vec![true]);
}

#[test]
fn exhausted_attempts_report_down_once() {
    let connector = FakeConnector::new();
    connector.set_offline(HOST, true);

    let h = Harness::start(connector.clone());
    // Two full rounds of attempts.
    assert!(h.sink.wait_for(WAIT, |_| connector.connects(HOST) >= 6));
    let sink = h.finish();

    assert_eq!(sink.link_states(0), vec![false]);
    assert_eq!(sink.count(|e| matches!(e, PanelEvent::ValueChanged { .. })), 0);
}

#[test]
fn link_down_only_after_every_retry_delay() {
    let connector = FakeConnector::new();
    connector.set_offline(HOST, true);

    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let pipeline = ChannelPipeline::new(
        ChannelState::new(0, GasKind::Org, SourceKind::Modbus),
        HistoryLog::open(dir.path()).unwrap(),
        Arc::new(BlinkBoard::new()),
        sink.clone(),
    );
    let timing = PollerTiming {
        connect_attempts: 3,
        connect_retry_delay: Duration::from_millis(20),
        ..fast_timing()
    };
    let mut poller = ModbusPoller::new(HOST, 502, connector.clone(), pipeline, timing);
    let stop = StopToken::new();
    let token = stop.clone();
    let started = Instant::now();
    let handle = thread::spawn(move || poller.run(&token));

    assert!(sink.wait_for(WAIT, |e| !e.is_empty()));
    let elapsed = started.elapsed();
    stop.stop();
    handle.join().unwrap();

    assert_eq!(sink.link_states(0), vec![false]);
    assert!(connector.connects(HOST) >= 3);
    assert!(elapsed >= Duration::from_millis(60), "{elapsed:?}");
}

#[test]
fn missed_poll_deadline_does_not_catch_up() {
    let connector = FakeConnector::new();
    connector.serve(HOST, [frame(0, 1, 0, 1)]);
    let stall = Duration::from_millis(100);
    connector.stall_next_read(HOST, stall);

    let started = Instant::now();
    let h = Harness::start(connector.clone());
    thread::sleep(Duration::from_millis(200));
    h.finish();
    let elapsed = started.elapsed();

    // 10 ms period: catching up after the stall would add about ten
    // back-to-back polls.
    let period_ms = fast_timing().poll_period.as_millis();
    let bound = (elapsed - stall).as_millis() / period_ms + 3;
    let polls = u128::from(connector.frames_served(HOST));
    assert!(polls >= 1);
    assert!(polls <= bound, "{polls} polls in {elapsed:?}, bound {bound}");
}

#[test]
fn read_failure_goes_dark_then_recovers() {
    let connector = FakeConnector::new();
    connector.serve(HOST, [frame(0x0040, 9600, 0, 60)]);
    connector.fail_after(HOST, 3);

    let h = Harness::start(connector.clone());
    let went_dark = |events: &[PanelEvent]| {
        events
            .iter()
            .position(|e| matches!(e, PanelEvent::LinkState { connected: false, .. }))
            .is_some_and(|down| {
                // Link loss is followed by the dark display.
                events[down..].iter().any(|e| matches!(
                    e,
                    PanelEvent::ValueChanged { text, .. } if text.is_blank()
                ))
            })
    };
    assert!(h.sink.wait_for(WAIT, went_dark));

    connector.set_offline(HOST, false);
    assert!(h.sink.wait_for(WAIT, |e| {
        e.iter().filter(|e| matches!(e, PanelEvent::LinkState { .. })).count() >= 3
    }));
    let sink = h.finish();
    assert_eq!(sink.link_states(0)[..3], [true, false, true]);
    assert!(connector.frames_served(HOST) >= 3);
}

#[test]
fn stop_interrupts_retry_sleep() {
    let connector = FakeConnector::new();
    connector.set_offline(HOST, true);

    let dir = tempfile::tempdir().unwrap();
    let pipeline = ChannelPipeline::new(
        ChannelState::new(0, GasKind::Org, SourceKind::Modbus),
        HistoryLog::open(dir.path()).unwrap(),
        Arc::new(BlinkBoard::new()),
        RecordingSink::new(),
    );
    let timing = PollerTiming {
        connect_retry_delay: Duration::from_secs(30),
        ..fast_timing()
    };
    let mut poller = ModbusPoller::new(HOST, 502, connector, pipeline, timing);
    let stop = StopToken::new();
    let token = stop.clone();
    let started = std::time::Instant::now();
    let handle = thread::spawn(move || poller.run(&token));
    thread::sleep(Duration::from_millis(50));
    stop.stop();
    handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
}
