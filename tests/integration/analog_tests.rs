//! Analog sampler on the simulated I²C bus: scaling, absent converters and
//! the consecutive-failure fault report.

use std::sync::Arc;
use std::time::Duration;

use gms1000::adapters::i2c::SimBus;
use gms1000::blink::BlinkBoard;
use gms1000::channel::pipeline::ChannelPipeline;
use gms1000::channel::{ChannelState, SourceKind};
use gms1000::events::PanelEvent;
use gms1000::gas::GasKind;
use gms1000::history::HistoryLog;
use gms1000::sensors::analog::FAULT_THRESHOLD;
use gms1000::sensors::{AnalogSampler, AnalogTiming};
use gms1000::task::StopToken;

use super::mock_hw::RecordingSink;

fn timing() -> AnalogTiming {
    AnalogTiming {
        cycle: Duration::from_millis(1),
        conversion_timeout: Duration::from_millis(20),
    }
}

fn sampler(
    bus: SimBus,
    wiring: &[(u8, u8, u8, GasKind)],
) -> (AnalogSampler<SimBus>, Arc<RecordingSink>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let log = HistoryLog::open(dir.path()).unwrap();
    let board = Arc::new(BlinkBoard::new());
    let sink = RecordingSink::new();
    let channels = wiring.iter().map(|&(ch, addr, input, kind)| {
        let p = ChannelPipeline::new(
            ChannelState::new(ch, kind, SourceKind::Analog),
            log.clone(),
            Arc::clone(&board),
            sink.clone(),
        );
        (addr, input, p)
    });
    let s = AnalogSampler::new(bus, channels, timing());
    (s, sink, dir)
}

fn last_value(events: &[PanelEvent], ch: u8) -> Option<String> {
    events.iter().rev().find_map(|e| match e {
        PanelEvent::ValueChanged { ch: c, text, .. } if *c == ch => Some(text.as_str().trim().to_owned()),
        _ => None,
    })
}

#[test]
fn loop_currents_scale_per_gas() {
    let bus = SimBus::new().with_adc(0x48, [4.0, 12.0, 20.0, 1.0]);
    let (mut s, sink, _dir) = sampler(
        bus,
        &[
            (0, 0x48, 0, GasKind::Org),
            (1, 0x48, 1, GasKind::ArfT),
            (2, 0x48, 2, GasKind::Hmds),
            (3, 0x48, 3, GasKind::Org),
        ],
    );
    let stop = StopToken::new();
    for _ in 0..10 {
        s.cycle(&stop);
    }
    let events = sink.events();

    assert_eq!(last_value(&events, 0).as_deref(), Some("0"));
    let mid: i32 = last_value(&events, 1).unwrap().parse().unwrap();
    assert!((mid - 2500).abs() <= 2, "{mid}");
    assert_eq!(last_value(&events, 2).as_deref(), Some("3000"));
    // 1 mA: unpowered, blank display.
    assert_eq!(last_value(&events, 3).as_deref(), Some(""));
}

#[test]
fn absent_converter_channels_never_emit() {
    let bus = SimBus::new().with_adc(0x48, [4.0; 4]);
    let (mut s, sink, _dir) = sampler(
        bus,
        &[(0, 0x48, 0, GasKind::Org), (1, 0x49, 0, GasKind::Org)],
    );
    assert_eq!(s.present(), vec![0x48]);
    s.cycle(&StopToken::new());
    assert!(sink.events().iter().all(|e| e.channel() == Some(0)));
}

#[test]
fn device_fault_after_consecutive_failures() {
    let bus = SimBus::new().with_adc(0x4A, [8.0; 4]);
    let (mut s, sink, _dir) = sampler(bus.clone(), &[(4, 0x4A, 0, GasKind::Org)]);
    let stop = StopToken::new();
    let faults = || sink.count(|e| matches!(e, PanelEvent::DeviceFault { adc_addr: 0x4A }));

    bus.detach(0x4A);
    for _ in 0..FAULT_THRESHOLD - 1 {
        s.cycle(&stop);
    }
    assert_eq!(faults(), 0);
    s.cycle(&stop);
    assert_eq!(faults(), 1);
    for _ in 0..10 {
        s.cycle(&stop);
    }
    assert_eq!(faults(), 1, "reported once per outage");

    // Recovery re-arms the report.
    let _ = bus.clone().with_adc(0x4A, [8.0; 4]);
    s.cycle(&stop);
    bus.detach(0x4A);
    for _ in 0..FAULT_THRESHOLD {
        s.cycle(&stop);
    }
    assert_eq!(faults(), 2);
}

#[test]
fn failing_input_skips_whole_converter() {
    let bus = SimBus::new().with_adc(0x48, [12.0; 4]);
    let wiring: Vec<_> = (0..4u8).map(|i| (i, 0x48, i, GasKind::Org)).collect();
    let (mut s, sink, _dir) = sampler(bus.clone(), &wiring);
    let stop = StopToken::new();
    s.cycle(&stop);
    let before = last_value(&sink.events(), 0);

    // Input 0 converts fine but input 2 fails: nothing on this ADC is fed.
    bus.set_loop_current(0x48, 0, 20.0);
    bus.break_input(0x48, Some(2));
    sink.clear();
    s.cycle(&stop);
    assert!(sink.events().is_empty(), "{:?}", sink.events());

    bus.break_input(0x48, None);
    s.cycle(&stop);
    assert_ne!(last_value(&sink.events(), 0), before);
}

#[test]
fn run_returns_on_stop() {
    let bus = SimBus::new().with_adc(0x48, [4.0; 4]);
    let (mut s, _sink, _dir) = sampler(bus, &[(0, 0x48, 0, GasKind::Org)]);
    let stop = StopToken::new();
    let token = stop.clone();
    let handle = std::thread::spawn(move || s.run(&token));
    std::thread::sleep(Duration::from_millis(20));
    stop.stop();
    handle.join().unwrap();
}
