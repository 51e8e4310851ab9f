//! Supervisor lifecycle: start, reconfigure, reload and stop against the
//! simulated bus and scripted detectors.

use std::sync::Arc;
use std::time::Duration;

use gms1000::adapters::i2c::SimBus;
use gms1000::app::supervisor::{ANALOG_HISTORY_DIR, MODBUS_HISTORY_DIR, Supervisor, SupervisorTiming};
use gms1000::config::PanelConfig;
use gms1000::error::{ConfigError, Error};
use gms1000::events::PanelEvent;
use gms1000::modbus::PollerTiming;
use gms1000::sensors::{AnalogTiming, UpsTiming};

use super::mock_hw::{FakeConnector, MemConfig, RecordingSink, TestPlatform, frame};

const WAIT: Duration = Duration::from_secs(5);
const BOX0: &str = "192.168.0.101";
const BOX1: &str = "192.168.0.102";

fn timing() -> SupervisorTiming {
    SupervisorTiming {
        poller: PollerTiming {
            poll_period: Duration::from_millis(10),
            connect_attempts: 2,
            connect_retry_delay: Duration::from_millis(5),
            connect_timeout: Duration::from_millis(50),
            read_timeout: Duration::from_millis(50),
        },
        analog: AnalogTiming {
            cycle: Duration::from_millis(5),
            conversion_timeout: Duration::from_millis(20),
        },
        ups: UpsTiming {
            period: Duration::from_millis(10),
        },
        blink: Duration::from_millis(20),
        restart_backoff: Duration::from_millis(10),
    }
}

struct Rig {
    supervisor: Supervisor<TestPlatform, MemConfig>,
    sink: Arc<RecordingSink>,
    store: MemConfig,
    _dir: tempfile::TempDir,
}

fn connector() -> FakeConnector {
    let connector = FakeConnector::new();
    connector.serve(BOX0, [frame(0, 100, 0, 1)]);
    connector.serve(BOX1, [frame(0x0080, 9999, 0, 100)]);
    connector
}

fn rig(bus: SimBus, config: PanelConfig) -> Rig {
    rig_on(TestPlatform::new(bus, connector()), config)
}

fn rig_on(platform: TestPlatform, config: PanelConfig) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();
    let store = MemConfig::new();
    store.put(config.clone());
    let supervisor = Supervisor::new(
        platform,
        store.clone(),
        config,
        sink.clone(),
        dir.path().join("history"),
        timing(),
    );
    Rig {
        supervisor,
        sink,
        store,
        _dir: dir,
    }
}

fn mixed() -> PanelConfig {
    PanelConfig {
        modbus_boxes: 1,
        analog_boxes: 1,
        ..PanelConfig::default()
    }
}

fn links_up(events: &[PanelEvent], ch: u8) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PanelEvent::LinkState { ch: c, connected: true } if *c == ch))
        .count()
}

#[test]
fn start_runs_every_task_kind() {
    let bus = SimBus::new().with_adc(0x48, [12.0; 4]).with_ups(24.6, 1.0);
    let mut r = rig(bus, mixed());
    r.supervisor.start().unwrap();
    // modbus-0, analog, ups, blink
    assert_eq!(r.supervisor.running_tasks(), 4);

    assert!(r.sink.wait_for(WAIT, |e| {
        links_up(e, 0) == 1
            && e.iter().any(|e| matches!(e, PanelEvent::ValueChanged { ch: 1, .. }))
            && e.iter().any(|e| matches!(e, PanelEvent::UpsBattery { .. }))
    }));

    let root = r._dir.path().join("history");
    assert!(root.join(MODBUS_HISTORY_DIR).is_dir());
    assert!(root.join(ANALOG_HISTORY_DIR).is_dir());

    r.supervisor.stop();
    assert_eq!(r.supervisor.running_tasks(), 0);
}

#[test]
fn reconfigure_restarts_only_on_channel_change() {
    let bus = SimBus::new().with_ups(24.6, 1.0);
    let mut r = rig(
        bus,
        PanelConfig {
            modbus_boxes: 1,
            ..PanelConfig::default()
        },
    );
    r.supervisor.start().unwrap();
    assert!(r.sink.wait_for(WAIT, |e| links_up(e, 0) == 1));

    // Secret only: saved, no restart.
    let mut next = (*r.supervisor.config()).clone();
    next.admin_secret = Some("4321".into());
    r.supervisor.reconfigure(next.clone()).unwrap();
    assert_eq!(*r.store.saves.lock(), 1);
    assert_eq!(r.supervisor.config().admin_secret.as_deref(), Some("4321"));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(links_up(&r.sink.events(), 0), 1);

    // Second box: restart, both boxes come up.
    next.modbus_boxes = 2;
    r.supervisor.reconfigure(next).unwrap();
    assert_eq!(r.supervisor.running_tasks(), 4);
    assert!(r.sink.wait_for(WAIT, |e| links_up(e, 0) == 2 && links_up(e, 1) == 1));
    assert!(r.sink.wait_for(WAIT, |e| {
        e.iter().any(|e| matches!(e, PanelEvent::AlarmChanged { ch: 1, al2: true, .. }))
    }));
}

#[test]
fn invalid_reconfigure_is_rejected_and_not_saved() {
    let mut r = rig(SimBus::new(), mixed());
    let bad = PanelConfig {
        modbus_boxes: 10,
        analog_boxes: 5,
        ..PanelConfig::default()
    };
    assert!(matches!(
        r.supervisor.reconfigure(bad),
        Err(Error::Config(ConfigError::Validation(_)))
    ));
    assert_eq!(*r.store.saves.lock(), 0);
    assert_eq!(*r.supervisor.config(), mixed());
}

#[test]
fn reload_applies_changed_file() {
    let mut r = rig(SimBus::new().with_ups(24.6, 1.0), mixed());
    r.supervisor.start().unwrap();

    r.supervisor.reload().unwrap();
    assert_eq!(*r.supervisor.config(), mixed());

    r.store.put(PanelConfig {
        modbus_boxes: 2,
        analog_boxes: 0,
        ..PanelConfig::default()
    });
    r.supervisor.reload().unwrap();
    assert_eq!(r.supervisor.config().modbus_boxes, 2);
    // modbus-0, modbus-1, ups, blink
    assert_eq!(r.supervisor.running_tasks(), 4);
}

#[test]
fn missing_ups_is_reported_once_per_session() {
    let mut r = rig(SimBus::new(), mixed());
    r.supervisor.start().unwrap();
    assert!(r.sink.wait_for(WAIT, |e| e.contains(&PanelEvent::UpsUnavailable)));

    let mut next = mixed();
    next.modbus_boxes = 2;
    r.supervisor.reconfigure(next).unwrap();
    // modbus-0, modbus-1, analog, blink: no UPS task after a failed probe.
    assert_eq!(r.supervisor.running_tasks(), 4);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(r.sink.count(|e| *e == PanelEvent::UpsUnavailable), 1);
    assert_eq!(r.sink.count(|e| matches!(e, PanelEvent::UpsBattery { .. })), 0);
}

#[test]
fn drop_stops_tasks() {
    let mut r = rig(SimBus::new().with_ups(24.6, 1.0), mixed());
    r.supervisor.start().unwrap();
    drop(r.supervisor);
    let settled = r.sink.events().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(r.sink.events().len(), settled);
}

#[test]
fn unopenable_bus_reports_ups_and_adc_faults() {
    let config = PanelConfig {
        modbus_boxes: 1,
        analog_boxes: 5,
        ..PanelConfig::default()
    };
    let mut r = rig_on(TestPlatform::without_bus(connector()), config.clone());
    r.supervisor.start().unwrap();

    let faulted = |e: &[PanelEvent], addr: u8| {
        e.iter().any(|e| matches!(e, PanelEvent::DeviceFault { adc_addr } if *adc_addr == addr))
    };
    assert!(r.sink.wait_for(WAIT, |e| {
        e.contains(&PanelEvent::UpsUnavailable) && faulted(e, 0x48) && faulted(e, 0x49)
    }));
    // Modbus channels are unaffected.
    assert!(r.sink.wait_for(WAIT, |e| links_up(e, 0) == 1));

    // The UPS stays latched across a restart.
    let mut next = config;
    next.modbus_boxes = 2;
    r.supervisor.reconfigure(next).unwrap();
    // modbus-0, modbus-1, analog, blink
    assert_eq!(r.supervisor.running_tasks(), 4);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(r.sink.count(|e| *e == PanelEvent::UpsUnavailable), 1);
}
