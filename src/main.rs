//! GMS-1000 panel firmware: entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  TcpConnector      SimBus / I2cdev    ConfigStore   LogRenderer│
//! │  (Modbus/TCP)      (ADS1115, INA219)  (Fernet file) (UI thread)│
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  Supervisor: pollers · analog sampler · UPS · blink    │    │
//! │  │  ChannelPipeline: filter · classify · history          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  EventBus ──▶ UI thread          signals ──▶ main thread       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SIGINT / SIGTERM stop every task and exit 0.  SIGHUP re-reads the config
//! file and restarts acquisition if the channel set changed.
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, error, info, warn};
use tokio::signal::unix::{SignalKind, signal};

use gms1000::adapters::config_store::ConfigStore;
use gms1000::adapters::log_sink::LogRenderer;
use gms1000::adapters::time::MonotonicClock;
use gms1000::app::ports::{ConfigPort, EventSink, Platform};
use gms1000::app::supervisor::{Supervisor, SupervisorTiming};
use gms1000::config::PanelConfig;
use gms1000::diagnostics::{self, RuntimeMetrics};
use gms1000::error::ConfigError;
use gms1000::events::EventBus;
use gms1000::task::spawn_named;

const STATUS_PERIOD: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(author, version, about = "GMS-1000 gas monitoring panel")]
struct Args {
    /// Directory holding gms.cfg, gms.key and history/.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// I²C bus device node.
    #[arg(long, default_value = "/dev/i2c-1")]
    i2c_bus: PathBuf,

    /// Debug-level logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();
    diagnostics::install_panic_handler();

    info!("╔══════════════════════════════════════╗");
    info!("║  GMS-1000 panel v{:<20}║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 1. Configuration ──────────────────────────────────────
    let store = ConfigStore::open(&args.data_dir)
        .with_context(|| format!("cannot open config store in {}", args.data_dir.display()))?;
    let config = match store.load() {
        Ok(config) => config,
        Err(ConfigError::Corrupt(why)) => {
            error!("{} is corrupt ({why}); refusing to start", store.config_path().display());
            bail!("config corrupt: {why}");
        }
        Err(e) => return Err(e).context("cannot load config"),
    };
    info!(
        "Config: {} Modbus + {} analog channel(s)",
        config.modbus_boxes, config.analog_boxes
    );

    // ── 2. Platform ───────────────────────────────────────────
    #[cfg(feature = "rpi")]
    let platform = {
        info!("I2C: {}", args.i2c_bus.display());
        gms1000::adapters::i2c::LinuxPlatform::new(&args.i2c_bus)
    };
    #[cfg(not(feature = "rpi"))]
    let platform = {
        info!(
            "I2C: simulated bus ({} needs the `rpi` feature)",
            args.i2c_bus.display()
        );
        gms1000::adapters::i2c::SimPlatform::new(gms1000::adapters::i2c::SimBus::demo())
    };

    run(platform, store, config, &args)
}

fn run<P: Platform, S: ConfigPort>(platform: P, store: S, config: PanelConfig, args: &Args) -> Result<()> {
    let clock = MonotonicClock::new();
    let bus = Arc::new(EventBus::new());
    let sink: Arc<dyn EventSink> = bus.clone();

    // ── 3. UI thread ──────────────────────────────────────────
    let ui = {
        let bus = Arc::clone(&bus);
        spawn_named("ui", move || LogRenderer::new(bus).run()).context("cannot spawn UI thread")?
    };

    // ── 4. Acquisition tasks ──────────────────────────────────
    let mut supervisor = Supervisor::new(
        platform,
        store,
        config,
        sink,
        args.data_dir.join("history"),
        SupervisorTiming::default(),
    );
    supervisor.start().context("cannot start acquisition tasks")?;
    info!("System ready. Waiting for signals.");

    // ── 5. Signal loop ────────────────────────────────────────
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot build signal runtime")?;
    runtime.block_on(wait_for_signals(&mut supervisor, &bus, &clock))?;

    // ── 6. Shutdown ───────────────────────────────────────────
    info!("Final: {}", metrics(&supervisor, &bus, &clock));
    supervisor.shutdown();
    bus.close();
    if ui.join().is_err() {
        warn!("UI thread ended abnormally");
    }
    info!("Bye.");
    Ok(())
}

async fn wait_for_signals<P: Platform, S: ConfigPort>(
    supervisor: &mut Supervisor<P, S>,
    bus: &EventBus,
    clock: &MonotonicClock,
) -> Result<()> {
    let mut term = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    let mut hup = signal(SignalKind::hangup()).context("cannot install SIGHUP handler")?;
    let mut status = tokio::time::interval(STATUS_PERIOD);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT: shutting down");
                break;
            }
            _ = term.recv() => {
                info!("SIGTERM: shutting down");
                break;
            }
            _ = hup.recv() => {
                info!("SIGHUP: reloading config");
                if let Err(e) = supervisor.reload() {
                    error!("Config reload failed ({e}); keeping current config");
                }
            }
            _ = status.tick() => {
                debug!("Status: {}", metrics(supervisor, bus, clock));
            }
        }
    }
    Ok(())
}

fn metrics<P: Platform, S: ConfigPort>(
    supervisor: &Supervisor<P, S>,
    bus: &EventBus,
    clock: &MonotonicClock,
) -> RuntimeMetrics {
    RuntimeMetrics {
        uptime_secs: clock.uptime_secs(),
        events_dropped: bus.dropped_count(),
        panics: diagnostics::panic_count(),
        running_tasks: supervisor.running_tasks(),
    }
}
