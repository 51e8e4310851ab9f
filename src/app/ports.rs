//! Port traits: the hexagonal boundary between the acquisition core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ pollers / samplers / supervisor
//! ```
//!
//! Driven adapters (Modbus/TCP client, I²C bus, config file, UI renderer)
//! implement these traits.  The core consumes them through generics or
//! trait objects, so nothing under `channel/`, `modbus/` or `sensors/`
//! touches a socket or a device node directly.
//!
//! ## Notes
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - **RegisterLink** calls must return within the read timeout they were
//!   connected with; a timeout is a reconnect trigger.

use std::time::Duration;

use embedded_hal::i2c::I2c;

use crate::config::PanelConfig;
use crate::error::{BusError, ConfigError, LinkError};
use crate::events::PanelEvent;

// ───────────────────────────────────────────────────────────────
// Event sink port (core → UI)
// ───────────────────────────────────────────────────────────────

/// The core emits [`PanelEvent`]s through this port.  The production sink
/// is the [`EventBus`](crate::events::EventBus); tests record events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PanelEvent);
}

// ───────────────────────────────────────────────────────────────
// Modbus link ports (driven adapter: detector box ↔ core)
// ───────────────────────────────────────────────────────────────

/// An open Modbus/TCP session to one detector (unit id 1).
pub trait RegisterLink: Send {
    /// Function code 3.  `addr` is the zero-based wire offset.
    fn read_holding(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, LinkError>;
}

/// Opens [`RegisterLink`]s.  One connector per poller thread.
pub trait LinkConnector: Send {
    type Link: RegisterLink;

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self::Link, LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: core ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the panel configuration.
///
/// Implementations MUST call [`PanelConfig::validate`] before persisting
/// and after loading; invalid values are rejected, not clamped.
pub trait ConfigPort: Send + Sync {
    /// Returns [`PanelConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<PanelConfig, ConfigError>;

    /// Validate and persist atomically.
    fn save(&self, config: &PanelConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Platform (hardware factory handed to the supervisor)
// ───────────────────────────────────────────────────────────────

/// Everything the supervisor needs to build its tasks.  Each task opens
/// its own bus handle and connector, so no handle is shared across threads.
pub trait Platform: Send + Sync + 'static {
    type Bus: I2c + Send + 'static;
    type Connector: LinkConnector + 'static;

    /// Open a handle on the I²C controller.
    fn open_bus(&self) -> Result<Self::Bus, BusError>;

    /// Fresh Modbus connector for one poller.
    fn connector(&self) -> Self::Connector;
}
