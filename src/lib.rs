//! GMS-1000 gas-monitoring panel firmware library.
//!
//! Exposes the acquisition, classification and persistence modules for the
//! binary and for integration testing.  Hardware access goes through the
//! port traits in [`app::ports`]; the host build runs against a simulated
//! I²C bus, the `rpi` feature against `/dev/i2c-*`.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod blink;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod gas;
pub mod history;
pub mod modbus;
pub mod sensors;
pub mod task;

pub use error::{Error, Result};
