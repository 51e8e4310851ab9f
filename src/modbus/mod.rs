//! Modbus/TCP detector boxes: register map and per-device poller.

pub mod poller;
pub mod registers;

pub use poller::{LinkPhase, ModbusPoller, PollerTiming};
pub use registers::RegisterFrame;
