//! Application core.
//!
//! All interaction with hardware and the network happens through the **port
//! traits** defined in [`ports`]; the [`supervisor`] owns the task set built
//! on top of them and applies configuration changes.

pub mod ports;
pub mod supervisor;
