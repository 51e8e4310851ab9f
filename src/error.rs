//! Unified error types for the GMS-1000 panel firmware.
//!
//! One enum per subsystem, each convertible into the top-level [`Error`] so
//! the supervisor and the binary edge handle failures uniformly.  Nothing in
//! here ever reaches the UI: producers translate every variant into an event
//! or a log line.

use core::fmt;
use std::io;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// Modbus/TCP link failure.
    Link(LinkError),
    /// I²C bus failure on one device.
    Bus(BusError),
    /// Panel configuration could not be loaded or saved.
    Config(ConfigError),
    /// History log write failed.
    History(HistoryError),
    /// The UPS monitor chip is not fitted or did not answer.
    UpsUnavailable,
    /// A worker thread could not be spawned.
    Task(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::History(e) => write!(f, "history: {e}"),
            Self::UpsUnavailable => write!(f, "UPS unavailable"),
            Self::Task(e) => write!(f, "task spawn failed: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Modbus link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// TCP connect failed or the endpoint could not be resolved.
    Connect(String),
    /// A register read failed at the transport level.
    Read(String),
    /// The device answered with a Modbus exception code.
    Exception(String),
    /// Connect or read exceeded its deadline.
    Timeout,
    /// The device returned fewer registers than requested.
    ShortResponse { expected: u16, got: usize },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::Read(msg) => write!(f, "read failed: {msg}"),
            Self::Exception(code) => write!(f, "device exception: {code}"),
            Self::Timeout => write!(f, "timed out"),
            Self::ShortResponse { expected, got } => {
                write!(f, "short response: expected {expected} registers, got {got}")
            }
        }
    }
}

impl std::error::Error for LinkError {}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// I²C bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The transfer itself failed (NACK, arbitration loss, ...).
    Transfer(embedded_hal::i2c::ErrorKind),
    /// An ADC conversion did not complete inside the read deadline.
    ConversionTimeout,
    /// The bus device node could not be opened.
    Open,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transfer(kind) => write!(f, "I2C transfer failed: {kind}"),
            Self::ConversionTimeout => write!(f, "conversion timed out"),
            Self::Open => write!(f, "I2C bus could not be opened"),
        }
    }
}

impl std::error::Error for BusError {}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// Ciphertext failed authentication or the plaintext is not a config.
    Corrupt(&'static str),
    /// Reading or writing the config / key file failed.
    Io(io::Error),
    /// A field failed range validation.
    Validation(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt(why) => write!(f, "config corrupt: {why}"),
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Validation(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// History errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum HistoryError {
    Io(io::Error),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "history I/O error: {e}"),
        }
    }
}

impl From<io::Error> for HistoryError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::error::Error for HistoryError {}

impl From<HistoryError> for Error {
    fn from(e: HistoryError) -> Self {
        Self::History(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
