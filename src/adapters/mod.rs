//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements          | Connects to                  |
//! |----------------|---------------------|------------------------------|
//! | `config_store` | ConfigPort          | Fernet-encrypted `gms.cfg`   |
//! | `fernet`       | n/a                 | AES-128-CBC + HMAC-SHA256    |
//! | `i2c`          | Platform            | `/dev/i2c-*` or simulated bus|
//! | `log_sink`     | UI (EventBus drain) | Serial / journal log output  |
//! | `modbus_tcp`   | LinkConnector       | Modbus/TCP detector boxes    |
//! |                | RegisterLink        |                              |
//! | `time`         | n/a                 | Monotonic + wall clock       |

pub mod config_store;
pub mod fernet;
pub mod i2c;
pub mod log_sink;
pub mod modbus_tcp;
pub mod time;
