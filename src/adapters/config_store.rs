//! Encrypted config file adapter.
//!
//! Implements [`ConfigPort`] over two files in the data directory:
//!
//! - `gms.key`: the 32-byte Fernet key, URL-safe base64.  Generated on first
//!   use; file permissions are its only protection.
//! - `gms.cfg`: a Fernet token whose plaintext is the JSON panel config.
//!
//! # Guarantees
//!
//! - A missing config file loads as [`PanelConfig::default()`].
//! - A token that fails authentication, or decrypts to something that is
//!   not a panel config, is [`ConfigError::Corrupt`]; nothing is rewritten.
//! - Saves validate first and replace the file atomically (tempfile in the
//!   same directory, then rename).

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::NamedTempFile;

use crate::app::ports::ConfigPort;
use crate::config::PanelConfig;
use crate::error::ConfigError;

use super::fernet::FernetKey;

pub const CONFIG_FILE: &str = "gms.cfg";
pub const KEY_FILE: &str = "gms.key";

pub struct ConfigStore {
    dir: PathBuf,
    key: FernetKey,
}

impl ConfigStore {
    /// Open the store in `dir`, creating the directory and key as needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let key = load_or_create_key(&dir.join(KEY_FILE))?;
        Ok(Self { dir, key })
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }
}

impl ConfigPort for ConfigStore {
    fn load(&self) -> Result<PanelConfig, ConfigError> {
        let token = match fs::read_to_string(self.config_path()) {
            Ok(token) => token,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("config: no {CONFIG_FILE}, using defaults");
                return Ok(PanelConfig::default());
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(ConfigError::Corrupt("config file is not text"));
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = self
            .key
            .decrypt(&token)
            .map_err(|_| ConfigError::Corrupt("token failed authentication"))?;
        let config: PanelConfig = serde_json::from_slice(&plaintext)
            .map_err(|_| ConfigError::Corrupt("plaintext is not a panel config"))?;
        config.validate()?;
        Ok(config)
    }

    fn save(&self, config: &PanelConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let json = serde_json::to_vec(config)
            .map_err(|_| ConfigError::Validation("config not serialisable"))?;
        let token = self.key.encrypt(&json);
        write_atomic(&self.dir, &self.config_path(), token.as_bytes())?;
        info!("config: saved {}", self.config_path().display());
        Ok(())
    }
}

fn load_or_create_key(path: &Path) -> Result<FernetKey, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => FernetKey::decode(&text).map_err(|_| ConfigError::Corrupt("key file is malformed")),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("config: no key at {}, generating one", path.display());
            let key = FernetKey::generate();
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            write_atomic(dir, path, key.encode().as_bytes())?;
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}

/// Write via a same-directory tempfile and rename over `path`.  Tempfiles
/// are created mode 0600 on Unix.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), ConfigError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ConfigError::Io(e.error))?;
    Ok(())
}
