//! Fuzz target: config token decryption
//!
//! Decrypts arbitrary strings with a fixed key and verifies:
//! - No panics on malformed base64, short tokens or bad padding
//! - Anything that does authenticate was produced by `encrypt`
//!
//! cargo fuzz run fuzz_config_token

#![no_main]

use gms1000::adapters::fernet::FernetKey;
use gms1000::config::PanelConfig;
use libfuzzer_sys::fuzz_target;

const KEY: FernetKey = FernetKey::from_bytes([0x5A; 32]);

fuzz_target!(|data: &[u8]| {
    let token = String::from_utf8_lossy(data);
    if let Ok(plain) = KEY.decrypt(&token) {
        // Only reachable with a forged MAC; the plaintext must still parse
        // or be rejected without panicking.
        let _ = serde_json::from_slice::<PanelConfig>(&plain);
    }

    // Round-trip: a fresh token for the input always decrypts to it.
    let sealed = KEY.encrypt(data);
    assert_eq!(KEY.decrypt(&sealed).ok().as_deref(), Some(data));
});
