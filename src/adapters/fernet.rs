//! Fernet tokens: AES-128-CBC with PKCS#7 padding, authenticated with
//! HMAC-SHA256, wrapped in URL-safe base64.
//!
//! ```text
//!   0x80 | timestamp (u64 BE) | IV (16) | ciphertext (n × 16) | HMAC (32)
//! ```
//!
//! The 32-byte key splits into a signing half (`key[..16]`) and an
//! encryption half (`key[16..]`).  Tokens are interchangeable with other
//! Fernet implementations; no TTL is enforced on decrypt.

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::Rng;

pub const KEY_LEN: usize = 32;

const VERSION: u8 = 0x80;
const BLOCK: usize = 16;
const TAG_LEN: usize = 32;
const HEADER_LEN: usize = 1 + 8 + BLOCK;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FernetError {
    /// Key material is not 32 bytes of URL-safe base64.
    InvalidKey,
    /// Token is malformed, fails authentication, or has bad padding.
    InvalidToken,
}

impl fmt::Display for FernetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key"),
            Self::InvalidToken => write!(f, "invalid token"),
        }
    }
}

impl std::error::Error for FernetError {}

/// Symmetric Fernet key.
#[derive(Clone, PartialEq, Eq)]
pub struct FernetKey([u8; KEY_LEN]);

impl fmt::Debug for FernetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FernetKey(..)")
    }
}

impl FernetKey {
    /// Fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill(&mut key);
        Self(key)
    }

    pub const fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self(key)
    }

    /// Parse the URL-safe base64 text form.
    pub fn decode(text: &str) -> Result<Self, FernetError> {
        let bytes = URL_SAFE
            .decode(text.trim())
            .map_err(|_| FernetError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| FernetError::InvalidKey)?;
        Ok(Self(key))
    }

    /// URL-safe base64 text form, as stored in the key file.
    pub fn encode(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    fn signing_key(&self) -> &[u8] {
        &self.0[..BLOCK]
    }

    fn cipher(&self) -> Aes128 {
        Aes128::new(GenericArray::from_slice(&self.0[BLOCK..]))
    }

    /// Encrypt with the current time and a random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut iv = [0u8; BLOCK];
        rand::rng().fill(&mut iv);
        self.encrypt_with(plaintext, now, iv)
    }

    /// Deterministic encryption for a given timestamp and IV.
    pub fn encrypt_with(&self, plaintext: &[u8], timestamp: u64, iv: [u8; BLOCK]) -> String {
        let cipher = self.cipher();

        let pad = BLOCK - plaintext.len() % BLOCK;
        let mut padded = plaintext.to_vec();
        padded.resize(plaintext.len() + pad, pad as u8);

        let mut token = Vec::with_capacity(HEADER_LEN + padded.len() + TAG_LEN);
        token.push(VERSION);
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&iv);

        let mut prev = iv;
        for chunk in padded.chunks(BLOCK) {
            let mut block = [0u8; BLOCK];
            for (b, (p, c)) in block.iter_mut().zip(prev.iter().zip(chunk)) {
                *b = p ^ c;
            }
            let mut block_array = block.into();
            cipher.encrypt_block(&mut block_array);
            prev = block_array.into();
            token.extend_from_slice(&prev);
        }

        let tag = hmac_sha256::HMAC::mac(&token, self.signing_key());
        token.extend_from_slice(&tag);
        URL_SAFE.encode(token)
    }

    /// Verify and decrypt a token.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, FernetError> {
        let raw = URL_SAFE
            .decode(token.trim())
            .map_err(|_| FernetError::InvalidToken)?;
        if raw.len() < HEADER_LEN + BLOCK + TAG_LEN || raw[0] != VERSION {
            return Err(FernetError::InvalidToken);
        }

        let (signed, tag) = raw.split_at(raw.len() - TAG_LEN);
        let tag: &[u8; TAG_LEN] = tag.try_into().map_err(|_| FernetError::InvalidToken)?;
        if !hmac_sha256::HMAC::verify(signed, self.signing_key(), tag) {
            return Err(FernetError::InvalidToken);
        }

        let ciphertext = &signed[HEADER_LEN..];
        if ciphertext.len() % BLOCK != 0 {
            return Err(FernetError::InvalidToken);
        }

        let cipher = self.cipher();
        let mut prev: [u8; BLOCK] = signed[1 + 8..HEADER_LEN]
            .try_into()
            .map_err(|_| FernetError::InvalidToken)?;
        let mut plaintext = Vec::with_capacity(ciphertext.len());
        for chunk in ciphertext.chunks(BLOCK) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.decrypt_block(&mut block);
            plaintext.extend(block.iter().zip(prev.iter()).map(|(b, p)| b ^ p));
            prev.copy_from_slice(chunk);
        }

        let pad = usize::from(*plaintext.last().ok_or(FernetError::InvalidToken)?);
        if pad == 0 || pad > BLOCK || plaintext[plaintext.len() - pad..].iter().any(|&b| usize::from(b) != pad) {
            return Err(FernetError::InvalidToken);
        }
        plaintext.truncate(plaintext.len() - pad);
        Ok(plaintext)
    }
}
