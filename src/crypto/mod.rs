//! Key handling and AES-256-GCM encryption backing the `aesgcm` transformer.
//!
//! Everything a transformer factory needs to go from a raw `"aesgcm <hex>"`
//! descriptor argument to ciphertext lives here, rather than split between
//! this module and `transform::builtins` — the registry only ever sees this
//! module's `TransformFn`-shaped `encrypt`/`decrypt` pair, never a key byte
//! directly. Password-derived keys are out of scope: the hex argument *is*
//! the key, so there is no salt, no KDF, and no archive-wide identifier to
//! bind it to.
//!
//! Encrypted payload layout: `nonce (12 B) || ciphertext || GCM tag (16 B)`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng};
use aes_gcm::Aes256Gcm;

use crate::error::{Error, Result};

/// Byte length of the AES-GCM nonce prepended to every encrypted payload.
pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Parse a transformer descriptor's hex argument (e.g. the `"<hex>"` in
/// `"aesgcm <hex>"`) into a raw 32-byte key.
pub fn parse_key(hex_config: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex::decode(hex_config.trim())
        .map_err(|e| Error::TransformFailure(format!("bad aesgcm key hex: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::TransformFailure(format!("aesgcm key must be {KEY_LEN} bytes, got {}", bytes.len()))
    })
}

/// Encrypt `plaintext` with AES-256-GCM under `key`, using a fresh random
/// nonce. Returns `nonce (12 B) || ciphertext || GCM-tag (16 B)`.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::TransformFailure(format!("aesgcm encrypt: bad key ({e})")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::TransformFailure(format!("aesgcm encrypt: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt`] under the same `key`.
pub fn decrypt(key: &[u8; KEY_LEN], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return Err(Error::TransformFailure(format!(
            "aesgcm decrypt: payload shorter than the {NONCE_LEN}-byte nonce"
        )));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::TransformFailure(format!("aesgcm decrypt: bad key ({e})")))?;
    let nonce = aes_gcm::Nonce::from_slice(&data[..NONCE_LEN]);
    cipher
        .decrypt(nonce, &data[NONCE_LEN..])
        .map_err(|_| Error::TransformFailure("aesgcm decrypt: wrong key or corrupted data".into()))
}
