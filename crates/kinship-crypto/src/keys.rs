use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use anyhow::{Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::token::TOKEN_KEY_LEN;

/// Generate a random 256-bit token key.
pub fn generate_token_key() -> [u8; TOKEN_KEY_LEN] {
    let mut key = [0u8; TOKEN_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encode a key to base64 for display/config files.
pub fn key_to_base64(key: &[u8; TOKEN_KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Parse the configured token key.
///
/// A value that is exactly 32 bytes long is used as-is; anything else must be
/// base64 that decodes to 32 bytes.
pub fn parse_token_key(raw: &str) -> Result<[u8; TOKEN_KEY_LEN]> {
    if let Ok(key) = <[u8; TOKEN_KEY_LEN]>::try_from(raw.as_bytes()) {
        return Ok(key);
    }

    let bytes = match BASE64.decode(raw.trim()) {
        Ok(bytes) => bytes,
        Err(_) => bail!("token key must be 32 bytes or base64 of 32 bytes"),
    };
    let key: [u8; TOKEN_KEY_LEN] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("Invalid key length: must decode to exactly {} bytes", TOKEN_KEY_LEN))?;
    Ok(key)
}
