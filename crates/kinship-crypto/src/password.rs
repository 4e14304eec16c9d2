use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use thiserror::Error;

/// Fixed salt for the decoy hash run when there is no real digest to check.
const DUMMY_SALT: &str = "a2luc2hpcC1kdW1teS1zYWx0";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("salt is not valid base64")]
    InvalidSalt,

    #[error("password hashing failed: {0}")]
    Hash(String),

    /// Wrong password, malformed digest and salt mismatch all collapse here.
    #[error("password does not match")]
    Mismatch,
}

/// Generate a fresh 128-bit salt from the OS RNG, base64 encoded.
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).as_str().to_owned()
}

/// Argon2id digest of `password` under `salt`, as a PHC string.
pub fn hash_password(password: &str, salt: &str) -> Result<String, PasswordError> {
    let salt = SaltString::from_b64(salt).map_err(|_| PasswordError::InvalidSalt)?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Check `password` against a stored digest and salt.
///
/// The comparison of the derived output is constant time. A digest that fails
/// to parse, or was produced under another salt, still pays for one full hash
/// so the caller cannot tell it apart from a wrong password.
pub fn compare_password(password: &str, digest: &str, salt: &str) -> Result<(), PasswordError> {
    let parsed = match PasswordHash::new(digest) {
        Ok(parsed) if parsed.salt.map(|s| s.as_str()) == Some(salt) => parsed,
        _ => {
            dummy_verify(password);
            return Err(PasswordError::Mismatch);
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| PasswordError::Mismatch)
}

/// Burn one hash. Used on login for usernames that do not exist.
pub fn dummy_verify(password: &str) {
    let _ = hash_password(password, DUMMY_SALT);
}
