/// Kinship Crypto Library
///
/// - `password`: Argon2id digests with a per-user salt (registration/login only).
/// - `token`: stateless session tokens under one symmetric server key. Expiry is
///   the only revocation mechanism, so keep the ttl short.
/// - `keys`: loading and generating that key.

pub mod keys;
pub mod password;
pub mod token;
