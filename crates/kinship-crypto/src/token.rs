use std::collections::HashSet;
use std::str::FromStr;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, Payload as AeadPayload, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use kinship_types::api::Payload;

/// Symmetric keys must be exactly this long for either token format.
pub const TOKEN_KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Version/purpose header of sealed tokens. Bound into the AEAD tag.
const SEALED_HEADER: &str = "v1.local.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is invalid")]
    InvalidToken,

    #[error("token has expired")]
    ExpiredToken,

    #[error("invalid key size: must be exactly {TOKEN_KEY_LEN} bytes")]
    InvalidKeySize,

    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// Issues and verifies stateless session tokens.
pub trait TokenMaker: Send + Sync {
    /// Issue a token for `username` valid for `ttl`.
    fn create_token(&self, username: &str, ttl: Duration) -> Result<(String, Payload), TokenError>;

    /// Verify `token` as of `now`. Integrity is checked before expiry.
    fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Payload, TokenError>;

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        self.verify_token_at(token, Utc::now())
    }
}

/// Which [`TokenMaker`] the server runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenFormat {
    #[default]
    Sealed,
    Jwt,
}

impl FromStr for TokenFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sealed" => Ok(Self::Sealed),
            "jwt" => Ok(Self::Jwt),
            other => Err(format!("unknown token format '{}' (expected 'sealed' or 'jwt')", other)),
        }
    }
}

pub fn new_maker(format: TokenFormat, key: &[u8]) -> Result<Box<dyn TokenMaker>, TokenError> {
    Ok(match format {
        TokenFormat::Sealed => Box::new(SealedTokenMaker::new(key)?),
        TokenFormat::Jwt => Box::new(JwtMaker::new(key)?),
    })
}

fn new_payload(username: &str, ttl: Duration, now: DateTime<Utc>) -> Payload {
    let issued_at = now.trunc_subsecs(0);
    Payload {
        id: Uuid::new_v4(),
        username: username.to_string(),
        issued_at,
        expires_at: issued_at + ttl,
    }
}

fn check_expiry(payload: Payload, now: DateTime<Utc>) -> Result<Payload, TokenError> {
    if now >= payload.expires_at {
        return Err(TokenError::ExpiredToken);
    }
    Ok(payload)
}

// -- Sealed (AES-256-GCM) --

/// Encrypts the JSON payload with AES-256-GCM.
///
/// Wire format: `v1.local.` + base64url(nonce || ciphertext || tag).
pub struct SealedTokenMaker {
    cipher: Aes256Gcm,
}

impl SealedTokenMaker {
    pub fn new(key: &[u8]) -> Result<Self, TokenError> {
        if key.len() != TOKEN_KEY_LEN {
            return Err(TokenError::InvalidKeySize);
        }
        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }
}

impl TokenMaker for SealedTokenMaker {
    fn create_token(&self, username: &str, ttl: Duration) -> Result<(String, Payload), TokenError> {
        let payload = new_payload(username, ttl, Utc::now());
        let plaintext = serde_json::to_vec(&payload).map_err(|e| TokenError::Issue(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                AeadPayload {
                    msg: &plaintext,
                    aad: SEALED_HEADER.as_bytes(),
                },
            )
            .map_err(|e| TokenError::Issue(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok((format!("{}{}", SEALED_HEADER, URL_SAFE_NO_PAD.encode(sealed)), payload))
    }

    fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Payload, TokenError> {
        let body = token
            .strip_prefix(SEALED_HEADER)
            .ok_or(TokenError::InvalidToken)?;
        let sealed = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenError::InvalidToken)?;
        if sealed.len() <= NONCE_LEN {
            return Err(TokenError::InvalidToken);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                AeadPayload {
                    msg: ciphertext,
                    aad: SEALED_HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::InvalidToken)?;

        let payload: Payload =
            serde_json::from_slice(&plaintext).map_err(|_| TokenError::InvalidToken)?;
        check_expiry(payload, now)
    }
}

// -- JWT (HS256) --

#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    jti: Uuid,
    sub: String,
    iat: i64,
    exp: i64,
}

/// HS256 JWT. Expiry is enforced by [`check_expiry`], not by jsonwebtoken,
/// so both formats share one boundary rule and no leeway.
pub struct JwtMaker {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtMaker {
    pub fn new(key: &[u8]) -> Result<Self, TokenError> {
        if key.len() != TOKEN_KEY_LEN {
            return Err(TokenError::InvalidKeySize);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims =
            HashSet::from(["exp".to_string(), "sub".to_string()]);

        Ok(Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
        })
    }
}

impl TokenMaker for JwtMaker {
    fn create_token(&self, username: &str, ttl: Duration) -> Result<(String, Payload), TokenError> {
        let payload = new_payload(username, ttl, Utc::now());
        let claims = JwtClaims {
            jti: payload.id,
            sub: payload.username.clone(),
            iat: payload.issued_at.timestamp(),
            exp: payload.expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Issue(e.to_string()))?;

        Ok((token, payload))
    }

    fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> Result<Payload, TokenError> {
        let claims = decode::<JwtClaims>(token, &self.decoding, &self.validation)
            .map_err(|_| TokenError::InvalidToken)?
            .claims;

        let payload = Payload {
            id: claims.jti,
            username: claims.sub,
            issued_at: DateTime::from_timestamp(claims.iat, 0).ok_or(TokenError::InvalidToken)?,
            expires_at: DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::InvalidToken)?,
        };
        check_expiry(payload, now)
    }
}
