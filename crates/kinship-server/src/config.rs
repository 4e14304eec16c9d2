use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use kinship_crypto::keys::parse_token_key;
use kinship_crypto::token::{TOKEN_KEY_LEN, TokenFormat};

/// Placeholder token keys that MUST NOT be used.
const PLACEHOLDER_KEYS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "change-me-change-me-change-me-32",
    "00000000000000000000000000000000",
];

/// Server settings. Not `Debug`: it holds the token key.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub token_key: [u8; TOKEN_KEY_LEN],
    pub token_format: TokenFormat,
    pub access_token_ttl: chrono::Duration,
    pub request_timeout: Duration,
    pub friend_request_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_key = lookup("KINSHIP_TOKEN_KEY").unwrap_or_default();
        if raw_key.trim().is_empty() || PLACEHOLDER_KEYS.contains(&raw_key.trim()) {
            bail!("KINSHIP_TOKEN_KEY is unset or still a placeholder");
        }
        let token_key = parse_token_key(&raw_key).context("KINSHIP_TOKEN_KEY")?;

        let token_format = match lookup("KINSHIP_TOKEN_FORMAT") {
            Some(raw) => TokenFormat::from_str(&raw).map_err(anyhow::Error::msg)?,
            None => TokenFormat::default(),
        };

        let access_ttl_secs: i64 = parse_or(&lookup, "KINSHIP_ACCESS_TOKEN_TTL_SECS", 900)?;
        if access_ttl_secs <= 0 {
            bail!("KINSHIP_ACCESS_TOKEN_TTL_SECS must be positive");
        }

        let request_ttl_hours: u64 = parse_or(&lookup, "KINSHIP_FRIEND_REQUEST_TTL_HOURS", 168)?;
        let Some(request_ttl_secs) = request_ttl_hours.checked_mul(3600).filter(|s| i64::try_from(*s).is_ok()) else {
            bail!("KINSHIP_FRIEND_REQUEST_TTL_HOURS is too large");
        };

        Ok(Self {
            host: lookup("KINSHIP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "KINSHIP_PORT", 8080)?,
            db_path: lookup("KINSHIP_DB_PATH").unwrap_or_else(|| "kinship.db".into()).into(),
            token_key,
            token_format,
            access_token_ttl: chrono::Duration::seconds(access_ttl_secs),
            request_timeout: Duration::from_secs(parse_or(&lookup, "KINSHIP_REQUEST_TIMEOUT_SECS", 5)?),
            friend_request_ttl: Duration::from_secs(request_ttl_secs),
            sweep_interval: Duration::from_secs(parse_or::<u64>(&lookup, "KINSHIP_SWEEP_INTERVAL_SECS", 3600)?.max(1)),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {}: '{}'", name, raw)),
        None => Ok(default),
    }
}
