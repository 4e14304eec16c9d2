//! Database row types. These map directly to SQLite rows.
//! Distinct from kinship-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use kinship_types::models::{FriendEdge, FriendStatus, Gender, User};
use rusqlite::Row;
use tracing::warn;

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub password: String,
    pub salt: String,
    pub email: String,
    pub gender: Gender,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields supplied at registration.
pub struct NewUser {
    pub username: String,
    pub nickname: String,
    pub password_hash: String,
    pub salt: String,
    pub email: String,
    pub gender: Gender,
}

#[derive(Debug, Clone)]
pub struct FriendRow {
    pub user_id: i64,
    pub friend_id: i64,
    pub status: FriendStatus,
    pub message: Option<String>,
    pub requested_at: String,
    pub changed_at: String,
}

pub(crate) const USER_COLUMNS: &str =
    "id, username, nickname, password, salt, email, gender, created_at, updated_at";

pub(crate) const FRIEND_COLUMNS: &str =
    "user_id, friend_id, status, message, requested_at, changed_at";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let gender: i64 = row.get(6)?;
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            nickname: row.get(2)?,
            password: row.get(3)?,
            salt: row.get(4)?,
            email: row.get(5)?,
            gender: i8::try_from(gender)
                .ok()
                .and_then(|g| Gender::try_from(g).ok())
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, gender))?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Public profile. Drops the digest and salt.
    pub fn into_user(self) -> User {
        User {
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            id: self.id,
            username: self.username,
            nickname: self.nickname,
            email: self.email,
            gender: self.gender,
        }
    }
}

impl FriendRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: i64 = row.get(2)?;
        Ok(Self {
            user_id: row.get(0)?,
            friend_id: row.get(1)?,
            status: FriendStatus::from_code(status)
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, status))?,
            message: row.get(3)?,
            requested_at: row.get(4)?,
            changed_at: row.get(5)?,
        })
    }

    pub fn into_edge(self) -> FriendEdge {
        FriendEdge {
            requested_at: parse_timestamp(&self.requested_at),
            changed_at: parse_timestamp(&self.changed_at),
            user_id: self.user_id,
            friend_id: self.friend_id,
            status: self.status,
            message: self.message,
        }
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC; fall back to RFC 3339 for rows written elsewhere.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
