//! Friend graph storage.
//!
//! Every row is one direction of a relationship. A request is a single
//! `pending` row from requester to addressee; accepting it flips that row and
//! inserts the reverse one, both `accepted`, in one transaction.

use std::time::Duration;

use kinship_types::models::FriendStatus;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::error::{Constraint, constraint_of};
use crate::models::{FRIEND_COLUMNS, FriendRow};
use crate::{Database, DbError, Result};

const PENDING: i64 = FriendStatus::Pending as i64;
const ACCEPTED: i64 = FriendStatus::Accepted as i64;
const REJECTED: i64 = FriendStatus::Rejected as i64;
const EXPIRED: i64 = FriendStatus::Expired as i64;

impl Database {
    /// Number of `user_id -> friend_id` rows with `status` (0 or 1).
    pub fn exists_edge(&self, user_id: i64, friend_id: i64, status: FriendStatus) -> Result<u32> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM friends WHERE user_id = ?1 AND friend_id = ?2 AND status = ?3",
                rusqlite::params![user_id, friend_id, status.code()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// The `user_id -> friend_id` edge unless it was rejected.
    pub fn get_edge(&self, user_id: i64, friend_id: i64) -> Result<FriendRow> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM friends WHERE user_id = ?1 AND friend_id = ?2 AND status != ?3",
                FRIEND_COLUMNS
            );
            conn.query_row(
                &sql,
                rusqlite::params![user_id, friend_id, REJECTED],
                FriendRow::from_row,
            )
            .optional()?
            .ok_or(DbError::NotFound("friend edge"))
        })
    }

    /// The caller's confirmed friends.
    pub fn list_accepted_edges(&self, user_id: i64) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| query_edges(conn, "user_id", user_id, FriendStatus::Accepted))
    }

    /// Requests waiting for the caller to accept or reject.
    pub fn list_incoming_requests(&self, user_id: i64) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| query_edges(conn, "friend_id", user_id, FriendStatus::Pending))
    }

    /// Requests the caller sent that are still pending.
    pub fn list_outgoing_requests(&self, user_id: i64) -> Result<Vec<FriendRow>> {
        self.with_conn(|conn| query_edges(conn, "user_id", user_id, FriendStatus::Pending))
    }

    /// Record a pending request `user_id -> friend_id`.
    ///
    /// One statement: the primary key is the duplicate check. A pending or
    /// accepted row for the pair is left untouched and reported as
    /// [`DbError::DuplicateRequest`]; a rejected or expired one is reopened.
    pub fn create_request(&self, user_id: i64, friend_id: i64, message: Option<&str>) -> Result<()> {
        if user_id == friend_id {
            return Err(DbError::InvalidInput("cannot send a friend request to yourself"));
        }

        self.with_conn_mut(|conn| {
            let changed = conn
                .execute(
                    "INSERT INTO friends (user_id, friend_id, status, message)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (user_id, friend_id) DO UPDATE SET
                         status = excluded.status,
                         message = excluded.message,
                         requested_at = datetime('now'),
                         changed_at = datetime('now')
                     WHERE friends.status IN (?5, ?6)",
                    rusqlite::params![user_id, friend_id, PENDING, message, REJECTED, EXPIRED],
                )
                .map_err(|e| match constraint_of(&e) {
                    Some(Constraint::ForeignKey) => DbError::NotFound("user"),
                    Some(Constraint::Unique) => DbError::DuplicateRequest,
                    Some(Constraint::Check) => {
                        DbError::InvalidInput("cannot send a friend request to yourself")
                    }
                    _ => DbError::Sqlite(e),
                })?;

            if changed == 0 {
                return Err(DbError::DuplicateRequest);
            }
            debug!("Friend request {} -> {} recorded", user_id, friend_id);
            Ok(())
        })
    }

    /// `user_id` accepts the pending request sent by `friend_id`.
    ///
    /// Runs as one IMMEDIATE transaction, so the write lock is held from the
    /// first statement and both rows become visible together or not at all.
    pub fn accept_request(&self, user_id: i64, friend_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            match accept_in_tx(&tx, user_id, friend_id) {
                Ok(()) => {
                    tx.commit()?;
                    debug!("Friendship {} <-> {} accepted", user_id, friend_id);
                    Ok(())
                }
                Err(e) => {
                    // Caller sees the accept error, not the rollback one.
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(
                            "Rollback after failed accept {} <- {} failed: {}",
                            user_id, friend_id, rollback_err
                        );
                    }
                    Err(e)
                }
            }
        })
    }

    /// `user_id` rejects the pending request sent by `friend_id`.
    pub fn reject_request(&self, user_id: i64, friend_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE friends SET status = ?1, changed_at = datetime('now')
                 WHERE user_id = ?2 AND friend_id = ?3 AND status = ?4",
                rusqlite::params![REJECTED, friend_id, user_id, PENDING],
            )?;
            if changed == 0 {
                return Err(DbError::RequestNotFound);
            }
            Ok(())
        })
    }

    /// Mark pending requests older than `max_age` as expired.
    pub fn expire_stale_requests(&self, max_age: Duration) -> Result<usize> {
        let max_age_secs = i64::try_from(max_age.as_secs())
            .map_err(|_| DbError::InvalidInput("request ttl is too large"))?;

        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE friends SET status = ?1, changed_at = datetime('now')
                 WHERE status = ?2
                   AND requested_at <= datetime('now', '-' || ?3 || ' seconds')",
                rusqlite::params![EXPIRED, PENDING, max_age_secs],
            )?;
            Ok(changed)
        })
    }
}

fn accept_in_tx(tx: &Transaction<'_>, user_id: i64, friend_id: i64) -> Result<()> {
    // The requester's row, friend_id -> user_id. Only a pending row counts.
    let flipped = tx.execute(
        "UPDATE friends SET status = ?1, changed_at = datetime('now')
         WHERE user_id = ?2 AND friend_id = ?3 AND status = ?4",
        rusqlite::params![ACCEPTED, friend_id, user_id, PENDING],
    )?;
    if flipped == 0 {
        return Err(DbError::RequestNotFound);
    }

    // The reciprocal row. A crossing request (or an old rejected/expired one)
    // in this direction is promoted; an accepted one means the pair is
    // already friends.
    let inserted = tx
        .execute(
            "INSERT INTO friends (user_id, friend_id, status)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, friend_id) DO UPDATE SET
                 status = excluded.status,
                 changed_at = datetime('now')
             WHERE friends.status != excluded.status",
            rusqlite::params![user_id, friend_id, ACCEPTED],
        )
        .map_err(|e| match constraint_of(&e) {
            Some(Constraint::Unique) => DbError::DuplicateRequest,
            Some(Constraint::ForeignKey) => DbError::NotFound("user"),
            _ => DbError::Sqlite(e),
        })?;
    if inserted == 0 {
        return Err(DbError::DuplicateRequest);
    }

    Ok(())
}

fn query_edges(
    conn: &Connection,
    owner_column: &str,
    user_id: i64,
    status: FriendStatus,
) -> Result<Vec<FriendRow>> {
    let sql = format!(
        "SELECT {} FROM friends WHERE {} = ?1 AND status = ?2 ORDER BY changed_at DESC, user_id, friend_id",
        FRIEND_COLUMNS, owner_column
    );
    let mut stmt = conn.prepare_cached(&sql)?;

    let rows = stmt
        .query_map(rusqlite::params![user_id, status.code()], FriendRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
