use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("DB: running migration v1 (users, friends)");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                nickname    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                salt        TEXT NOT NULL,
                email       TEXT NOT NULL,
                gender      INTEGER NOT NULL DEFAULT 0 CHECK (gender IN (0, 1, 2)),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_email ON users(email);

            -- One row per direction. A friendship is two accepted rows.
            CREATE TABLE friends (
                user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                friend_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status       INTEGER NOT NULL DEFAULT 1 CHECK (status BETWEEN 1 AND 4),
                message      TEXT,
                requested_at TEXT NOT NULL DEFAULT (datetime('now')),
                changed_at   TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, friend_id),
                CHECK (user_id != friend_id)
            );

            CREATE INDEX idx_friends_friend ON friends(friend_id, status);
            CREATE INDEX idx_friends_pending ON friends(status, requested_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}
