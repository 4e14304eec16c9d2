use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use kinship_types::models::Gender;

use crate::error::{Constraint, constraint_mentions, constraint_of};
use crate::models::{NewUser, USER_COLUMNS, UserRow};
use crate::{Database, DbError, Result};

impl Database {
    // -- Users --

    /// Insert a new user and return its id.
    ///
    /// Username and nickname uniqueness come from the table constraints.
    /// Email has no constraint, so it is checked inside the same write
    /// transaction as the insert.
    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let email_taken: i64 = tx.query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                [&user.email],
                |row| row.get(0),
            )?;
            if email_taken > 0 {
                return Err(DbError::Conflict("email"));
            }

            tx.execute(
                "INSERT INTO users (username, nickname, password, salt, email, gender)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user.username,
                    user.nickname,
                    user.password_hash,
                    user.salt,
                    user.email,
                    i8::from(user.gender),
                ],
            )
            .map_err(map_user_write_error)?;

            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id))
    }

    /// Update the mutable profile fields and return the fresh row.
    ///
    /// `None` keeps the stored value. One statement on the writer, so
    /// concurrent partial updates never write back a stale copy.
    pub fn update_user(&self, id: i64, nickname: Option<&str>, gender: Option<Gender>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users
                     SET nickname = COALESCE(?1, nickname),
                         gender = COALESCE(?2, gender),
                         updated_at = datetime('now')
                     WHERE id = ?3",
                    rusqlite::params![nickname, gender.map(i8::from), id],
                )
                .map_err(map_user_write_error)?;
            if changed == 0 {
                return Err(DbError::NotFound("user"));
            }

            query_user(conn, "id", &id)?.ok_or(DbError::NotFound("user"))
        })
    }
}

fn query_user(
    conn: &Connection,
    column: &str,
    value: &dyn rusqlite::types::ToSql,
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare_cached(&sql)?;

    let row = stmt.query_row([value], UserRow::from_row).optional()?;
    Ok(row)
}

fn map_user_write_error(err: rusqlite::Error) -> DbError {
    match constraint_of(&err) {
        Some(Constraint::Unique) if constraint_mentions(&err, "users.username") => {
            DbError::Conflict("username")
        }
        Some(Constraint::Unique) if constraint_mentions(&err, "users.nickname") => {
            DbError::Conflict("nickname")
        }
        Some(Constraint::Check) => DbError::InvalidInput("gender"),
        _ => DbError::Sqlite(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_user, new_user, test_db};

    #[test]
    fn create_and_fetch_user() {
        let (_tmp, db) = test_db();

        let id = add_user(&db, "alice");
        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        let by_id = db.get_user_by_id(id).unwrap().unwrap();

        assert_eq!(by_name.id, id);
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.nickname, "alice-nick");
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_conflict() {
        let (_tmp, db) = test_db();
        add_user(&db, "alice");

        let mut dup = new_user("alice");
        dup.nickname = "someone-else".into();
        dup.email = "other@example.com".into();
        assert!(matches!(db.create_user(&dup), Err(DbError::Conflict("username"))));
    }

    #[test]
    fn duplicate_nickname_is_conflict() {
        let (_tmp, db) = test_db();
        add_user(&db, "alice");

        let mut dup = new_user("bob");
        dup.nickname = "alice-nick".into();
        assert!(matches!(db.create_user(&dup), Err(DbError::Conflict("nickname"))));
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let (_tmp, db) = test_db();
        add_user(&db, "alice");

        let mut dup = new_user("bob");
        dup.email = "alice@example.com".into();
        assert!(matches!(db.create_user(&dup), Err(DbError::Conflict("email"))));
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn update_profile_fields() {
        let (_tmp, db) = test_db();
        let id = add_user(&db, "alice");

        let row = db.update_user(id, Some("ally"), Some(Gender::Female)).unwrap();
        assert_eq!(row.nickname, "ally");
        assert_eq!(row.gender, Gender::Female);
    }

    #[test]
    fn partial_update_keeps_other_field() {
        let (_tmp, db) = test_db();
        let id = add_user(&db, "alice");

        db.update_user(id, Some("ally"), Some(Gender::Female)).unwrap();

        let row = db.update_user(id, None, Some(Gender::Male)).unwrap();
        assert_eq!(row.nickname, "ally");
        assert_eq!(row.gender, Gender::Male);

        let row = db.update_user(id, Some("al"), None).unwrap();
        assert_eq!(row.nickname, "al");
        assert_eq!(row.gender, Gender::Male);

        // Same nickname again is fine.
        let row = db.update_user(id, Some("al"), None).unwrap();
        assert_eq!(row.nickname, "al");
    }

    #[test]
    fn concurrent_partial_updates_do_not_clobber() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let (_tmp, db) = test_db();
        let id = add_user(&db, "alice");
        let db = Arc::new(db);

        for round in 0..20 {
            let nickname = format!("nick{}", round);
            let barrier = Arc::new(Barrier::new(7));

            let mut handles = Vec::new();
            {
                let (db, barrier, nickname) = (db.clone(), barrier.clone(), nickname.clone());
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    db.update_user(id, Some(&nickname), None).unwrap();
                }));
            }
            for g in 0..6 {
                let (db, barrier) = (db.clone(), barrier.clone());
                handles.push(thread::spawn(move || {
                    barrier.wait();
                    let gender = Gender::try_from((g % 3) as i8).unwrap();
                    db.update_user(id, None, Some(gender)).unwrap();
                }));
            }
            for handle in handles {
                handle.join().unwrap();
            }

            let row = db.get_user_by_id(id).unwrap().unwrap();
            assert_eq!(row.nickname, nickname, "round {}", round);
        }
    }

    #[test]
    fn update_to_taken_nickname_is_conflict() {
        let (_tmp, db) = test_db();
        let alice = add_user(&db, "alice");
        add_user(&db, "bob");

        assert!(matches!(
            db.update_user(alice, Some("bob-nick"), None),
            Err(DbError::Conflict("nickname"))
        ));
        let row = db.get_user_by_id(alice).unwrap().unwrap();
        assert_eq!(row.nickname, "alice-nick");
    }

    #[test]
    fn update_missing_user_is_not_found() {
        let (_tmp, db) = test_db();
        assert!(matches!(
            db.update_user(999, Some("ghost"), None),
            Err(DbError::NotFound("user"))
        ));
    }
}
