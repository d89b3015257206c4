//! SQLite-backed UserRepository implementation.
//!
//! Enable with the `sqlite` feature flag:
//! ```toml
//! kvlock-core = { path = "../kvlock-core", features = ["sqlite"] }
//! ```

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::RepositoryError;
use crate::repository::{UserRepository, UserTransaction};
use crate::types::{NewUser, User};

/// A user table in a SQLite database.
///
/// `username` has no unique index; uniqueness among live rows is checked by
/// the registration flow under its lock.
pub struct SqliteUserRepository {
    conn: Mutex<Connection>,
}

impl SqliteUserRepository {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(path: &str) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::with_connection(conn)
    }

    /// A private database that disappears with the repository.
    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL,
                password    TEXT NOT NULL,
                nickname    TEXT NOT NULL DEFAULT '',
                deleted     INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username, deleted);",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Flag a row as deleted.
    pub fn soft_delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let rows = self.connection()?.execute(
            "UPDATE users SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            params![id],
        )?;
        Ok(rows > 0)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Backend("sqlite connection poisoned".to_string()))
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            nickname: row.get(3)?,
            deleted: row.get::<_, i64>(4)? != 0,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

struct SqliteTransaction<'a, 'conn> {
    tx: &'a Transaction<'conn>,
}

impl UserTransaction for SqliteTransaction<'_, '_> {
    fn count_live_by_username(&mut self, username: &str) -> Result<u64, RepositoryError> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 AND deleted = 0",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn find_live_by_id(&mut self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tx
            .query_row(
                "SELECT id, username, password, nickname, deleted, created_at, updated_at
                 FROM users WHERE id = ?1 AND deleted = 0",
                params![id],
                SqliteUserRepository::row_to_user,
            )
            .optional()?)
    }

    fn insert(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        self.tx.execute(
            "INSERT INTO users (username, password, nickname, deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![user.username, user.password_hash, user.nickname, user.created_at],
        )?;
        Ok(User {
            id: self.tx.last_insert_rowid(),
            username: user.username,
            password_hash: user.password_hash,
            nickname: user.nickname,
            deleted: false,
            created_at: user.created_at,
            updated_at: user.created_at,
        })
    }

    fn update(&mut self, user: &User) -> Result<(), RepositoryError> {
        let rows = self.tx.execute(
            "UPDATE users SET password = ?1, nickname = ?2, updated_at = ?3 WHERE id = ?4",
            params![user.password_hash, user.nickname, user.updated_at, user.id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::RowMissing { id: user.id });
        }
        Ok(())
    }
}

impl UserRepository for SqliteUserRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UserTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction().map_err(RepositoryError::from)?;
        let result = work(&mut SqliteTransaction { tx: &tx });
        match result {
            Ok(value) => {
                tx.commit().map_err(RepositoryError::from)?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().map_err(RepositoryError::from)?;
                Err(err)
            }
        }
    }
}
