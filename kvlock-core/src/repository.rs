use std::sync::Mutex;

use crate::error::RepositoryError;
use crate::types::{NewUser, User};

/// Operations available inside one transactional unit of work.
pub trait UserTransaction {
    /// Number of non-deleted users named `username`.
    fn count_live_by_username(&mut self, username: &str) -> Result<u64, RepositoryError>;

    fn find_live_by_id(&mut self, id: i64) -> Result<Option<User>, RepositoryError>;

    fn insert(&mut self, user: NewUser) -> Result<User, RepositoryError>;

    /// Overwrite the mutable columns of an existing row.
    fn update(&mut self, user: &User) -> Result<(), RepositoryError>;
}

/// Relational storage for users.
///
/// Username uniqueness is enforced by the application, not by a unique index,
/// so a check-then-insert is only race-free under the registration lock.
pub trait UserRepository: Send + Sync + 'static {
    /// Run `work` in a transaction: commit if it returns `Ok`, roll back if it
    /// returns `Err`.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UserTransaction) -> Result<T, E>,
        E: From<RepositoryError>;

    /// Read a live user outside any lock.
    fn get_live(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        self.transaction(|tx| tx.find_live_by_id(id))
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<User>,
    next_id: i64,
}

/// A [`UserRepository`] kept in process memory. A transaction works on a copy
/// of the tables that replaces the originals on commit.
#[derive(Default)]
pub struct InMemoryUserRepository {
    tables: Mutex<Tables>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All rows, deleted ones included.
    pub fn all(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.lock_tables()?.users.clone())
    }

    /// Flag a row as deleted. Outside the guarded flows; exists so tests can
    /// exercise the live-row filter.
    pub fn soft_delete(&self, id: i64) -> Result<bool, RepositoryError> {
        let mut tables = self.lock_tables()?;
        match tables.users.iter_mut().find(|u| u.id == id && !u.deleted) {
            Some(user) => {
                user.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn lock_tables(&self) -> Result<std::sync::MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Backend("user table poisoned".to_string()))
    }
}

struct MemoryTransaction<'a> {
    tables: &'a mut Tables,
}

impl UserTransaction for MemoryTransaction<'_> {
    fn count_live_by_username(&mut self, username: &str) -> Result<u64, RepositoryError> {
        Ok(self
            .tables
            .users
            .iter()
            .filter(|u| !u.deleted && u.username == username)
            .count() as u64)
    }

    fn find_live_by_id(&mut self, id: i64) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .tables
            .users
            .iter()
            .find(|u| !u.deleted && u.id == id)
            .cloned())
    }

    fn insert(&mut self, user: NewUser) -> Result<User, RepositoryError> {
        self.tables.next_id += 1;
        let row = User {
            id: self.tables.next_id,
            username: user.username,
            password_hash: user.password_hash,
            nickname: user.nickname,
            deleted: false,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        self.tables.users.push(row.clone());
        Ok(row)
    }

    fn update(&mut self, user: &User) -> Result<(), RepositoryError> {
        let row = self
            .tables
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(RepositoryError::RowMissing { id: user.id })?;
        row.password_hash = user.password_hash.clone();
        row.nickname = user.nickname.clone();
        row.updated_at = user.updated_at;
        Ok(())
    }
}

impl UserRepository for InMemoryUserRepository {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UserTransaction) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let mut tables = self.lock_tables()?;
        let mut working = tables.clone();
        let result = work(&mut MemoryTransaction {
            tables: &mut working,
        })?;
        *tables = working;
        Ok(result)
    }
}
