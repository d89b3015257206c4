//! Error types for the lock layer and the guarded user flows.

use std::time::Duration;

/// Failures talking to the backing key-value store.
///
/// None of these mean "someone else holds the lock"; they are dependency
/// outages and are never retried by [`RetryPolicy`](crate::retry::RetryPolicy).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("lock store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with something a lock key can never hold.
    #[error("unexpected reply from lock store: {0}")]
    Protocol(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Errors returned by [`LockClient`](crate::client::LockClient) and the guards.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The key currently holds another token.
    #[error("lock {key} is held by another owner")]
    Contention { key: String },

    /// Nothing is stored under the key: the lock expired, was already
    /// released, or was never acquired.
    #[error("lock {key} is not held")]
    NotHeld { key: String },

    /// The key holds a different token: the lock expired and was re-acquired
    /// by another owner.
    #[error("lock {key} is held under a different token")]
    Mismatch { key: String },

    /// The caller's deadline elapsed before any probe succeeded.
    #[error("gave up on lock {key} after {attempts} attempt(s): deadline elapsed")]
    Timeout { key: String, attempts: u32 },

    #[error("invalid lock ttl {ttl:?}: must be at least 1ms")]
    InvalidTtl { ttl: Duration },

    #[error("invalid lock key: {reason}")]
    InvalidKey { reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    /// `true` for the "busy, try again" family of outcomes.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::Contention { .. } | LockError::Timeout { .. })
    }

    /// `true` when the caller no longer owns the lock it presented a token for.
    pub fn is_ownership_lost(&self) -> bool {
        matches!(self, LockError::NotHeld { .. } | LockError::Mismatch { .. })
    }
}

/// Errors raised by [`UserRepository`](crate::repository::UserRepository)
/// backends.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository backend failure: {0}")]
    Backend(String),

    #[error("row {id} vanished during the transaction")]
    RowMissing { id: i64 },

    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Coarse, user-facing buckets that [`ServiceError`] is folded into at the
/// service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Lock contention: retry later
    Busy,
    Conflict,
    NotFound,
    BadRequest,
    /// The lock store or database is unreachable
    Unavailable,
    Internal,
}

/// Errors returned by [`UserService`](crate::service::UserService).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("username already exists")]
    UsernameTaken,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Lock(err) if err.is_contention() => ErrorCategory::Busy,
            ServiceError::Lock(LockError::Store(_)) => ErrorCategory::Unavailable,
            ServiceError::Lock(LockError::InvalidKey { .. }) => ErrorCategory::BadRequest,
            ServiceError::Lock(_) => ErrorCategory::Internal,
            ServiceError::UsernameTaken => ErrorCategory::Conflict,
            ServiceError::UserNotFound => ErrorCategory::NotFound,
            ServiceError::InvalidInput(_) => ErrorCategory::BadRequest,
            ServiceError::Repository(_) => ErrorCategory::Unavailable,
            ServiceError::PasswordHash(_) | ServiceError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Message safe to show to an end user. Lock keys, tokens and backend
    /// details stay out of it.
    pub fn public_message(&self) -> String {
        match self.category() {
            ErrorCategory::Busy => "system busy, please retry later".to_string(),
            ErrorCategory::Unavailable | ErrorCategory::Internal => "internal error".to_string(),
            ErrorCategory::Conflict | ErrorCategory::NotFound => self.to_string(),
            ErrorCategory::BadRequest => match self {
                ServiceError::InvalidInput(msg) => msg.clone(),
                _ => "invalid request".to_string(),
            },
        }
    }
}
