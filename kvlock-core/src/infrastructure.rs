use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Outcome of a token-checked store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOutcome {
    /// The stored value equalled the token and the operation was applied.
    Matched,
    /// Nothing is stored under the key.
    Absent,
    /// Another token is stored under the key; nothing was changed.
    HeldByOther,
}

impl CompareOutcome {
    /// Decodes the integer reply of the compare scripts: `1` matched,
    /// `0` absent, `-1` held by another token.
    pub fn from_reply(reply: i64) -> Result<Self, StoreError> {
        match reply {
            1 => Ok(CompareOutcome::Matched),
            0 => Ok(CompareOutcome::Absent),
            -1 => Ok(CompareOutcome::HeldByOther),
            other => Err(StoreError::Protocol(format!(
                "compare script returned {}",
                other
            ))),
        }
    }
}

/// The store primitives the lock is built on.
///
/// Every method must be a single atomic operation on the store side. In
/// particular `compare_and_delete` may not be implemented as a read followed
/// by a delete.
#[async_trait]
pub trait LockStore: Send + Sync + 'static {
    /// Write `key = token` with expiry `ttl` only if `key` is absent.
    /// Returns `true` if the value was written.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete `key` only if its value equals `token`.
    async fn compare_and_delete(&self, key: &str, token: &str)
    -> Result<CompareOutcome, StoreError>;

    /// Reset the expiry of `key` to `ttl` only if its value equals `token`.
    async fn compare_and_expire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<CompareOutcome, StoreError>;

    /// Remaining time to live of `key`, `None` if it is absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Short backend label for logs and health output.
    fn backend(&self) -> &'static str;
}
