use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LockError;

/// Namespace every lock key lives under, keeping lock entries apart from
/// unrelated keys in the same store.
pub const KEY_PREFIX: &str = "lock";

/// A namespaced lock key of the form `lock:<domain>:<resource-id>`.
///
/// Keys are colon-delimited ASCII so they stay human-auditable from the store
/// (`redis-cli --scan --pattern 'lock:*'`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockKey(String);

impl LockKey {
    /// Builds `lock:<domain>:<resource_id>`.
    ///
    /// `domain` may itself contain colons (`"update:user"`), which is how
    /// resource classes are nested.
    pub fn new(domain: &str, resource_id: impl fmt::Display) -> Result<Self, LockError> {
        Self::from_name(&format!("{}:{}", domain, resource_id))
    }

    /// Key guarding the registration of `username`: `lock:register:<username>`.
    pub fn register(username: &str) -> Result<Self, LockError> {
        Self::new("register", username)
    }

    /// Key guarding updates of user `id`: `lock:update:user:<id>`.
    pub fn update_user(id: i64) -> Result<Self, LockError> {
        Self::new("update:user", id)
    }

    /// Prefixes an unqualified name (`"register:alice"`) with the lock
    /// namespace. A name that is already qualified is accepted as-is.
    pub fn from_name(name: &str) -> Result<Self, LockError> {
        let name = name
            .strip_prefix(KEY_PREFIX)
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(name);
        validate_name(name)?;
        Ok(Self(format!("{}:{}", KEY_PREFIX, name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its `lock:` prefix.
    pub fn name(&self) -> &str {
        &self.0[KEY_PREFIX.len() + 1..]
    }
}

fn validate_name(name: &str) -> Result<(), LockError> {
    if name.is_empty() {
        return Err(LockError::InvalidKey {
            reason: "lock name must not be empty".to_string(),
        });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii() || c.is_ascii_whitespace() || c.is_ascii_control())
    {
        return Err(LockError::InvalidKey {
            reason: format!("lock name contains unsupported character {:?}", c),
        });
    }
    if name.split(':').any(str::is_empty) {
        return Err(LockError::InvalidKey {
            reason: "lock name must not contain empty segments".to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LockKey {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl From<LockKey> for String {
    fn from(key: LockKey) -> Self {
        key.0
    }
}

/// The fencing credential written at acquisition time.
///
/// Only the holder knows it; release and refresh must present it again.
/// `Debug` is redacted so tokens do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FencingToken(String);

impl FencingToken {
    /// A fresh random token (21-char nanoid).
    pub fn generate() -> Self {
        Self(nanoid::nanoid!())
    }

    /// Rehydrates a token handed back by a remote holder, e.g. over HTTP.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FencingToken(..)")
    }
}
