//! # kvlock-core
//!
//! Token-fenced mutual exclusion over a shared key-value store.
//! Provides a single-probe lock primitive, bounded fixed-delay retry,
//! scoped guards that release on every exit path, and the guarded
//! user mutations built on them.

pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod infrastructure;
#[path = "infrastructure_in_memory.rs"]
pub mod infrastructure_in_memory;
#[cfg(feature = "redis")]
#[path = "infrastructure_redis.rs"]
pub mod infrastructure_redis;
pub mod repository;
#[cfg(feature = "sqlite")]
#[path = "repository_sqlite.rs"]
pub mod repository_sqlite;
pub mod retry;
pub mod service;
pub mod types;

pub use client::LockClient;
pub use config::LockConfig;
pub use error::{ErrorCategory, LockError, RepositoryError, ServiceError, StoreError};
pub use guard::{LockGuard, with_lock, with_lock_retry, with_lock_until};
pub use retry::RetryPolicy;

#[cfg(test)]
mod test_support;
#[cfg(test)]
#[path = "infrastructure_test.rs"]
mod infrastructure_test;
#[cfg(all(test, feature = "sqlite"))]
#[path = "repository_sqlite_test.rs"]
mod repository_sqlite_test;
