//! SQLite persistence for conversations and encrypted messages.

pub mod conversation;
pub mod message;
pub mod pool;

pub use message::SqliteMessageStore;
pub use pool::DatabasePool;

use amity_types::error::RepositoryError;
use chrono::{DateTime, Utc};

/// Map a sqlx error into the repository taxonomy.
pub(crate) fn map_sqlx(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => RepositoryError::Connection,
        other => RepositoryError::Query(other.to_string()),
    }
}

/// Parse an RFC 3339 timestamp column.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid timestamp: {e}")))
}
