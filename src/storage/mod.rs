//! Replica storage implementations.

#[cfg(feature = "sqlite")]
use tracing::info;

#[cfg(feature = "sqlite")]
use crate::config::StorageConfig;

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryPersonRepository;
#[cfg(feature = "sqlite")]
pub use sqlite::SqlitePersonRepository;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Failures that may clear up on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            #[cfg(feature = "sqlite")]
            Self::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ) || matches!(e, sqlx::Error::Database(db) if db.message().contains("locked")),
            _ => false,
        }
    }
}

/// Open (and create if needed) the SQLite replica database.
#[cfg(feature = "sqlite")]
pub async fn open_sqlite(config: &StorageConfig) -> Result<sqlx::SqlitePool> {
    info!(path = %config.path, "Storage: sqlite");

    if let Some(parent) = std::path::Path::new(&config.path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", parent.display(), e)))?;
    }

    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(StorageError::Unavailable("down".to_string()).is_retryable());
        assert!(!StorageError::InvalidRecord("bad".to_string()).is_retryable());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_database_pool_timeout_is_retryable() {
        assert!(StorageError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StorageError::Database(sqlx::Error::RowNotFound).is_retryable());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_open_sqlite_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            path: dir.path().join("nested/replica.db").display().to_string(),
            ..StorageConfig::default()
        };

        let pool = open_sqlite(&config).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(dir.path().join("nested/replica.db").exists());
    }
}
