//! Error types for live database access.

use std::time::Duration;

use schemasync_core::SyncError;

/// Errors raised while talking to a database or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A statement ran longer than the configured timeout.
    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    /// Model, planning or rendering error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A catalog value could not be decoded.
    #[error("Cannot decode column '{column}' of type {type_name}")]
    Decode {
        /// Column name.
        column: String,
        /// Driver type name.
        type_name: String,
    },

    /// The configured connection cannot be opened by this build.
    #[error("Unsupported connection: {0}")]
    UnsupportedConnection(String),

    /// Configuration file is unreadable or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (configuration, model or script files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Returns whether running the statement again may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_)
                | Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        )
    }
}

impl From<toml::de::Error> for DbError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for live database operations.
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(DbError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(DbError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!DbError::Config("missing url".into()).is_retryable());
    }

    #[test]
    fn test_sync_error_is_transparent() {
        let err: DbError = SyncError::InvalidModel("duplicate table".into()).into();
        assert_eq!(err.to_string(), "Invalid model: duplicate table");
    }
}
