//! Error types for schema synchronization.

/// Errors that can occur while reading, comparing, planning or applying a model.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The live database could not be read into a model.
    #[error("Failed to read model: {0}")]
    ModelRead(String),

    /// A change cannot be expressed on the target platform.
    #[error("Unsupported change on {platform}: {change} ({reason})")]
    UnsupportedChange {
        /// Description of the change.
        change: String,
        /// Platform name.
        platform: String,
        /// Why the platform cannot express it.
        reason: String,
    },

    /// An identifier (given or generated) exceeds the platform limit.
    #[error("Identifier '{identifier}' is {length} characters long, {platform} allows {max}")]
    IdentifierTooLong {
        /// The offending identifier.
        identifier: String,
        /// Its length in characters.
        length: usize,
        /// The platform maximum.
        max: usize,
        /// Platform name.
        platform: String,
    },

    /// A statement was rejected by the database.
    #[error("Statement failed: {message}")]
    StatementExecution {
        /// The statement text.
        statement: String,
        /// Driver message.
        message: String,
        /// Whether retrying may succeed (e.g. timeouts).
        retryable: bool,
    },

    /// A constraint or trigger could not be re-enabled after a batch.
    #[error("Failed to re-enable '{constraint}' on '{table}': {message}")]
    ConstraintReenable {
        /// Table owning the constraint.
        table: String,
        /// Constraint or trigger name.
        constraint: String,
        /// Driver message.
        message: String,
    },

    /// The model violates a structural invariant.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// A change does not apply to the model snapshot it was replayed on.
    #[error("Invalid model state: {0}")]
    InvalidState(String),

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (model or script files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<SyncError>),
}

impl SyncError {
    /// Builds an [`SyncError::InvalidState`] for a missing table.
    pub(crate) fn missing_table(table: &str) -> Self {
        Self::InvalidState(format!("Table '{table}' does not exist"))
    }

    /// Builds an [`SyncError::InvalidState`] for a missing column.
    pub(crate) fn missing_column(table: &str, column: &str) -> Self {
        Self::InvalidState(format!(
            "Column '{column}' does not exist in table '{table}'"
        ))
    }
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
