//! Error types for sqlset

use thiserror::Error;

/// Errors raised by the mapping layer and the entity sets.
///
/// Store failures are carried verbatim in [`Error::Store`] so callers can
/// inspect the native SQLite error (constraint violations, syntax errors in
/// predicate text, and so on).
#[derive(Debug, Error)]
pub enum Error {
    /// A record type could not be turned into a table definition.
    #[error("invalid entity definition for '{type_name}': {reason}")]
    Definition { type_name: String, reason: String },

    /// Deleting an entity whose `RowId` has never been assigned.
    #[error("entity of type '{0}' has no RowId assigned")]
    MissingRowId(&'static str),

    /// No entity set is registered for the requested type.
    #[error("no entity set registered for type '{0}'")]
    UnregisteredType(String),

    /// Bulk insert was given nothing to insert.
    #[error("bulk insert requires at least one entity")]
    EmptyRange,

    /// Error reported by SQLite.
    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    /// A parameter object could not be serialized into named values.
    #[error("failed to serialize parameters: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The owning context has already been closed.
    #[error("the database connection has been closed")]
    Closed,

    /// The blocking task running a store call panicked or was aborted.
    #[error("background store task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl Error {
    /// Returns the underlying SQLite error, if this is a store error.
    pub fn as_store(&self) -> Option<&rusqlite::Error> {
        match self {
            Error::Store(e) => Some(e),
            _ => None,
        }
    }

    /// True when SQLite rejected the statement because of a constraint
    /// (unique index, CHECK, NOT NULL).
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.as_store().and_then(|e| e.sqlite_error_code()),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
