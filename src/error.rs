//! Error types for persistence operations.
//!
//! Provides a unified error type covering declarative-mapping validation,
//! store access, instance-state preconditions, migration execution, and
//! connection establishment.

use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum OrmError {
    /// Declarative entity mapping is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store rejected a statement (constraint violation, lost
    /// connectivity, malformed SQL).
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A write was attempted against an instance the store cannot address.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Operation invoked on an instance missing a required identity value.
    #[error("state error: {0}")]
    State(String),

    /// A migration's up or down action failed mid-execution.
    #[error("migration '{name}' failed")]
    Migration {
        /// Name of the migration that failed.
        name: String,
        /// The underlying failure.
        #[source]
        source: Box<OrmError>,
    },

    /// Connection establishment exhausted its retry budget.
    #[error("unable to connect to the database after {attempts} attempt(s)")]
    Connection {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The last connection failure.
        #[source]
        source: rusqlite::Error,
    },
}

/// Convenience alias for results with [`OrmError`].
pub type Result<T> = std::result::Result<T, OrmError>;
