//! Error types for index operations.

use thiserror::Error;

/// Name of the uniqueness constraint PostgreSQL generates for `torrents.info_hash`.
const INFO_HASH_UNIQUE_CONSTRAINT: &str = "torrents_info_hash_key";

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors surfaced by the torrent index.
///
/// Malformed ingestion input (invalid text, zero size, duplicate hash) is never an error;
/// those calls succeed with an [`IngestOutcome`](super::IngestOutcome) describing the skip.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Invalid schema name {0:?}: expected a lowercase SQL identifier")]
    InvalidSchemaName(String),

    #[error("Schema setup failed: {0}")]
    Schema(String),

    #[error("Schema setup failed during {context}: {source}")]
    SchemaSetup {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Invalid time specification: {0}")]
    InvalidTimeSpec(String),

    #[error("Database error during {context}: {source}")]
    Database {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl IndexError {
    /// Wraps an engine error with the operation it interrupted.
    pub(crate) fn database(context: &'static str) -> impl FnOnce(sqlx::Error) -> IndexError {
        move |source| IndexError::Database { context, source }
    }

    pub(crate) fn schema_setup(context: &'static str) -> impl FnOnce(sqlx::Error) -> IndexError {
        move |source| IndexError::SchemaSetup { context, source }
    }

    /// Whether the caller supplied invalid arguments (as opposed to an engine failure).
    pub fn is_client_error(&self) -> bool {
        matches!(self, IndexError::Query(_) | IndexError::InvalidTimeSpec(_))
    }
}

/// Whether `err` is the engine rejecting a second torrent with an already stored info hash.
pub(crate) fn is_duplicate_info_hash(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db_err.constraint() == Some(INFO_HASH_UNIQUE_CONSTRAINT)
        }
        _ => false,
    }
}
