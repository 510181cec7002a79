// Error types shared by the store and the reporting engine.
//
// Store-level failures (connection loss, malformed rows) surface as a single
// `Store` variant: the reporting engine performs no retries and leaves
// user-visible messaging to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The movement store could not be read or written.
    #[error("movement store unavailable: {0}")]
    Store(#[from] rusqlite::Error),

    /// A CSV import file could not be read or parsed.
    #[error("import failed: {0}")]
    Import(#[from] csv::Error),

    /// Category names are unique per store.
    #[error("category '{0}' already exists")]
    DuplicateCategory(String),

    /// Categories cannot be deleted while movements reference them.
    #[error("category {0} is referenced by existing movements")]
    CategoryInUse(i64),

    #[error("category {0} not found")]
    CategoryNotFound(i64),

    #[error("movement {0} not found")]
    MovementNotFound(i64),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
