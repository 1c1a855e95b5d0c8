use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Not produced by the store itself: its lookups answer `Ok(None)`.
    /// Available to callers that turn a missing row into an error.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Library worker stopped")]
    WorkerStopped,
}

impl StoreError {
    /// Whether the error aborts startup rather than a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Schema(_) | StoreError::Config(_))
    }
}

#[cfg(feature = "database-errors")]
impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::ConstraintViolation(
                    message.unwrap_or_else(|| code.to_string()),
                )
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
