use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Transient upstream failure. Retryable; callers must not guess a value.
    #[error("History store unavailable: {0}")]
    StoreUnavailable(String),

    /// A record carried a createdAt that could not be parsed.
    #[error("Invalid timestamp on record {id}: {value}")]
    InvalidTimestamp { id: String, value: String },

    /// A stored JSON column on one record did not parse.
    #[error("Malformed record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen
                ) =>
            {
                CoreError::StoreUnavailable(err.to_string())
            }
            other => CoreError::Database(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
