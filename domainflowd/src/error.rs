use thiserror::Error;

use domainflow_api::limits::ValidationError;

/// Engine-wide error taxonomy. Processors return classified errors; the
/// worker loop decides retry vs terminal from the class, and the
/// orchestrator surfaces the rest.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient infrastructure failure; the job layer retries these.
    #[error("transient: {0}")]
    Transient(String),

    /// Unrecoverable mid-processing failure; fails the campaign.
    #[error("terminal: {0}")]
    Terminal(String),

    #[error("unauthorized: {0}")]
    Auth(String),
}

impl Error {
    pub fn retryable(&self) -> bool {
        matches!(self, Error::Transient(_))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Error::NotFound("row".into()),
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                Error::Conflict(db.to_string())
            }
            _ => Error::Transient(e.to_string()),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::InvalidRequest(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
