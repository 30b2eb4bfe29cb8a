//! Remote store errors.

use std::num::TryFromIntError;

use sqlx::{
    Error,
    error::{DatabaseError, ErrorKind},
};
use thiserror::Error;

/// Errors raised by remote store operations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// A row with the same unique key already exists.
    #[error("row already exists")]
    AlreadyExists,

    /// No row matched.
    #[error("row not found")]
    NotFound,

    /// A referenced row does not exist.
    #[error("related row not found")]
    InvalidReference,

    /// A required column was missing.
    #[error("missing required data")]
    MissingRequiredData,

    /// A row failed a check constraint.
    #[error("invalid data")]
    InvalidData,

    /// A value does not fit the column type.
    #[error("value out of range")]
    OutOfRange(#[from] TryFromIntError),

    /// The store could not be reached.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// Any other storage failure.
    #[error("storage error")]
    Sql(#[source] Error),
}

impl From<Error> for RemoteError {
    fn from(error: Error) -> Self {
        if matches!(error, Error::RowNotFound) {
            return Self::NotFound;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::AlreadyExists,
            Some(ErrorKind::ForeignKeyViolation) => Self::InvalidReference,
            Some(ErrorKind::NotNullViolation) => Self::MissingRequiredData,
            Some(ErrorKind::CheckViolation) => Self::InvalidData,
            Some(ErrorKind::Other | _) | None => match error {
                Error::Io(_) | Error::PoolTimedOut | Error::PoolClosed => {
                    Self::Unavailable(error.to_string())
                }
                error => Self::Sql(error),
            },
        }
    }
}
