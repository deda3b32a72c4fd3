use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A film, user, catalog entry or relation edge does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The friendship state machine does not allow the operation.
    #[error("{0}")]
    InvalidState(String),

    /// Input rejected before it reaches the store.
    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn user_not_found(id: u64) -> Self {
        Error::NotFound(format!("User with id {} not found", id))
    }

    pub fn film_not_found(id: u64) -> Self {
        Error::NotFound(format!("Film with id {} not found", id))
    }
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Storage(e),
        }
    }
}

/// Aborts the surrounding sled transaction with a domain error.
pub(crate) fn abort<T>(err: Error) -> std::result::Result<T, ConflictableTransactionError<Error>> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Encoding failures inside a transaction abort it.
pub(crate) fn encode<T: serde::Serialize>(
    value: &T,
) -> std::result::Result<Vec<u8>, ConflictableTransactionError<Error>> {
    bincode::serialize(value).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> std::result::Result<T, ConflictableTransactionError<Error>> {
    bincode::deserialize(bytes).map_err(|e| ConflictableTransactionError::Abort(e.into()))
}
