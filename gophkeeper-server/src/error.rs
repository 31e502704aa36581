use thiserror::Error;
use tonic::Status;

/// Server-level error type covering all subsystems.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bad credentials")]
    BadCredentials,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("bad sign method")]
    BadSignMethod,

    #[error("expired token")]
    ExpiredToken,

    #[error("invalid token")]
    InvalidToken,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("user '{0}' already exists")]
    UserAlreadyExists(String),

    #[error("not found")]
    NotFound,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<gophkeeper_core::crypto::CryptoError> for ServerError {
    fn from(err: gophkeeper_core::crypto::CryptoError) -> Self {
        ServerError::Crypto(err.to_string())
    }
}

impl From<ServerError> for Status {
    fn from(err: ServerError) -> Self {
        match &err {
            ServerError::BadCredentials => Status::invalid_argument(err.to_string()),
            ServerError::InvalidCredentials => Status::unauthenticated(err.to_string()),
            ServerError::BadSignMethod
            | ServerError::ExpiredToken
            | ServerError::InvalidToken
            | ServerError::Unauthenticated(_) => Status::unauthenticated(err.to_string()),
            ServerError::UserAlreadyExists(_) => Status::already_exists(err.to_string()),
            ServerError::NotFound => Status::not_found(err.to_string()),
            ServerError::DeadlineExceeded => Status::deadline_exceeded(err.to_string()),
            ServerError::Database(_) | ServerError::Crypto(_) | ServerError::Internal(_) => {
                Status::internal(err.to_string())
            }
        }
    }
}

/// Convenience alias for server results.
pub type Result<T> = std::result::Result<T, ServerError>;
