use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Payload error: {0}")]
    Payload(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
