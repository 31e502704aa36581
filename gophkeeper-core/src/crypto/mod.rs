pub mod envelope;
pub mod master_key;

use thiserror::Error;

use crate::constants::SALT_LEN;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("AES-GCM encryption failed: {0}")]
    Encrypt(String),

    #[error("ciphertext or tag has been tampered with")]
    Tampered,

    #[error("HKDF derivation failed: {0}")]
    HkdfDerive(String),

    #[error("PBKDF2 derivation failed: {0}")]
    Pbkdf2Derive(String),

    #[error("Invalid salt length: expected {expected}, got {got}")]
    InvalidSaltLength { expected: usize, got: usize },

    #[error("not enough entropy from the platform random source")]
    InsufficientEntropy,

    #[error("Invalid envelope framing: {0}")]
    BadFraming(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Fill a fresh buffer with OS randomness.
///
/// A short or failed read maps to `InsufficientEntropy`: a blob sealed with a
/// predictable salt or nonce is unrecoverable damage, so we refuse up front.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    getrandom::getrandom(&mut buf).map_err(|_| CryptoError::InsufficientEntropy)?;
    Ok(buf)
}

/// Draw a fresh 64-byte salt.
pub fn random_salt() -> Result<Vec<u8>> {
    random_bytes(SALT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        let b = random_bytes(64).unwrap();
        assert_eq!(b.len(), 64);
    }

    #[test]
    fn test_random_salt_not_constant() {
        let a = random_salt().unwrap();
        let b = random_salt().unwrap();
        assert_ne!(a, b);
    }
}
