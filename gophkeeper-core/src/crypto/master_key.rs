use hmac::Hmac;
use sha3::Sha3_512;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{random_bytes, CryptoError, Result};
use crate::constants::{MASTER_KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};

/// A derived key together with the salt that produced it.
///
/// The key bytes are scrubbed from memory when the value is dropped. The salt
/// is not secret — it is persisted and travels to the server.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    pub key: Vec<u8>,
    #[zeroize(skip)]
    pub salt: Vec<u8>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material.
        f.debug_struct("Secret")
            .field("key", &"[redacted]")
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// Derive a key of `key_len` bytes from a passphrase and salt using
/// PBKDF2-HMAC-SHA3-512.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    iterations: u32,
    key_len: usize,
) -> Result<Vec<u8>> {
    if salt.len() < SALT_LEN {
        return Err(CryptoError::InvalidSaltLength {
            expected: SALT_LEN,
            got: salt.len(),
        });
    }

    let mut output = vec![0u8; key_len];
    pbkdf2::pbkdf2::<Hmac<Sha3_512>>(passphrase, salt, iterations, &mut output)
        .map_err(|e| CryptoError::Pbkdf2Derive(e.to_string()))?;

    Ok(output)
}

/// Generate a fresh master key from a passphrase.
///
/// Draws a 64-byte salt and runs the slow KDF with the default iteration
/// count. The salt must be preserved; without it the account is lost.
pub fn generate_master_key(passphrase: &[u8]) -> Result<Secret> {
    let salt = random_bytes(SALT_LEN)?;
    let key = derive_key(passphrase, &salt, PBKDF2_ITERATIONS, MASTER_KEY_LEN)?;
    Ok(Secret { key, salt })
}

/// Re-derive the master key from a passphrase and a stored salt.
///
/// Deterministic: the same inputs always yield the same key.
pub fn recover_master_key(passphrase: &[u8], salt: &[u8]) -> Result<Secret> {
    let key = derive_key(passphrase, salt, PBKDF2_ITERATIONS, MASTER_KEY_LEN)?;
    Ok(Secret {
        key,
        salt: salt.to_vec(),
    })
}
