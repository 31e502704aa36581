use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha3::Sha3_512;
use zeroize::Zeroizing;

use super::{random_bytes, CryptoError, Result};
use crate::constants::{BLOB_KEY_LEN, NONCE_LEN, SALT_LEN};

/// A freshly sealed blob: the framed ciphertext that travels on the wire,
/// the salt the server stores next to it, and the derived key the client
/// may record in its catalog.
pub struct SealedResource {
    pub salt: Vec<u8>,
    pub key: Zeroizing<Vec<u8>>,
    pub data: Vec<u8>,
}

/// The result of opening a framed blob.
pub struct OpenedResource {
    pub key: Zeroizing<Vec<u8>>,
    pub plaintext: Vec<u8>,
}

/// Derive the per-blob AES-256-GCM key: HKDF-SHA3-512(ikm = master key,
/// salt = blob salt, info = empty, 32 bytes).
fn derive_blob_key(master_key: &[u8], salt: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if salt.len() != SALT_LEN {
        return Err(CryptoError::InvalidSaltLength {
            expected: SALT_LEN,
            got: salt.len(),
        });
    }

    let hk = Hkdf::<Sha3_512>::new(Some(salt), master_key);
    let mut key = Zeroizing::new(vec![0u8; BLOB_KEY_LEN]);
    hk.expand(&[], &mut key)
        .map_err(|e| CryptoError::HkdfDerive(e.to_string()))?;

    Ok(key)
}

/// Seal a plaintext under a master key.
///
/// Draws a fresh 64-byte blob salt and a fresh 96-bit nonce, derives the
/// per-blob key, and produces the stable framing
/// `uvarint(len(nonce)) || nonce || ciphertext-with-tag`.
pub fn seal(master_key: &[u8], plaintext: &[u8]) -> Result<SealedResource> {
    let salt = random_bytes(SALT_LEN)?;
    let key = derive_blob_key(master_key, &salt)?;
    let nonce = random_bytes(NONCE_LEN)?;

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &[],
            },
        )
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let mut data = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
    prost::encoding::encode_varint(nonce.len() as u64, &mut data);
    data.extend_from_slice(&nonce);
    data.extend_from_slice(&ciphertext);

    Ok(SealedResource { salt, key, data })
}

/// Open a framed blob sealed under `master_key` with the given blob salt.
///
/// Any mismatch in the authentication tag, including a single flipped bit
/// anywhere in the framing, fails with `Tampered`.
pub fn open(master_key: &[u8], salt: &[u8], framed: &[u8]) -> Result<OpenedResource> {
    let key = derive_blob_key(master_key, salt)?;

    let mut buf = framed;
    let nonce_len = prost::encoding::decode_varint(&mut buf)
        .map_err(|_| CryptoError::BadFraming("invalid nonce length prefix".to_string()))?
        as usize;

    if nonce_len == 0 || buf.len() < nonce_len {
        return Err(CryptoError::BadFraming(format!(
            "truncated frame: {} byte nonce declared, {} bytes remain",
            nonce_len,
            buf.len()
        )));
    }

    let (nonce, ciphertext) = buf.split_at(nonce_len);

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::Tampered)?;

    Ok(OpenedResource { key, plaintext })
}
