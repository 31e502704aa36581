/// Salt length in bytes for key salts, auth salts, and blob salts
/// (the SHA3-512 digest size).
pub const SALT_LEN: usize = 64;

/// Master key length in bytes.
pub const MASTER_KEY_LEN: usize = 64;

/// PBKDF2 iterations for master key derivation.
pub const PBKDF2_ITERATIONS: u32 = 1_000_000;

/// Per-blob AES-256-GCM key length in bytes.
pub const BLOB_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
