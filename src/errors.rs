use thiserror::Error;

/// All errors that can occur in the vault.
///
/// `NotFound` deliberately carries no record id: "no such record" and
/// "record owned by someone else" must be indistinguishable to callers.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Caller-facing taxonomy ---
    #[error("Record not found")]
    NotFound,

    #[error("Verification failed: wrong key or tampered shard")]
    VerificationFailed,

    #[error("Metadata store is corrupt: {0}")]
    CorruptMetadata(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Crypto errors ---
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Master key error: {0}")]
    MasterKey(String),

    // --- Config errors ---
    #[error("Config error: {0}")]
    Config(String),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience type alias for vault results.
pub type Result<T> = std::result::Result<T, VaultError>;
