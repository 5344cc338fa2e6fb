//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - AES-256-GCM shard encryption and decryption (`encryption`)
//! - HKDF-based per-record and per-shard key derivation (`keys`)
//! - Master key sources: key files (`keyfile`) and Argon2id passphrases (`kdf`)

pub mod encryption;
pub mod kdf;
pub mod keyfile;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt_shard, derive_base_key, MasterKey, ...};
pub use encryption::{decrypt_shard, encrypt_shard, shard_aad, EncryptedShard};
pub use kdf::{
    derive_master_key_from_passphrase, generate_salt, load_or_create_passphrase_salt,
    Argon2Params, SALT_LEN,
};
pub use keyfile::{generate_master_keyfile, load_master_keyfile, load_or_generate_master_keyfile};
pub use keys::{
    derive_base_key, derive_shard_key, verification_tag, verify_base_key, DerivedKey, MasterKey,
};
