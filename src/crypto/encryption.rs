//! AES-256-GCM authenticated encryption of individual shards.
//!
//! Each call to `encrypt_shard` generates a fresh random 12-byte nonce.
//! The 16-byte tag is kept detached so the on-disk layout is explicit:
//!
//! ```text
//! [ 12-byte nonce | 16-byte auth tag | ciphertext ]
//! ```
//!
//! The associated data binds a shard to its record and position, so a
//! shard file copied into another slot fails verification.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};

use crate::errors::{Result, VaultError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Size of the AES-256-GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// One encrypted shard as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedShard {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedShard {
    /// Serialize as `nonce || tag || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + TAG_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse bytes produced by `to_bytes`.
    ///
    /// Input too short to hold a nonce and tag cannot verify, so it is
    /// reported as `VerificationFailed` rather than a format error.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::VerificationFailed);
        }

        let (nonce, rest) = data.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        Ok(Self {
            nonce: nonce.try_into().map_err(|_| VaultError::VerificationFailed)?,
            tag: tag.try_into().map_err(|_| VaultError::VerificationFailed)?,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Associated data for shard `index` of the record identified by `record_id`.
pub fn shard_aad(record_id: &[u8], index: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(record_id.len() + 4);
    aad.extend_from_slice(record_id);
    aad.extend_from_slice(&index.to_be_bytes());
    aad
}

/// Encrypt `plaintext` with a 32-byte shard key.
pub fn encrypt_shard(key: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<EncryptedShard> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::EncryptionFailed(format!("invalid key length: {e}")))?;

    // Fresh random nonce for every call.
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, aad, &mut buffer)
        .map_err(|e| VaultError::EncryptionFailed(format!("encryption error: {e}")))?;

    Ok(EncryptedShard {
        nonce: nonce.into(),
        tag: tag.into(),
        ciphertext: buffer,
    })
}

/// Decrypt a shard produced by `encrypt_shard`.
///
/// Fails closed: on any tag mismatch the partially decrypted buffer is
/// wiped and only `VerificationFailed` is returned.
pub fn decrypt_shard(key: &[u8], aad: &[u8], shard: &EncryptedShard) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| VaultError::VerificationFailed)?;

    let nonce = Nonce::from_slice(&shard.nonce);
    let tag = GenericArray::from_slice(&shard.tag);

    let mut buffer = shard.ciphertext.clone();
    match cipher.decrypt_in_place_detached(nonce, aad, &mut buffer, tag) {
        Ok(()) => Ok(buffer),
        Err(_) => {
            zeroize::Zeroize::zeroize(&mut buffer);
            Err(VaultError::VerificationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_nonce_tag_ciphertext() {
        let shard = encrypt_shard(&[1u8; 32], b"aad", b"hello").unwrap();
        let bytes = shard.to_bytes();

        assert_eq!(bytes.len(), NONCE_LEN + TAG_LEN + 5);
        assert_eq!(&bytes[..NONCE_LEN], &shard.nonce);
        assert_eq!(&bytes[NONCE_LEN..NONCE_LEN + TAG_LEN], &shard.tag);
        assert_eq!(EncryptedShard::from_bytes(&bytes).unwrap(), shard);
    }

    #[test]
    fn empty_shard_encrypts_to_tag_only() {
        let key = [2u8; 32];
        let shard = encrypt_shard(&key, b"", b"").unwrap();
        assert!(shard.ciphertext.is_empty());
        assert_eq!(decrypt_shard(&key, b"", &shard).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn short_input_is_verification_failure() {
        let result = EncryptedShard::from_bytes(&[0u8; NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(result, Err(VaultError::VerificationFailed)));
    }

    #[test]
    fn mismatched_aad_fails() {
        let key = [3u8; 32];
        let shard = encrypt_shard(&key, &shard_aad(b"record", 0), b"secret").unwrap();
        let result = decrypt_shard(&key, &shard_aad(b"record", 1), &shard);
        assert!(matches!(result, Err(VaultError::VerificationFailed)));
    }

    #[test]
    fn flipped_tag_bit_fails() {
        let key = [4u8; 32];
        let mut shard = encrypt_shard(&key, b"", b"secret").unwrap();
        shard.tag[0] ^= 0x01;
        assert!(matches!(
            decrypt_shard(&key, b"", &shard),
            Err(VaultError::VerificationFailed)
        ));
    }

    #[test]
    fn invalid_key_length_is_rejected() {
        assert!(matches!(
            encrypt_shard(&[0u8; 16], b"", b"x"),
            Err(VaultError::EncryptionFailed(_))
        ));
    }
}
