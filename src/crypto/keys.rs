//! Key derivation helpers using HKDF-SHA256.
//!
//! From the process-held master key and a record's persisted salt we derive:
//! - A **base key** bound to the record's owner and service name.
//! - One **subkey** per shard index, expanded from the base key.
//! - A **verification tag** over the base key, stored in metadata so a
//!   wrong master key is detected before any shard is decrypted.
//!
//! Derivation is a pure function of its inputs.  Nothing time-based or
//! freshly random enters it, so a record can be re-derived after a restart
//! from its stored salt alone.

use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::kdf::SALT_LEN;
use crate::errors::{Result, VaultError};

/// Length of the master key and all derived keys (256 bits).
pub const KEY_LEN: usize = 32;

/// Length of the verification tag (SHA-256 output).
pub const VERIFICATION_TAG_LEN: usize = 32;

const RECORD_INFO: &[u8] = b"shardvault-record-v1";
const SHARD_INFO: &[u8] = b"shardvault-shard-v1:";
const VERIFY_DOMAIN: &[u8] = b"shardvault-verify-v1";

/// A derived 256-bit key that is wiped when dropped.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Derive the base key for a record.
///
/// `salt` must be exactly the value persisted in the record.  Any other
/// length is rejected rather than padded or truncated.
pub fn derive_base_key(
    master_key: &MasterKey,
    owner_id: &str,
    service_name: &str,
    salt: &[u8],
) -> Result<DerivedKey> {
    if salt.len() != SALT_LEN {
        return Err(VaultError::InvalidInput(format!(
            "salt must be exactly {SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }

    // Length-prefix each field so ("ab", "c") and ("a", "bc") differ.
    let mut info = Vec::with_capacity(RECORD_INFO.len() + 8 + owner_id.len() + service_name.len());
    info.extend_from_slice(RECORD_INFO);
    for field in [owner_id, service_name] {
        let len = u32::try_from(field.len())
            .map_err(|_| VaultError::InvalidInput("identifier too long".into()))?;
        info.extend_from_slice(&len.to_be_bytes());
        info.extend_from_slice(field.as_bytes());
    }

    let key = hkdf_derive(Some(salt), master_key.as_bytes(), &info);
    info.zeroize();
    key
}

/// Derive the subkey for shard `index` from a record's base key.
///
/// Every index yields an independent key; knowing one shard key reveals
/// nothing about the others.
pub fn derive_shard_key(base_key: &[u8; KEY_LEN], index: u32) -> Result<DerivedKey> {
    let mut info = Vec::with_capacity(SHARD_INFO.len() + 4);
    info.extend_from_slice(SHARD_INFO);
    info.extend_from_slice(&index.to_be_bytes());
    hkdf_derive(None, base_key, &info)
}

/// Digest of the base key stored alongside the record.
pub fn verification_tag(base_key: &[u8; KEY_LEN]) -> [u8; VERIFICATION_TAG_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(VERIFY_DOMAIN);
    hasher.update(base_key);
    hasher.finalize().into()
}

/// Check a re-derived base key against the stored tag in constant time.
pub fn verify_base_key(base_key: &[u8; KEY_LEN], expected_tag: &[u8]) -> Result<()> {
    let actual = verification_tag(base_key);
    if actual.as_slice().ct_eq(expected_tag).into() {
        Ok(())
    } else {
        Err(VaultError::VerificationFailed)
    }
}

/// Internal helper: HKDF-SHA256 extract (with optional salt) then expand.
fn hkdf_derive(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> Result<DerivedKey> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(info, okm.as_mut_slice())
        .map_err(|e| VaultError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A wrapper around the 32-byte master key that automatically zeroes
/// its memory when dropped.
///
/// Debug output never shows the key bytes.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Create a `MasterKey` from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            VaultError::MasterKey(format!(
                "master key must be exactly {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Access the raw key bytes (e.g. to pass to HKDF).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterKey {
        MasterKey::new([0x42; KEY_LEN])
    }

    #[test]
    fn base_key_is_deterministic() {
        let salt = [9u8; SALT_LEN];
        let k1 = derive_base_key(&master(), "1", "openai", &salt).unwrap();
        let k2 = derive_base_key(&master(), "1", "openai", &salt).unwrap();
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn base_key_depends_on_every_input() {
        let salt = [9u8; SALT_LEN];
        let base = derive_base_key(&master(), "1", "openai", &salt).unwrap();

        let other_owner = derive_base_key(&master(), "2", "openai", &salt).unwrap();
        let other_service = derive_base_key(&master(), "1", "stripe", &salt).unwrap();
        let other_salt = derive_base_key(&master(), "1", "openai", &[8u8; SALT_LEN]).unwrap();
        let other_master =
            derive_base_key(&MasterKey::new([0x43; KEY_LEN]), "1", "openai", &salt).unwrap();

        for other in [other_owner, other_service, other_salt, other_master] {
            assert_ne!(*base, *other);
        }
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let salt = [1u8; SALT_LEN];
        let a = derive_base_key(&master(), "ab", "c", &salt).unwrap();
        let b = derive_base_key(&master(), "a", "bc", &salt).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn wrong_salt_length_is_rejected() {
        for len in [0, 16, SALT_LEN + 1] {
            let salt = vec![0u8; len];
            let result = derive_base_key(&master(), "1", "openai", &salt);
            assert!(matches!(result, Err(VaultError::InvalidInput(_))));
        }
    }

    #[test]
    fn shard_keys_are_distinct_per_index() {
        let base = derive_base_key(&master(), "1", "openai", &[3u8; SALT_LEN]).unwrap();
        let keys: Vec<_> = (0..8)
            .map(|i| *derive_shard_key(&base, i).unwrap())
            .collect();

        for (i, a) in keys.iter().enumerate() {
            assert_ne!(a, &*base);
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn verification_tag_matches_only_its_key() {
        let base = derive_base_key(&master(), "1", "openai", &[3u8; SALT_LEN]).unwrap();
        let tag = verification_tag(&base);
        assert!(verify_base_key(&base, &tag).is_ok());

        let other = derive_base_key(&master(), "1", "openai", &[4u8; SALT_LEN]).unwrap();
        assert!(matches!(
            verify_base_key(&other, &tag),
            Err(VaultError::VerificationFailed)
        ));
    }

    #[test]
    fn master_key_debug_is_redacted() {
        let rendered = format!("{:?}", master());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("66"));
    }
}
