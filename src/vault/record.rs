//! Record types persisted in the metadata store.
//!
//! Binary fields (`salt`, `verification_tag`) serialize as base64 strings
//! in JSON rather than raw byte arrays.  Every struct rejects unknown
//! fields so the metadata file has one closed, versioned shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::VaultError;

/// Opaque, immutable identifier of a stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// A fresh random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw 16 bytes, used as associated data when encrypting shards.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RecordId {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| VaultError::InvalidInput(format!("invalid record id '{s}': {e}")))
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Everything the vault knows about one stored secret, minus the secret.
///
/// Contains no plaintext and no key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultRecord {
    pub record_id: RecordId,

    /// The only entity allowed to retrieve or delete this record.
    pub owner_id: String,

    /// Free-text label such as "openai"; not secret.
    pub service_name: String,

    /// Per-record KDF salt, generated once at creation (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub salt: Vec<u8>,

    /// Shard file names in shard order.
    pub shard_refs: Vec<String>,

    /// Digest of the derived base key (base64 in JSON).
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub verification_tag: Vec<u8>,

    /// Informational only.
    pub created_at: DateTime<Utc>,
}

impl VaultRecord {
    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            record_id: self.record_id,
            service_name: self.service_name.clone(),
            created_at: self.created_at,
        }
    }
}

/// Metadata returned by `VaultService::list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub record_id: RecordId,
    pub service_name: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
