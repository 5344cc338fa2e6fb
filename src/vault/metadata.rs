//! Durable record metadata.
//!
//! The whole store is one JSON document:
//!
//! ```text
//! { "version": 1, "records": { "<record id>": VaultRecord, ... } }
//! ```
//!
//! Every mutation is a read-modify-write of the full document followed by
//! an atomic temp-file + rename, so a crash never leaves a half-written
//! record behind.  A file that cannot be parsed is moved aside to
//! `<name>.corrupt-<unix seconds>` and the store restarts empty; losing
//! the index is preferable to refusing every operation.
//!
//! Callers must serialize mutations; `VaultService` does this with its
//! metadata lock.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::files;
use super::record::{RecordId, VaultRecord};
use super::retry::RetryPolicy;
use crate::errors::{Result, VaultError};

/// Current metadata document version.
pub const CURRENT_VERSION: u32 = 1;

/// All records keyed by id.
pub type RecordMap = BTreeMap<RecordId, VaultRecord>;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetadataFile {
    version: u32,
    records: RecordMap,
}

/// File-backed map from record id to record metadata.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    retry: RetryPolicy,
}

impl MetadataStore {
    /// Open the store at `path`, creating an empty file on first run.
    ///
    /// A corrupt file is quarantined here as well, so the warning shows up
    /// at startup rather than on the first unlucky request.
    pub async fn open(path: PathBuf, retry: RetryPolicy) -> Result<Self> {
        let store = Self { path, retry };

        if !store.path.exists() {
            warn!(
                path = %store.path.display(),
                "metadata file not found, initializing empty store"
            );
            store.save(&RecordMap::new()).await?;
        } else {
            let records = store.load().await?;
            debug!(path = %store.path.display(), records = records.len(), "metadata store opened");
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record.
    ///
    /// Missing or unparseable files yield an empty map (after a warning);
    /// other I/O failures are returned.
    pub async fn load(&self) -> Result<RecordMap> {
        let data = match self.retry.run("read metadata", || tokio::fs::read(&self.path)).await {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(
                    path = %self.path.display(),
                    "metadata file disappeared, treating store as empty"
                );
                return Ok(RecordMap::new());
            }
            Err(err) => return Err(err.into()),
        };

        match parse(&data) {
            Ok(records) => Ok(records),
            Err(err) => {
                self.quarantine(&err).await?;
                let empty = RecordMap::new();
                self.save(&empty).await?;
                Ok(empty)
            }
        }
    }

    /// Replace the whole document with `records`.
    pub async fn save(&self, records: &RecordMap) -> Result<()> {
        let doc = MetadataFileRef {
            version: CURRENT_VERSION,
            records,
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| VaultError::Serialization(format!("metadata: {e}")))?;

        self.retry
            .run("write metadata", || files::write_atomic(&self.path, &bytes))
            .await?;
        Ok(())
    }

    /// Insert a new record.
    pub async fn put(&self, record: VaultRecord) -> Result<()> {
        let mut records = self.load().await?;
        records.insert(record.record_id, record);
        self.save(&records).await
    }

    /// Fetch one record.
    pub async fn get(&self, record_id: &RecordId) -> Result<VaultRecord> {
        self.load()
            .await?
            .remove(record_id)
            .ok_or(VaultError::NotFound)
    }

    /// Remove one record, returning it if it was present.
    pub async fn remove(&self, record_id: &RecordId) -> Result<Option<VaultRecord>> {
        let mut records = self.load().await?;
        let removed = records.remove(record_id);
        if removed.is_some() {
            self.save(&records).await?;
        }
        Ok(removed)
    }

    /// All records belonging to `owner_id`, oldest first.
    pub async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<VaultRecord>> {
        let mut owned: Vec<VaultRecord> = self
            .load()
            .await?
            .into_values()
            .filter(|r| r.owner_id == owner_id)
            .collect();

        owned.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        Ok(owned)
    }

    /// Move an unreadable file aside so it is preserved for inspection.
    async fn quarantine(&self, err: &VaultError) -> Result<()> {
        let backup = PathBuf::from(format!(
            "{}.corrupt-{}",
            self.path.display(),
            Utc::now().timestamp()
        ));
        warn!(
            path = %self.path.display(),
            backup = %backup.display(),
            error = %err,
            "metadata file is corrupt, moved aside and reinitialized empty"
        );
        tokio::fs::rename(&self.path, &backup).await?;
        Ok(())
    }
}

/// Borrowing twin of `MetadataFile` so saving does not clone every record.
#[derive(Serialize)]
struct MetadataFileRef<'a> {
    version: u32,
    records: &'a RecordMap,
}

/// Parse and validate a metadata document.
fn parse(data: &[u8]) -> Result<RecordMap> {
    let doc: MetadataFile = serde_json::from_slice(data)
        .map_err(|e| VaultError::CorruptMetadata(format!("metadata JSON: {e}")))?;

    if doc.version != CURRENT_VERSION {
        return Err(VaultError::CorruptMetadata(format!(
            "unsupported version {}, expected {CURRENT_VERSION}",
            doc.version
        )));
    }

    if let Some((key, record)) = doc.records.iter().find(|(k, r)| **k != r.record_id) {
        return Err(VaultError::CorruptMetadata(format!(
            "entry {key} holds record {}",
            record.record_id
        )));
    }

    Ok(doc.records)
}
