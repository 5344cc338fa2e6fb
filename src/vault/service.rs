//! High-level vault operations.
//!
//! `VaultService` ties the crypto layer, the sharder, the shard files and
//! the metadata store together behind four operations: `store`,
//! `retrieve`, `delete` and `list`.  Construct one per data directory and
//! share it (for example in an `Arc`); it holds no global state.
//!
//! Security note: secrets are split N-of-N.  All shards are needed to
//! rebuild a secret, so the split adds no redundancy and no security
//! beyond per-shard authenticated encryption.  It only raises the number
//! of files an attacker must obtain.

use std::collections::HashSet;
use std::sync::{Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::metadata::MetadataStore;
use super::record::{RecordId, RecordSummary, VaultRecord};
use super::retry::RetryPolicy;
use super::sharder;
use super::shards::ShardStore;
use crate::config::VaultSettings;
use crate::crypto::keys::{KEY_LEN, VERIFICATION_TAG_LEN};
use crate::crypto::{
    decrypt_shard, derive_base_key, derive_shard_key, encrypt_shard, generate_salt, shard_aad,
    verification_tag, verify_base_key, EncryptedShard, MasterKey, SALT_LEN,
};
use crate::errors::{Result, VaultError};

/// Maximum length of owner ids and service names, in bytes.
const MAX_LABEL_LEN: usize = 256;

/// Outcome of a `reconcile` sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Shard (or temp) files removed because no record references them.
    pub orphaned_shards_removed: usize,
    /// Records with at least one shard file missing; these cannot be retrieved.
    pub records_missing_shards: Vec<RecordId>,
}

/// Records whose shards are being written but whose metadata is not
/// committed yet.  `reconcile` must leave their files alone.
type PendingSet = StdMutex<HashSet<RecordId>>;

/// Registers a record in the pending set until dropped.
///
/// Dropping happens on success, on error and when the owning `store`
/// future is cancelled, so an abandoned store never shields its files
/// from `reconcile`.
struct PendingGuard<'a> {
    pending: &'a PendingSet,
    record_id: RecordId,
}

impl<'a> PendingGuard<'a> {
    fn register(pending: &'a PendingSet, record_id: RecordId) -> Self {
        lock_pending(pending).insert(record_id);
        Self { pending, record_id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.record_id);
    }
}

/// The set is only touched in short, non-panicking sections.
fn lock_pending(pending: &PendingSet) -> MutexGuard<'_, HashSet<RecordId>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The vault handle.  Create one with `VaultService::open`.
pub struct VaultService {
    settings: VaultSettings,
    master_key: MasterKey,
    shards: ShardStore,
    /// Serializes every metadata read-modify-write.
    metadata: Mutex<MetadataStore>,
    pending: PendingSet,
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService")
            .field("data_dir", &self.settings.data_dir)
            .field("shard_count", &self.settings.shard_count)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl VaultService {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// Open (or initialize) the vault described by `settings`.
    ///
    /// Invalid settings are the only startup failure besides I/O: a vault
    /// with a bad shard count is refused here rather than at first use.
    pub async fn open(settings: VaultSettings, master_key: MasterKey) -> Result<Self> {
        settings.validate()?;

        let retry = RetryPolicy::new(settings.io_retry_attempts, settings.io_retry_backoff());

        super::files::create_private_dir(&settings.data_dir).await?;
        let shards = ShardStore::open(settings.shard_path(), retry).await?;
        let metadata = MetadataStore::open(settings.metadata_path(), retry).await?;

        info!(
            data_dir = %settings.data_dir.display(),
            shard_count = settings.shard_count,
            "vault opened"
        );

        Ok(Self {
            settings,
            master_key,
            shards,
            metadata: Mutex::new(metadata),
            pending: StdMutex::new(HashSet::new()),
        })
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Encrypt and store `secret` for `owner_id`, returning its new id.
    ///
    /// Shard files are written first; the metadata entry is written last
    /// and is the commit point.  If anything fails before the commit the
    /// written shards are removed on a best-effort basis, and `reconcile`
    /// removes whatever is left, including the files of a store whose
    /// future was dropped by a caller's timeout.
    pub async fn store(
        &self,
        owner_id: &str,
        service_name: &str,
        secret: &[u8],
    ) -> Result<RecordId> {
        validate_label("owner id", owner_id)?;
        validate_label("service name", service_name)?;
        self.check_secret_len(secret)?;

        let record_id = RecordId::new();
        let salt = generate_salt();
        let base_key = derive_base_key(&self.master_key, owner_id, service_name, &salt)?;

        // Encrypt everything before touching the disk.
        let encrypted = sharder::split(secret, self.settings.shard_count)
            .iter()
            .enumerate()
            .map(|(i, piece)| encrypt_piece(&base_key, &record_id, i, piece))
            .collect::<Result<Vec<_>>>()?;

        let record = VaultRecord {
            record_id,
            owner_id: owner_id.to_string(),
            service_name: service_name.to_string(),
            salt: salt.to_vec(),
            shard_refs: (0..encrypted.len())
                .map(|i| ShardStore::file_name(&record_id, shard_index(i)))
                .collect(),
            verification_tag: verification_tag(&base_key).to_vec(),
            created_at: Utc::now(),
        };

        let guard = PendingGuard::register(&self.pending, record_id);
        let outcome = self.commit(record, &encrypted).await;
        if let Err(err) = &outcome {
            warn!(record_id = %record_id, error = %err, "store failed, discarding shards");
            self.discard_shards(&record_id, encrypted.len()).await;
        }
        drop(guard);
        outcome?;

        info!(record_id = %record_id, service = service_name, "secret stored");
        Ok(record_id)
    }

    /// Decrypt and return the secret stored under `record_id`.
    ///
    /// A record that does not exist and a record owned by someone else
    /// both produce `NotFound`, and both are decided before any key
    /// derivation or decryption happens.
    pub async fn retrieve(
        &self,
        owner_id: &str,
        record_id: &RecordId,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let (record, blobs) = {
            let metadata = self.metadata.lock().await;
            let record = metadata.get(record_id).await?;
            if !owned_by(&record, owner_id) {
                return Err(VaultError::NotFound);
            }
            self.check_layout(&record)?;

            let mut blobs = Vec::with_capacity(record.shard_refs.len());
            for name in &record.shard_refs {
                blobs.push(self.shards.read(name).await?);
            }
            (record, blobs)
        };

        let base_key = derive_base_key(
            &self.master_key,
            &record.owner_id,
            &record.service_name,
            &record.salt,
        )?;
        verify_base_key(&base_key, &record.verification_tag)?;

        let mut pieces = Vec::with_capacity(blobs.len());
        for (i, blob) in blobs.iter().enumerate() {
            let index = shard_index(i);
            let key = derive_shard_key(&base_key, index)?;
            let aad = shard_aad(record_id.as_bytes(), index);
            match decrypt_shard(key.as_slice(), &aad, blob) {
                Ok(piece) => pieces.push(Zeroizing::new(piece)),
                Err(err) => {
                    warn!(record_id = %record_id, shard = index, "shard failed verification");
                    return Err(err);
                }
            }
        }

        debug!(record_id = %record_id, "secret retrieved");
        Ok(sharder::join(&pieces))
    }

    /// Delete a record and all of its shard files.
    ///
    /// Returns `false` when there was nothing the caller may delete.
    pub async fn delete(&self, owner_id: &str, record_id: &RecordId) -> Result<bool> {
        let metadata = self.metadata.lock().await;
        let record = match metadata.get(record_id).await {
            Ok(record) => record,
            Err(VaultError::NotFound) => return Ok(false),
            Err(err) => return Err(err),
        };
        if !owned_by(&record, owner_id) {
            return Ok(false);
        }

        // Remove by canonical name so a damaged ref can never point elsewhere.
        let count = record.shard_refs.len().max(self.settings.shard_count);
        for i in 0..count {
            self.shards
                .remove(&ShardStore::file_name(record_id, shard_index(i)))
                .await?;
        }
        metadata.remove(record_id).await?;

        info!(record_id = %record_id, "secret deleted");
        Ok(true)
    }

    /// Metadata of every record owned by `owner_id`, oldest first.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<RecordSummary>> {
        let metadata = self.metadata.lock().await;
        let records = metadata.list_by_owner(owner_id).await?;
        Ok(records.iter().map(VaultRecord::summary).collect())
    }

    /// Replace a secret: delete the old record, then store the new value
    /// under the same service name.  The record id changes.
    pub async fn rotate(
        &self,
        owner_id: &str,
        record_id: &RecordId,
        new_secret: &[u8],
    ) -> Result<RecordId> {
        // Refuse before the old record is gone.
        self.check_secret_len(new_secret)?;

        let service_name = {
            let metadata = self.metadata.lock().await;
            let record = metadata.get(record_id).await?;
            if !owned_by(&record, owner_id) {
                return Err(VaultError::NotFound);
            }
            record.service_name
        };

        if !self.delete(owner_id, record_id).await? {
            return Err(VaultError::NotFound);
        }
        self.store(owner_id, &service_name, new_secret).await
    }

    /// Sweep the shard directory against the metadata.
    ///
    /// Removes shard files (and leftover temp files) that no committed or
    /// in-flight record owns, and reports records whose shards are missing.
    /// Metadata is never modified.  Meant to run periodically, off the hot
    /// path.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let metadata = self.metadata.lock().await;
        let records = metadata.load().await?;
        let mut report = ReconcileReport::default();

        // Pending is checked per file, after listing: a store registers
        // before writing its first shard.
        for file in self.shards.list().await? {
            if self.is_pending(&file.record_id) {
                continue;
            }
            let referenced = !file.is_temp
                && records
                    .get(&file.record_id)
                    .is_some_and(|r| (file.index as usize) < r.shard_refs.len());
            if referenced {
                continue;
            }

            if self.shards.remove(&file.name).await? {
                warn!(file = %file.name, "removed orphaned shard file");
                report.orphaned_shards_removed += 1;
            }
        }

        for record in records.values() {
            for i in 0..record.shard_refs.len() {
                let name = ShardStore::file_name(&record.record_id, shard_index(i));
                if !self.shards.exists(&name).await? {
                    report.records_missing_shards.push(record.record_id);
                    break;
                }
            }
        }

        if !report.records_missing_shards.is_empty() {
            warn!(
                records = report.records_missing_shards.len(),
                "records with missing shard files"
            );
        }
        info!(
            orphans_removed = report.orphaned_shards_removed,
            "reconciliation finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Write all shards, then commit the record.
    async fn commit(&self, record: VaultRecord, encrypted: &[EncryptedShard]) -> Result<()> {
        for (name, shard) in record.shard_refs.iter().zip(encrypted) {
            self.shards.write(name, shard).await?;
        }

        let metadata = self.metadata.lock().await;
        metadata.put(record).await
    }

    fn is_pending(&self, record_id: &RecordId) -> bool {
        lock_pending(&self.pending).contains(record_id)
    }

    async fn discard_shards(&self, record_id: &RecordId, count: usize) {
        for i in 0..count {
            let name = ShardStore::file_name(record_id, shard_index(i));
            if let Err(err) = self.shards.remove(&name).await {
                warn!(file = %name, error = %err, "could not remove shard, left for reconcile");
            }
        }
    }

    fn check_secret_len(&self, secret: &[u8]) -> Result<()> {
        if secret.len() > self.settings.max_secret_bytes {
            return Err(VaultError::InvalidInput(format!(
                "secret is {} bytes, maximum is {}",
                secret.len(),
                self.settings.max_secret_bytes
            )));
        }
        Ok(())
    }

    /// Reject records whose stored shape cannot have come from `store`.
    fn check_layout(&self, record: &VaultRecord) -> Result<()> {
        let n = self.settings.shard_count;
        if record.shard_refs.len() != n {
            return Err(VaultError::CorruptMetadata(format!(
                "record {} has {} shards, vault uses {n}",
                record.record_id,
                record.shard_refs.len()
            )));
        }
        for (i, name) in record.shard_refs.iter().enumerate() {
            if *name != ShardStore::file_name(&record.record_id, shard_index(i)) {
                return Err(VaultError::CorruptMetadata(format!(
                    "record {} has unexpected shard reference '{name}'",
                    record.record_id
                )));
            }
        }
        if record.salt.len() != SALT_LEN || record.verification_tag.len() != VERIFICATION_TAG_LEN {
            return Err(VaultError::CorruptMetadata(format!(
                "record {} has malformed key material fields",
                record.record_id
            )));
        }
        Ok(())
    }
}

fn encrypt_piece(
    base_key: &[u8; KEY_LEN],
    record_id: &RecordId,
    i: usize,
    piece: &[u8],
) -> Result<EncryptedShard> {
    let index = shard_index(i);
    let key = derive_shard_key(base_key, index)?;
    encrypt_shard(key.as_slice(), &shard_aad(record_id.as_bytes(), index), piece)
}

/// Shard counts are capped well below `u32::MAX` by `VaultSettings::validate`.
fn shard_index(i: usize) -> u32 {
    u32::try_from(i).unwrap_or(u32::MAX)
}

fn owned_by(record: &VaultRecord, owner_id: &str) -> bool {
    record.owner_id.as_bytes().ct_eq(owner_id.as_bytes()).into()
}

/// Owner ids and service names: non-empty, bounded, no control characters.
fn validate_label(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(VaultError::InvalidInput(format!("{what} cannot be empty")));
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(VaultError::InvalidInput(format!(
            "{what} cannot exceed {MAX_LABEL_LEN} bytes"
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(VaultError::InvalidInput(format!(
            "{what} contains control characters"
        )));
    }
    Ok(())
}
