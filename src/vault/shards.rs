//! Encrypted shard files.
//!
//! Each shard lives in its own file named from its record and position,
//! `<record id>.<index>.shard`, holding `nonce || tag || ciphertext`.
//! Names are deterministic so a record's shards can always be located
//! (and swept) from the record id alone.

use std::io;
use std::path::{Path, PathBuf};

use super::files;
use super::record::RecordId;
use super::retry::RetryPolicy;
use crate::crypto::EncryptedShard;
use crate::errors::Result;

const SHARD_EXT: &str = "shard";

/// A file found in the shard directory that belongs to the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFile {
    pub name: String,
    pub record_id: RecordId,
    pub index: u32,
    /// Leftover temp file from an interrupted write.
    pub is_temp: bool,
}

/// Directory of encrypted shard files.
#[derive(Debug)]
pub struct ShardStore {
    dir: PathBuf,
    retry: RetryPolicy,
}

impl ShardStore {
    /// Open (creating if needed) the shard directory.
    pub async fn open(dir: PathBuf, retry: RetryPolicy) -> Result<Self> {
        files::create_private_dir(&dir).await?;
        Ok(Self { dir, retry })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for shard `index` of `record_id`.
    pub fn file_name(record_id: &RecordId, index: u32) -> String {
        format!("{record_id}.{index}.{SHARD_EXT}")
    }

    /// Inverse of `file_name`, also recognising `.<name>.tmp` leftovers.
    pub fn parse_file_name(name: &str) -> Option<ShardFile> {
        let (base, is_temp) = match name.strip_prefix('.').and_then(|n| n.strip_suffix(".tmp")) {
            Some(inner) => (inner, true),
            None => (name, false),
        };

        let stem = base.strip_suffix(SHARD_EXT)?.strip_suffix('.')?;
        let (id, index) = stem.rsplit_once('.')?;
        let record_id = id.parse::<RecordId>().ok()?;
        let index = index.parse::<u32>().ok()?;

        // Only canonical spellings count; "007" or upper-case ids are not ours.
        if Self::file_name(&record_id, index) != base {
            return None;
        }

        Some(ShardFile {
            name: name.to_string(),
            record_id,
            index,
            is_temp,
        })
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Atomically write one shard.
    pub async fn write(&self, name: &str, shard: &EncryptedShard) -> Result<()> {
        let path = self.path_of(name);
        let bytes = shard.to_bytes();
        self.retry
            .run("write shard", || files::write_atomic(&path, &bytes))
            .await?;
        Ok(())
    }

    /// Read one shard.  A missing file is an `Io` error of kind `NotFound`.
    pub async fn read(&self, name: &str) -> Result<EncryptedShard> {
        let path = self.path_of(name);
        let data = self
            .retry
            .run("read shard", || tokio::fs::read(&path))
            .await?;
        EncryptedShard::from_bytes(&data)
    }

    /// Remove one shard; `false` if it was already gone.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path_of(name);
        let removed = self
            .retry
            .run("remove shard", || files::remove_if_exists(&path))
            .await?;
        Ok(removed)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_of(name)).await?)
    }

    /// Every vault-owned file in the shard directory.
    ///
    /// Unrelated files are skipped, never reported or touched.
    pub async fn list(&self) -> Result<Vec<ShardFile>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(file) = entry.file_name().to_str().and_then(Self::parse_file_name) {
                found.push(file);
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_shard;
    use crate::errors::VaultError;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> ShardStore {
        ShardStore::open(dir.path().join("shards"), RetryPolicy::new(1, Duration::ZERO))
            .await
            .unwrap()
    }

    #[test]
    fn file_names_parse_back() {
        let id = RecordId::new();
        let name = ShardStore::file_name(&id, 2);
        assert_eq!(name, format!("{id}.2.shard"));

        let parsed = ShardStore::parse_file_name(&name).unwrap();
        assert_eq!(parsed.record_id, id);
        assert_eq!(parsed.index, 2);
        assert!(!parsed.is_temp);

        let tmp = ShardStore::parse_file_name(&format!(".{name}.tmp")).unwrap();
        assert!(tmp.is_temp);
        assert_eq!(tmp.index, 2);
    }

    #[test]
    fn foreign_names_are_ignored() {
        let id = RecordId::new();
        for name in [
            "README".to_string(),
            format!("{id}.shard"),
            format!("{id}.x.shard"),
            format!("{id}.02.shard"),
            format!("{}.0.shard", id.to_string().to_uppercase()),
            format!("{id}.0.shard.bak"),
        ] {
            assert!(ShardStore::parse_file_name(&name).is_none(), "{name}");
        }
    }

    #[tokio::test]
    async fn write_read_remove() {
        let dir = TempDir::new().unwrap();
        let shards = store(&dir).await;
        let name = ShardStore::file_name(&RecordId::new(), 0);
        let shard = encrypt_shard(&[5u8; 32], b"", b"piece").unwrap();

        shards.write(&name, &shard).await.unwrap();
        assert!(shards.exists(&name).await.unwrap());
        assert_eq!(shards.read(&name).await.unwrap(), shard);

        assert!(shards.remove(&name).await.unwrap());
        assert!(!shards.remove(&name).await.unwrap());
        assert!(matches!(shards.read(&name).await, Err(VaultError::Io(_))));
    }

    #[tokio::test]
    async fn list_reports_only_vault_files() {
        let dir = TempDir::new().unwrap();
        let shards = store(&dir).await;
        let id = RecordId::new();
        let shard = encrypt_shard(&[5u8; 32], b"", b"piece").unwrap();

        shards.write(&ShardStore::file_name(&id, 0), &shard).await.unwrap();
        shards.write(&ShardStore::file_name(&id, 1), &shard).await.unwrap();
        std::fs::write(shards.dir().join("notes.txt"), b"hi").unwrap();

        let listed = shards.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|f| f.record_id == id));
    }
}
