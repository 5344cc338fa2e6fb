use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Largest shard count accepted by `validate`.
pub const MAX_SHARD_COUNT: usize = 64;

/// Vault configuration, loaded from `.shardvault.toml`.
///
/// Every field has a sensible default so the vault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultSettings {
    /// Directory holding the metadata file and the shard directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// File name of the metadata store inside `data_dir`.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// Directory name (inside `data_dir`) for encrypted shard files.
    #[serde(default = "default_shard_dir")]
    pub shard_dir: String,

    /// Number of shards every secret is split into (N-of-N).
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Largest secret accepted by `store`, in bytes.
    #[serde(default = "default_max_secret_bytes")]
    pub max_secret_bytes: usize,

    /// How many times a transient file-system error is attempted.
    #[serde(default = "default_io_retry_attempts")]
    pub io_retry_attempts: u32,

    /// Base delay between retries; attempt `k` waits `k * backoff`.
    #[serde(default = "default_io_retry_backoff_ms")]
    pub io_retry_backoff_ms: u64,

    /// Argon2 memory cost in KiB for passphrase-derived master keys.
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count.
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree.
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from(".shardvault")
}

fn default_metadata_file() -> String {
    "vault.json".to_string()
}

fn default_shard_dir() -> String {
    "shards".to_string()
}

fn default_shard_count() -> usize {
    3
}

fn default_max_secret_bytes() -> usize {
    65_536
}

fn default_io_retry_attempts() -> u32 {
    3
}

fn default_io_retry_backoff_ms() -> u64 {
    20
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            metadata_file: default_metadata_file(),
            shard_dir: default_shard_dir(),
            shard_count: default_shard_count(),
            max_secret_bytes: default_max_secret_bytes(),
            io_retry_attempts: default_io_retry_attempts(),
            io_retry_backoff_ms: default_io_retry_backoff_ms(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }
}

impl VaultSettings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".shardvault.toml";

    /// Settings rooted at `data_dir`, everything else defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings from `<project_dir>/.shardvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    /// A relative `data_dir` is resolved against `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        let mut settings = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str::<VaultSettings>(&contents).map_err(|e| {
                VaultError::Config(format!("Failed to parse {}: {e}", config_path.display()))
            })?
        } else {
            Self::default()
        };

        if settings.data_dir.is_relative() {
            settings.data_dir = project_dir.join(&settings.data_dir);
        }

        Ok(settings)
    }

    /// Reject configurations the vault cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || self.shard_count > MAX_SHARD_COUNT {
            return Err(VaultError::Config(format!(
                "shard_count must be between 1 and {MAX_SHARD_COUNT} (got {})",
                self.shard_count
            )));
        }
        if self.max_secret_bytes == 0 {
            return Err(VaultError::Config(
                "max_secret_bytes must be greater than zero".into(),
            ));
        }
        if self.io_retry_attempts == 0 {
            return Err(VaultError::Config(
                "io_retry_attempts must be at least 1".into(),
            ));
        }
        for (field, value) in [
            ("metadata_file", &self.metadata_file),
            ("shard_dir", &self.shard_dir),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
                return Err(VaultError::Config(format!(
                    "{field} must be a plain file name (got '{value}')"
                )));
            }
        }
        Ok(())
    }

    /// Full path to the metadata file.
    ///
    /// Example: `.shardvault/vault.json`
    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join(&self.metadata_file)
    }

    /// Full path to the shard directory.
    pub fn shard_path(&self) -> PathBuf {
        self.data_dir.join(&self.shard_dir)
    }

    /// Base delay between I/O retries.
    pub fn io_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.io_retry_backoff_ms)
    }

    /// Convert the Argon2 settings into crypto-layer params.
    pub fn argon2_params(&self) -> crate::crypto::kdf::Argon2Params {
        crate::crypto::kdf::Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
