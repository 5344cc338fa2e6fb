//! A local credential vault that protects third-party API secrets at rest.
//!
//! Each secret is split into N contiguous shards, every shard is encrypted
//! with its own AES-256-GCM subkey, and the shards are written to separate
//! files.  Keys are derived with HKDF-SHA256 from a process-held master key
//! and a random salt persisted with the record, so retrieval works across
//! restarts.  Reconstruction needs all N shards.
//!
//! ```no_run
//! # async fn demo() -> shardvault::errors::Result<()> {
//! use shardvault::config::VaultSettings;
//! use shardvault::crypto::load_or_generate_master_keyfile;
//! use shardvault::vault::VaultService;
//!
//! let settings = VaultSettings::with_data_dir("/var/lib/app/vault");
//! let master = load_or_generate_master_keyfile("/var/lib/app/master.key".as_ref())?;
//! let vault = VaultService::open(settings, master).await?;
//!
//! let id = vault.store("user-1", "openai", b"sk-ABCDEF1234").await?;
//! let secret = vault.retrieve("user-1", &id).await?;
//! assert_eq!(secret.as_slice(), b"sk-ABCDEF1234");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod errors;
pub mod vault;

pub use errors::{Result, VaultError};
pub use vault::{RecordId, RecordSummary, VaultService};
