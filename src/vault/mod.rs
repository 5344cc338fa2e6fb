//! Vault module: sharded, encrypted secret storage.
//!
//! This module provides:
//! - `VaultRecord`, `RecordId` and `RecordSummary` types (`record`)
//! - Contiguous N-of-N splitting and joining of secrets (`sharder`)
//! - The JSON metadata store with atomic rewrites (`metadata`)
//! - Encrypted shard files on disk (`shards`)
//! - The `VaultService` façade exposing store/retrieve/delete/list (`service`)

mod files;
pub mod metadata;
pub mod record;
pub mod retry;
pub mod service;
pub mod sharder;
pub mod shards;

// Re-export the most commonly used items.
pub use metadata::MetadataStore;
pub use record::{RecordId, RecordSummary, VaultRecord};
pub use service::{ReconcileReport, VaultService};
pub use shards::{ShardFile, ShardStore};
