//! Vault configuration (`.shardvault.toml`).

pub mod settings;

pub use settings::VaultSettings;
