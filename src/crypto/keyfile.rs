//! Master key files.
//!
//! A master key file holds 32 random bytes and is the simplest way to
//! give the vault its process-held secret.  Files are written with
//! owner-only permissions and are never overwritten.

use std::fs;
use std::path::Path;

use rand::RngCore;
use zeroize::Zeroizing;

use super::keys::{MasterKey, KEY_LEN};
use crate::errors::{Result, VaultError};

/// Generate a new master key and write it to `path`.
///
/// Fails if a file already exists there: replacing a master key makes
/// every stored record unreadable.
pub fn generate_master_keyfile(path: &Path) -> Result<MasterKey> {
    if path.exists() {
        return Err(VaultError::MasterKey(format!(
            "master key file already exists at {}",
            path.display()
        )));
    }

    let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill_bytes(&mut *bytes);

    write_private_file(path, &*bytes)?;

    Ok(MasterKey::new(*bytes))
}

/// Load a master key file from disk and validate its length.
pub fn load_master_keyfile(path: &Path) -> Result<MasterKey> {
    if !path.exists() {
        return Err(VaultError::MasterKey(format!(
            "master key file not found at {}",
            path.display()
        )));
    }

    let data = Zeroizing::new(
        fs::read(path)
            .map_err(|e| VaultError::MasterKey(format!("failed to read master key file: {e}")))?,
    );

    if data.len() != KEY_LEN {
        return Err(VaultError::MasterKey(format!(
            "master key file must be exactly {KEY_LEN} bytes, got {}",
            data.len()
        )));
    }

    MasterKey::from_slice(&data)
}

/// Load the master key file at `path`, generating it on first run.
pub fn load_or_generate_master_keyfile(path: &Path) -> Result<MasterKey> {
    if path.exists() {
        load_master_keyfile(path)
    } else {
        tracing::info!(path = %path.display(), "generating new master key file");
        generate_master_keyfile(path)
    }
}

/// Write `bytes` to `path`, creating parent directories and restricting
/// the file to owner-only read/write on Unix.
pub(crate) fn write_private_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                VaultError::MasterKey(format!("cannot create directory {}: {e}", parent.display()))
            })?;
        }
    }

    fs::write(path, bytes)
        .map_err(|e| VaultError::MasterKey(format!("failed to write {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|e| {
            VaultError::MasterKey(format!("failed to set permissions on {}: {e}", path.display()))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generate_and_load_master_keyfile_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");

        let generated = generate_master_keyfile(&path).unwrap();
        let loaded = load_master_keyfile(&path).unwrap();
        assert_eq!(generated.as_bytes(), loaded.as_bytes());
    }

    #[test]
    fn generate_fails_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");

        generate_master_keyfile(&path).unwrap();
        assert!(generate_master_keyfile(&path).is_err());
    }

    #[test]
    fn load_fails_if_missing() {
        let dir = TempDir::new().unwrap();
        let result = load_master_keyfile(&dir.path().join("nope.key"));
        assert!(matches!(result, Err(VaultError::MasterKey(_))));
    }

    #[test]
    fn load_fails_on_wrong_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.key");
        fs::write(&path, [0u8; 16]).unwrap();

        assert!(load_master_keyfile(&path).is_err());
    }

    #[test]
    fn load_or_generate_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("master.key");

        let first = load_or_generate_master_keyfile(&path).unwrap();
        let second = load_or_generate_master_keyfile(&path).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn master_keyfile_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("master.key");
        generate_master_keyfile(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
