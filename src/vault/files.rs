//! Small async file helpers shared by the metadata and shard stores.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::warn;

/// Temp file used while atomically replacing `path`: `.<name>.tmp`
/// in the same directory, so the final rename never crosses filesystems.
pub fn temp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

/// Write `bytes` to `path` **atomically** with owner-only permissions.
///
/// Readers see either the old contents or the new contents, never a
/// half-written file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = temp_path(path);

    fs::write(&tmp_path, bytes).await?;
    set_private(&tmp_path, 0o600).await?;
    if let Err(err) = fs::rename(&tmp_path, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp_path).await {
            warn!(
                file = %tmp_path.display(),
                error = %cleanup,
                "could not remove temp file after failed rename"
            );
        }
        return Err(err);
    }

    Ok(())
}

/// Create `dir` (and parents) restricted to the owner.
pub async fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir).await?;
    set_private(dir, 0o700).await
}

/// Remove `path`, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
async fn set_private(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_private(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
