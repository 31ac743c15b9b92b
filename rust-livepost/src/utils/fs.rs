//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) and
//! atomic JSON persistence for the small file-backed stores.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Ensure the parent directory of a file path exists.
pub fn ensure_parent_dir_sync(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    ensure_dir_all_sync_with_op("creating directory", parent)
}

/// Load a JSON document, falling back to `T::default()`.
///
/// A missing file is the normal first-run case. A file that exists but does
/// not parse is logged and also treated as empty, so a torn or hand-edited
/// file never stops the service.
pub fn read_json_or_default<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read JSON store, starting empty");
            return T::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt JSON store, starting empty");
            T::default()
        }
    }
}

/// Serialize `value` and atomically replace `path` with it.
///
/// The document is written to a temporary file in the destination directory
/// and renamed over the target, so readers see either the old or the new
/// content, never a partial write.
pub fn write_json_atomic<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    ensure_parent_dir_sync(path)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let bytes = serde_json::to_vec_pretty(value)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| io_error("creating temp file in", dir, e))?;
    tmp.write_all(&bytes)
        .map_err(|e| io_error("writing temp file for", path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error("syncing temp file for", path, e))?;
    tmp.persist(path)
        .map_err(|e| io_error("replacing", path, e.error))?;

    Ok(())
}
