//! Write-to-temp-then-rename helper.

use crate::error::StoreError;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace the file at `path` with the bytes produced by `write`.
///
/// The content is written to a temporary file in the destination directory,
/// flushed and synced, then renamed over `path`. If `write` fails the
/// temporary file is removed and the previous content of `path` is untouched.
/// Missing parent directories are created.
///
/// # Errors
///
/// Returns whatever `write` returns, or [`StoreError::Io`] when the temporary
/// file cannot be created, synced, or renamed.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), StoreError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
