//! Theme static and asset copying.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Asset copy errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory walk error.
    #[error("failed to walk asset directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Copy every file under `source_dir` into `dest_dir`, keeping relative paths.
///
/// Hidden files and directories are skipped. A missing source directory copies
/// nothing. Returns the number of files copied.
pub fn copy_dir(source_dir: &Path, dest_dir: &Path) -> Result<usize> {
    if !source_dir.is_dir() {
        debug!(source = %source_dir.display(), "source directory does not exist, skipping");
        return Ok(0);
    }

    let walker = WalkDir::new(source_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    let mut copied = 0;
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(source_dir).unwrap_or(entry.path());
        let dest = dest_dir.join(relative);
        copy_file(entry.path(), &dest)?;
        copied += 1;
    }

    info!(
        source = %source_dir.display(),
        dest = %dest_dir.display(),
        count = copied,
        "copied assets"
    );
    Ok(copied)
}

/// Copy a single file, creating parent directories.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| AssetError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(source, dest).map_err(|err| AssetError::Io {
        path: source.to_path_buf(),
        source: err,
    })?;
    Ok(())
}
