//! Local filesystem storage.
//!
//! Persists data files under a source's destination directory and provides
//! the directory-level operations the downloader and the orchestrator build
//! on: recursive copy, pruning with a keep pattern, and removal.
//!
//! ## Layout
//!
//! ```text
//! {download_path}/
//! ├── {source id}/          # destination: data files + committed media
//! ├── .tmp/{timestamp}/     # staging, removed after every run
//! │   └── {source id}/
//! └── .backup/{timestamp}/  # pre-run snapshots, removed after every run
//!     └── {source id}/
//! ```

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::utils::url::join_within;

/// Storage rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Full path for a relative key. Keys may not leave the root.
    fn path(&self, key: &Path) -> Result<PathBuf> {
        join_within(&self.root_dir, key).ok_or_else(|| {
            AppError::validation(format!(
                "path '{}' escapes {}",
                key.display(),
                self.root_dir.display()
            ))
        })
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    pub async fn write_bytes(&self, key: impl AsRef<Path>, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(key.as_ref())?;
        self.ensure_dir(&path).await?;

        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }

    /// Write pretty-printed JSON.
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        key: impl AsRef<Path>,
        value: &T,
    ) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    pub async fn read_bytes(&self, key: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
        let path = self.path(key.as_ref())?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    pub async fn read_json<T: DeserializeOwned>(&self, key: impl AsRef<Path>) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Copy the tree at `src` over `dst`, overwriting files. Returns the number
/// of files copied.
pub async fn copy_dir_all(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];

    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Remove everything under `dir` except files whose `/`-separated path
/// relative to `dir` matches `keep`. Directories left empty are removed;
/// `dir` itself stays. Returns the number of files removed.
pub async fn clear_dir(dir: &Path, keep: Option<&glob::Pattern>) -> Result<usize> {
    if !tokio::fs::try_exists(dir).await? {
        return Ok(0);
    }
    Box::pin(clear_dir_inner(dir, dir, keep)).await
}

async fn clear_dir_inner(root: &Path, dir: &Path, keep: Option<&glob::Pattern>) -> Result<usize> {
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            removed += Box::pin(clear_dir_inner(root, &path, keep)).await?;
            if is_empty_dir(&path).await? {
                tokio::fs::remove_dir(&path).await?;
            }
        } else {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if keep.is_some_and(|pattern| pattern.matches(&relative)) {
                continue;
            }
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

async fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}

/// Remove a directory tree. Returns whether anything was removed.
pub async fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::Io(e)),
    }
}
