//! Filesystem persistence.
//!
//! Data files are written as pretty JSON with an atomic temp-and-rename, so
//! a crashed run never leaves a truncated file behind. Directory helpers back
//! the downloader's staging commit and the orchestrator's backups.

pub mod local;

use crate::error::Result;
use crate::models::DataFile;

pub use local::{LocalStorage, clear_dir, copy_dir_all, remove_dir_if_exists};

/// Write every data file under the storage root, in order. Paths without an
/// extension get `.json`.
pub async fn persist_data_files(storage: &LocalStorage, files: &[DataFile]) -> Result<usize> {
    for file in files {
        storage.write_json(file.file_path(), &file.content).await?;
    }
    Ok(files.len())
}
