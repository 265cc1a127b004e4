// src/pipeline/backup.rs

//! Pre-run snapshots of source destinations.

use std::path::PathBuf;

use crate::config::SourcePaths;
use crate::error::Result;
use crate::storage::{copy_dir_all, remove_dir_if_exists};
use crate::utils::Logger;

#[derive(Debug, Clone)]
struct Snapshot {
    source_id: String,
    destination: PathBuf,
    /// `None` when the destination did not exist before the run
    backup: Option<PathBuf>,
}

/// Snapshots taken during one run, in source order.
#[derive(Debug, Default)]
pub struct BackupSet {
    snapshots: Vec<Snapshot>,
}

impl BackupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Copy the source's destination into its backup directory.
    pub async fn snapshot(&mut self, source_id: &str, paths: &SourcePaths) -> Result<()> {
        let backup = if tokio::fs::try_exists(&paths.destination).await? {
            remove_dir_if_exists(&paths.backup).await?;
            copy_dir_all(&paths.destination, &paths.backup).await?;
            Some(paths.backup.clone())
        } else {
            None
        };

        self.snapshots.push(Snapshot {
            source_id: source_id.to_string(),
            destination: paths.destination.clone(),
            backup,
        });
        Ok(())
    }

    /// Put every snapshotted destination back the way it was. Destinations
    /// that did not exist are removed. Every snapshot is attempted; the first
    /// error is returned.
    pub async fn restore_all(&self, logger: &Logger) -> Result<usize> {
        let mut first_error = None;
        let mut restored = 0;

        for snapshot in &self.snapshots {
            match Self::restore(snapshot).await {
                Ok(()) => {
                    logger.info(&format!("Restored '{}'", snapshot.source_id));
                    restored += 1;
                }
                Err(e) => {
                    logger.error(&format!(
                        "Could not restore '{}' ({}): {}",
                        snapshot.source_id,
                        snapshot.destination.display(),
                        e
                    ));
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(restored),
        }
    }

    async fn restore(snapshot: &Snapshot) -> Result<()> {
        remove_dir_if_exists(&snapshot.destination).await?;
        if let Some(backup) = &snapshot.backup {
            copy_dir_all(backup, &snapshot.destination).await?;
        }
        Ok(())
    }
}
