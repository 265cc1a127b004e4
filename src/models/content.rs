//! Content produced by one source fetch.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::url::local_path_for_url;

/// One media asset to materialize.
///
/// Two tasks are duplicates iff both `url` and `local_path` match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaDownload {
    pub url: String,
    pub local_path: PathBuf,
}

impl MediaDownload {
    /// Task whose local path is derived from the URL path.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let local_path = local_path_for_url(&url);
        Self { url, local_path }
    }

    /// Task with an explicit local path.
    pub fn with_local_path(url: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            local_path: local_path.into(),
        }
    }
}

/// Keep the first occurrence of every `(url, local_path)` pair.
pub fn dedup_downloads(tasks: Vec<MediaDownload>) -> Vec<MediaDownload> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| seen.insert((task.url.clone(), task.local_path.clone())))
        .collect()
}

/// A payload destined for a JSON file on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFile {
    pub local_path: PathBuf,
    pub content: Value,
}

impl DataFile {
    pub fn new(local_path: impl Into<PathBuf>, content: Value) -> Self {
        Self {
            local_path: local_path.into(),
            content,
        }
    }

    /// Path on disk, with the extension forced to `.json` when absent.
    pub fn file_path(&self) -> PathBuf {
        if self.local_path.extension().is_some() {
            self.local_path.clone()
        } else {
            self.local_path.with_extension("json")
        }
    }
}

/// Data files and media tasks for one source fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentResult {
    pub data_files: Vec<DataFile>,
    pub media_downloads: Vec<MediaDownload>,
}

impl ContentResult {
    pub fn new(data_files: Vec<DataFile>, media_downloads: Vec<MediaDownload>) -> Self {
        Self {
            data_files,
            media_downloads,
        }
    }

    /// Merge many results into one, preserving order.
    pub fn combine(results: impl IntoIterator<Item = ContentResult>) -> Self {
        results
            .into_iter()
            .fold(Self::default(), |mut acc, result| {
                acc.data_files.extend(result.data_files);
                acc.media_downloads.extend(result.media_downloads);
                acc
            })
    }

    /// Flatten the data files of many results into a single array file at
    /// `local_path`. Array contents are spliced, anything else is appended
    /// as one element.
    pub fn collate(
        results: impl IntoIterator<Item = ContentResult>,
        local_path: impl Into<PathBuf>,
    ) -> Self {
        let combined = Self::combine(results);
        let mut items = Vec::new();
        for file in combined.data_files {
            match file.content {
                Value::Array(values) => items.extend(values),
                other => items.push(other),
            }
        }
        Self {
            data_files: vec![DataFile::new(local_path, Value::Array(items))],
            media_downloads: combined.media_downloads,
        }
    }
}
