//! Content transform application.
//!
//! A [`ContentTransform`] pairs a [`PathExpr`] with a pure function and
//! rewrites every matched node of a document (or data file) in place.
//! Failures are isolated per target: the target is logged and left as it
//! was, and the batch moves on.

mod path;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{DataFile, DownloaderConfig, TransformConfig, TransformKind};
use crate::store::Namespace;
use crate::utils::Logger;
use crate::utils::url::local_path_for_url;

pub use path::PathExpr;

/// Pure node rewrite.
pub type TransformFn = Arc<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// A path-addressed transform, optionally scoped to a source and keys.
#[derive(Clone)]
pub struct ContentTransform {
    source: Option<String>,
    keys: Option<HashSet<String>>,
    path: PathExpr,
    func: TransformFn,
}

/// Outcome of applying one transform to a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Targets that had at least one node rewritten
    pub targets: usize,
    /// Total rewritten nodes
    pub nodes: usize,
    /// Targets left unmodified because the function failed
    pub failed: Vec<String>,
}

impl ContentTransform {
    pub fn new<F>(path: PathExpr, func: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            source: None,
            keys: None,
            path,
            func: Arc::new(func),
        }
    }

    /// Only apply to the source with this id.
    pub fn for_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Only apply to these document ids / data file paths.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Build one of the configured transforms.
    pub fn from_config(config: &TransformConfig, downloader: &DownloaderConfig) -> Result<Self> {
        let path = PathExpr::parse(&config.path)?;
        let mut transform = match &config.kind {
            TransformKind::LocalMedia { prefix } => {
                let prefix = prefix.clone();
                let strip = downloader.strip.clone();
                Self::new(path, move |value| {
                    map_string(value, |url| local_media_path(url, prefix.as_deref(), strip.as_deref()))
                })
            }
            TransformKind::Replace { from, to } => {
                let (from, to) = (from.clone(), to.clone());
                Self::new(path, move |value| map_string(value, |s| s.replace(&from, &to)))
            }
            TransformKind::Prefix { value: prefix } => {
                let prefix = prefix.clone();
                Self::new(path, move |value| map_string(value, |s| format!("{prefix}{s}")))
            }
        };
        if let Some(source) = &config.source {
            transform = transform.for_source(source.clone());
        }
        if let Some(keys) = &config.keys {
            transform = transform.with_keys(keys.iter().cloned());
        }
        Ok(transform)
    }

    pub fn path(&self) -> &PathExpr {
        &self.path
    }

    pub fn applies_to_source(&self, source_id: &str) -> bool {
        self.source.as_deref().is_none_or(|s| s == source_id)
    }

    pub fn matches_key(&self, key: &str) -> bool {
        self.keys.as_ref().is_none_or(|keys| keys.contains(key))
    }

    /// Rewrite `value` in place. On failure `value` is unchanged.
    pub fn apply_value(&self, target: &str, value: &mut Value) -> Result<usize> {
        self.path
            .apply(value, |node| (self.func)(node))
            .map_err(|message| AppError::transform(target, message))
    }

    /// Apply to every selected document of a namespace.
    pub fn apply_to_namespace(&self, namespace: &mut Namespace, logger: &Logger) -> TransformReport {
        let mut report = TransformReport::default();
        for doc in namespace.documents_mut() {
            if !self.matches_key(doc.id()) {
                continue;
            }
            let target = doc.id().to_string();
            match doc.apply(&self.path, |node| (self.func)(node)) {
                Ok(0) => {}
                Ok(nodes) => {
                    report.targets += 1;
                    report.nodes += nodes;
                }
                Err(message) => {
                    logger.warn(&format!(
                        "Transform {} failed for document '{}': {}",
                        self.path, target, message
                    ));
                    report.failed.push(target);
                }
            }
        }
        report
    }

    /// Apply to every selected data file, keyed by its `/`-separated path.
    pub fn apply_to_data_files(&self, files: &mut [DataFile], logger: &Logger) -> TransformReport {
        let mut report = TransformReport::default();
        for file in files.iter_mut() {
            let key = data_file_key(&file.local_path);
            if !self.matches_key(&key) {
                continue;
            }
            match self.apply_value(&key, &mut file.content) {
                Ok(0) => {}
                Ok(nodes) => {
                    report.targets += 1;
                    report.nodes += nodes;
                }
                Err(e) => {
                    logger.warn(&format!("Transform {} failed: {}", self.path, e));
                    report.failed.push(key);
                }
            }
        }
        report
    }
}

impl fmt::Debug for ContentTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTransform")
            .field("source", &self.source)
            .field("keys", &self.keys)
            .field("path", &self.path.as_str())
            .finish_non_exhaustive()
    }
}

/// Build every configured transform.
pub fn build_transforms(
    configs: &[TransformConfig],
    downloader: &DownloaderConfig,
) -> Result<Vec<ContentTransform>> {
    configs
        .iter()
        .map(|config| ContentTransform::from_config(config, downloader))
        .collect()
}

/// Key used to match data files against a `keys` filter.
pub fn data_file_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// `/`-separated local path a media URL is downloaded to, mirroring the
/// downloader's path derivation.
pub fn local_media_path(url: &str, prefix: Option<&str>, strip: Option<&str>) -> String {
    let mut relative = data_file_key(&local_path_for_url(url));
    if let Some(strip) = strip.filter(|s| !s.is_empty()) {
        relative = relative.replace(strip, "");
    }
    let relative = relative.trim_start_matches('/');
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), relative),
        None => relative.to_string(),
    }
}

fn map_string<F>(value: Value, f: F) -> std::result::Result<Value, String>
where
    F: FnOnce(&str) -> String,
{
    match value {
        Value::String(s) => Ok(Value::String(f(&s))),
        Value::Null => Ok(Value::Null),
        other => Err(format!("expected a string, found {other}")),
    }
}
