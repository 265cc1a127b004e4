//! Application configuration structures.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::transform::PathExpr;

/// Root application configuration.
///
/// Built once per run, validated, then shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Download, temp and backup roots
    #[serde(default)]
    pub paths: PathsConfig,

    /// Media downloader behavior
    #[serde(default)]
    pub downloader: DownloaderConfig,

    /// HTTP client settings shared by sources and the downloader
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Snapshot destinations before a run and restore them on failure
    #[serde(default = "defaults::backup_and_restore")]
    pub backup_and_restore: bool,

    /// HTTP JSON sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Content transforms applied to data files before persisting
    #[serde(default)]
    pub transforms: Vec<TransformConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        self.downloader.validate()?;

        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.paths.download_path.trim().is_empty() {
            return Err(AppError::validation("paths.download_path is empty"));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !seen.insert(source.id.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
        }

        for transform in &self.transforms {
            PathExpr::parse(&transform.path)?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            downloader: DownloaderConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            backup_and_restore: defaults::backup_and_restore(),
            sources: Vec::new(),
            transforms: Vec::new(),
        }
    }
}

/// Filesystem roots. Each source gets a subdirectory named after its id.
///
/// `temp_path` and `backup_path` accept `%DOWNLOAD_PATH%` and `%TIMESTAMP%`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::download_path")]
    pub download_path: String,

    #[serde(default = "defaults::temp_path")]
    pub temp_path: String,

    #[serde(default = "defaults::backup_path")]
    pub backup_path: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_path: defaults::download_path(),
            temp_path: defaults::temp_path(),
            backup_path: defaults::backup_path(),
        }
    }
}

/// Media downloader settings.
///
/// Disabling both cache checks makes every existing destination file count
/// as current without contacting the origin. Remote changes go unnoticed
/// until `ignore_cache` is set or the local file is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Worker pool size
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Per-request timeout in milliseconds
    #[serde(default = "defaults::max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Always re-download, never reuse local files
    #[serde(default)]
    pub ignore_cache: bool,

    #[serde(default = "defaults::enabled")]
    pub enable_if_modified_since_check: bool,

    #[serde(default = "defaults::enabled")]
    pub enable_content_length_check: bool,

    /// Fail the whole batch on the first task failure
    #[serde(default)]
    pub abort_on_error: bool,

    /// Prune the destination before fetching
    #[serde(default)]
    pub clear_old_files_on_start: bool,

    /// Prune the destination right before committing staged files
    #[serde(default)]
    pub clear_old_files_on_success: bool,

    /// Glob (relative to the destination) preserved while pruning
    #[serde(default)]
    pub keep: Option<String>,

    /// Wipe a leftover temp directory before staging
    #[serde(default)]
    pub force_clear_temp_files: bool,

    /// Substring removed from every destination path
    #[serde(default)]
    pub strip: Option<String>,

    /// Do not generate image derivatives
    #[serde(default)]
    pub skip_derivatives: bool,

    #[serde(default)]
    pub image_transforms: Vec<ImageTransform>,
}

impl DownloaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(AppError::validation("downloader.max_concurrent must be > 0"));
        }
        if self.max_timeout_ms == 0 {
            return Err(AppError::validation("downloader.max_timeout_ms must be > 0"));
        }
        if let Some(keep) = &self.keep {
            glob::Pattern::new(keep).map_err(|e| {
                AppError::validation(format!("downloader.keep '{keep}' is not a valid glob: {e}"))
            })?;
        }
        for transform in &self.image_transforms {
            transform.validate()?;
        }
        Ok(())
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            max_timeout_ms: defaults::max_timeout_ms(),
            ignore_cache: false,
            enable_if_modified_since_check: true,
            enable_content_length_check: true,
            abort_on_error: false,
            clear_old_files_on_start: false,
            clear_old_files_on_success: false,
            keep: None,
            force_clear_temp_files: false,
            strip: None,
            skip_derivatives: false,
            image_transforms: Vec::new(),
        }
    }
}

/// Derivative image written next to a downloaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageTransform {
    Scale {
        factor: f32,
        #[serde(default)]
        suffix: Option<String>,
    },
    Resize {
        width: u32,
        height: u32,
        #[serde(default)]
        suffix: Option<String>,
    },
    Blur {
        sigma: f32,
        #[serde(default)]
        suffix: Option<String>,
    },
}

impl ImageTransform {
    /// Suffix appended to the file stem of the derivative.
    pub fn suffix(&self) -> String {
        match self {
            Self::Scale { suffix: Some(s), .. }
            | Self::Resize { suffix: Some(s), .. }
            | Self::Blur { suffix: Some(s), .. } => s.clone(),
            Self::Scale { factor, .. } => format!("-scale{factor}"),
            Self::Resize { width, height, .. } => format!("-{width}x{height}"),
            Self::Blur { sigma, .. } => format!("-blur{sigma}"),
        }
    }

    fn validate(&self) -> Result<()> {
        let ok = match self {
            Self::Scale { factor, .. } => *factor > 0.0,
            Self::Resize { width, height, .. } => *width > 0 && *height > 0,
            Self::Blur { sigma, .. } => *sigma > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "invalid image transform {self:?}"
            )))
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Timeout for source requests in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// A paginated JSON endpoint.
///
/// `url` may contain `{offset}` and `{limit}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,

    pub url: String,

    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Path expression locating the item array in a response body
    #[serde(default = "defaults::items_path")]
    pub items_path: String,

    /// Item field holding the document id
    #[serde(default = "defaults::id_field")]
    pub id_field: String,

    /// Path expressions whose string matches are media URLs
    #[serde(default)]
    pub media_paths: Vec<String>,

    /// Write every document into one array file at this path instead of
    /// one file per document
    #[serde(default)]
    pub collate: Option<String>,
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("source id is empty"));
        }
        if self.id.contains(['/', '\\']) || self.id == "." || self.id == ".." {
            return Err(AppError::validation(format!(
                "source id '{}' is not a valid directory name",
                self.id
            )));
        }
        if self.page_size == 0 {
            return Err(AppError::validation(format!(
                "source '{}': page_size must be > 0",
                self.id
            )));
        }
        url::Url::parse(
            &self
                .url
                .replace("{offset}", "0")
                .replace("{limit}", "1"),
        )?;
        PathExpr::parse(&self.items_path)?;
        for path in &self.media_paths {
            PathExpr::parse(path)?;
        }
        Ok(())
    }
}

/// A configured content transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Restrict to one source; all sources when unset
    #[serde(default)]
    pub source: Option<String>,

    /// Restrict to these data file paths; all files when unset
    #[serde(default)]
    pub keys: Option<Vec<String>>,

    /// Path expression selecting the nodes to rewrite
    pub path: String,

    #[serde(flatten)]
    pub kind: TransformKind,
}

/// Built-in transform functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformKind {
    /// Rewrite a media URL to the local path it is downloaded to
    LocalMedia {
        #[serde(default)]
        prefix: Option<String>,
    },
    /// Substring replacement on string values
    Replace { from: String, to: String },
    /// Prepend to string values
    Prefix { value: String },
}

mod defaults {
    pub fn backup_and_restore() -> bool {
        true
    }
    pub fn enabled() -> bool {
        true
    }

    // Paths
    pub fn download_path() -> String {
        "content".into()
    }
    pub fn temp_path() -> String {
        "%DOWNLOAD_PATH%/.tmp/%TIMESTAMP%".into()
    }
    pub fn backup_path() -> String {
        "%DOWNLOAD_PATH%/.backup/%TIMESTAMP%".into()
    }

    // Downloader
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_timeout_ms() -> u64 {
        60_000
    }

    // HTTP
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; content-sync/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Sources
    pub fn page_size() -> usize {
        100
    }
    pub fn items_path() -> String {
        "$".into()
    }
    pub fn id_field() -> String {
        "id".into()
    }
}
