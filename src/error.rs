// src/error.rs

//! Unified error handling for the sync engine.
//!
//! Sources report failures as [`SourceError`] values; everything above the
//! source layer speaks [`AppError`] through the [`Result`] alias.

use std::fmt;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for source fetch/parse operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Failure reported by a content source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Bad or missing setup (unsupported version, missing credentials, ...)
    #[error("config error: {0}")]
    Config(String),

    /// Network or remote failure
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed response body or document shape
    #[error("parse error: {0}")]
    Parse(String),
}

impl SourceError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn fetch(message: impl fmt::Display) -> Self {
        Self::Fetch(message.to_string())
    }

    pub fn parse(message: impl fmt::Display) -> Self {
        Self::Parse(message.to_string())
    }

    /// Human-readable message without the tag prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m) | Self::Fetch(m) | Self::Parse(m) => m,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        Self::fetch(e)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(e)
    }
}

/// Document store violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("namespace '{0}' already exists")]
    NamespaceExists(String),

    #[error("namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("document '{id}' already exists in namespace '{namespace}'")]
    DocumentExists { namespace: String, id: String },

    #[error("document '{id}' not found in namespace '{namespace}'")]
    DocumentNotFound { namespace: String, id: String },
}

/// A plugin hook that failed, tagged with the plugin and event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("plugin '{plugin}' failed during {event}: {message}")]
pub struct PluginError {
    pub plugin: String,
    pub event: String,
    pub message: String,
}

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A source failed to fetch or parse
    #[error("Source '{source_id}' failed: {error}")]
    Source {
        source_id: String,
        error: SourceError,
    },

    /// Document store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Plugin hook error
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Media task failure, carrying the originating URL
    #[error("Media error for {url}: {message}")]
    Media { url: String, message: String },

    /// Transform failed for a document or data file
    #[error("Transform error for {target}: {message}")]
    Transform { target: String, message: String },

    /// Invalid path expression
    #[error("Invalid path expression '{path}': {message}")]
    Path { path: String, message: String },

    /// Run cancelled through the abort signal
    #[error("Sync aborted")]
    Aborted,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap a source error with the id of the source that produced it.
    pub fn from_source(source_id: impl Into<String>, error: SourceError) -> Self {
        Self::Source {
            source_id: source_id.into(),
            error,
        }
    }

    /// Create a media error with the originating URL.
    pub fn media(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Media {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a transform error for a document or data file.
    pub fn transform(target: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transform {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a path expression error.
    pub fn path(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Path {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
