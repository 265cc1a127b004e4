// src/models/mod.rs

//! Domain models for the sync engine.

mod config;
mod content;

// Re-export all public types
pub use config::{
    Config, DownloaderConfig, HttpConfig, ImageTransform, LoggingConfig, PathsConfig,
    SourceConfig, TransformConfig, TransformKind,
};
pub use content::{ContentResult, DataFile, MediaDownload, dedup_downloads};
