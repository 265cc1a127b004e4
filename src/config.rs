// src/config.rs

//! Configuration loading and run path resolution.
//!
//! `temp_path` and `backup_path` are templates. `%DOWNLOAD_PATH%` expands to
//! the resolved download root and `%TIMESTAMP%` to the run's start time in
//! epoch milliseconds, so concurrent runs never share a staging directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{Config, PathsConfig};

/// Load and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)?;
    config.validate()?;
    log::info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Replace `%NAME%` tokens from `tokens`. Unknown tokens are an error.
pub fn substitute_tokens(template: &str, tokens: &[(&str, &str)]) -> Result<String> {
    let token = Regex::new(r"%([A-Z_]+)%")
        .map_err(|e| AppError::config(format!("token pattern: {e}")))?;
    let mut unknown = None;
    let expanded = token.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match tokens.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => value.to_string(),
            None => {
                unknown.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match unknown {
        Some(name) => Err(AppError::config(format!(
            "unknown token %{name}% in path '{template}'"
        ))),
        None => Ok(expanded.into_owned()),
    }
}

/// Roots for one run, tokens already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub download: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
}

/// Per-source directories, each a subdirectory named after the source id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub destination: PathBuf,
    pub temp: PathBuf,
    pub backup: PathBuf,
}

impl RunPaths {
    pub fn resolve(paths: &PathsConfig, started_at: DateTime<Utc>) -> Result<Self> {
        let timestamp = started_at.timestamp_millis().to_string();
        let download = substitute_tokens(&paths.download_path, &[("TIMESTAMP", timestamp.as_str())])?;
        let tokens = [("DOWNLOAD_PATH", download.as_str()), ("TIMESTAMP", timestamp.as_str())];

        Ok(Self {
            temp: PathBuf::from(substitute_tokens(&paths.temp_path, &tokens)?),
            backup: PathBuf::from(substitute_tokens(&paths.backup_path, &tokens)?),
            download: PathBuf::from(download),
        })
    }

    pub fn for_source(&self, source_id: &str) -> SourcePaths {
        SourcePaths {
            destination: self.download.join(source_id),
            temp: self.temp.join(source_id),
            backup: self.backup.join(source_id),
        }
    }
}
