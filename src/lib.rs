// src/lib.rs

//! Content sync library.
//!
//! Pulls documents and media from remote sources into a local directory
//! tree. Media is staged and committed in one step per source, and
//! destinations can be restored from pre-run snapshots when a source fails.

pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod plugins;
pub mod services;
pub mod storage;
pub mod store;
pub mod transform;
pub mod utils;

#[cfg(test)]
mod test_support;
