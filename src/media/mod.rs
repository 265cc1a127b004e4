//! Media asset materialization.

mod client;
pub mod derivatives;
mod downloader;

pub use client::{HttpMediaClient, MediaClient, RemoteMeta};
pub use downloader::{DownloadReport, MediaDownloader, TaskFailure};
