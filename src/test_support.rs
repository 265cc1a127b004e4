//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::media::{MediaClient, RemoteMeta};

struct Resource {
    body: Vec<u8>,
    modified: SystemTime,
}

/// In-memory origin. Honours conditional requests against each resource's
/// modification time and records every request.
pub struct FakeMediaClient {
    resources: Mutex<HashMap<String, Resource>>,
    heads: AtomicUsize,
    downloads: Mutex<Vec<String>>,
}

impl FakeMediaClient {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            heads: AtomicUsize::new(0),
            downloads: Mutex::new(Vec::new()),
        }
    }

    /// Resource last modified well in the past.
    pub fn with_resource(self, url: &str, body: &[u8]) -> Self {
        self.resources.lock().unwrap().insert(
            url.to_string(),
            Resource {
                body: body.to_vec(),
                modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000),
            },
        );
        self
    }

    /// Replace a resource, marking it modified after any local copy.
    pub fn set_body(&self, url: &str, body: &[u8]) {
        self.resources.lock().unwrap().insert(
            url.to_string(),
            Resource {
                body: body.to_vec(),
                modified: SystemTime::now() + Duration::from_secs(3600),
            },
        );
    }

    pub fn head_count(&self) -> usize {
        self.heads.load(Ordering::SeqCst)
    }

    /// URLs fetched with a full download, in request order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.head_count() + self.downloads.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaClient for FakeMediaClient {
    async fn head(
        &self,
        url: &str,
        if_modified_since: Option<SystemTime>,
        _timeout: Duration,
    ) -> Result<RemoteMeta> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        let resources = self.resources.lock().unwrap();
        let resource = resources
            .get(url)
            .ok_or_else(|| AppError::media(url, "404 Not Found"))?;
        Ok(RemoteMeta {
            not_modified: if_modified_since.is_some_and(|since| resource.modified <= since),
            content_length: Some(resource.body.len() as u64),
        })
    }

    async fn download(&self, url: &str, dest: &Path, _timeout: Duration) -> Result<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        let body = self
            .resources
            .lock()
            .unwrap()
            .get(url)
            .map(|r| r.body.clone())
            .ok_or_else(|| AppError::media(url, "404 Not Found"))?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }
}
