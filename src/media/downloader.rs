//! Staged, cache-aware media downloader.
//!
//! Every task is materialized into a staging directory first. The destination
//! only changes in [`MediaDownloader::sync`]'s commit step, after the whole
//! batch has settled, so readers of the destination never observe a half
//! written batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use super::client::MediaClient;
use super::derivatives;
use crate::error::{AppError, Result};
use crate::models::{DownloaderConfig, MediaDownload, dedup_downloads};
use crate::storage::{clear_dir, copy_dir_all, remove_dir_if_exists};
use crate::utils::Logger;
use crate::utils::url::{join_within, relative_path};

/// Outcome of one downloader batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Tasks handed in, duplicates included
    pub requested: usize,
    /// Tasks left after dedup
    pub unique: usize,
    pub downloaded: usize,
    pub cached: usize,
    pub derivatives: usize,
    pub bytes_transferred: u64,
    pub failures: Vec<TaskFailure>,
}

impl DownloadReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    fn record(&mut self, outcome: TaskOutcome) {
        if outcome.cached {
            self.cached += 1;
        } else {
            self.downloaded += 1;
            self.bytes_transferred += outcome.bytes;
        }
        self.derivatives += outcome.derivatives;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub url: String,
    pub local_path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct TaskOutcome {
    cached: bool,
    bytes: u64,
    derivatives: usize,
}

/// Materializes [`MediaDownload`] tasks into a destination directory.
pub struct MediaDownloader {
    client: Arc<dyn MediaClient>,
    options: DownloaderConfig,
    logger: Logger,
}

impl MediaDownloader {
    pub fn new(client: Arc<dyn MediaClient>, options: DownloaderConfig, logger: Logger) -> Self {
        Self {
            client,
            options,
            logger,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.options.max_timeout_ms)
    }

    fn keep_pattern(&self) -> Result<Option<glob::Pattern>> {
        self.options
            .keep
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| AppError::config(format!("invalid keep pattern: {e}")))
    }

    /// Run one batch: stage every unique task under `temp`, then commit the
    /// staging tree over `destination`.
    ///
    /// With `abort_on_error` the first task failure fails the batch and the
    /// destination is left untouched. Otherwise failures are collected into
    /// the report. Staging is removed on every exit path.
    pub async fn sync(
        &self,
        tasks: Vec<MediaDownload>,
        destination: &Path,
        temp: &Path,
    ) -> Result<DownloadReport> {
        let requested = tasks.len();
        let tasks = dedup_downloads(tasks);
        let mut report = DownloadReport {
            requested,
            unique: tasks.len(),
            ..Default::default()
        };
        self.logger.info(&format!(
            "{} media task(s), {} unique -> {}",
            requested,
            report.unique,
            destination.display()
        ));

        if let Err(e) = self.stage_and_commit(tasks, destination, temp, &mut report).await {
            if let Err(cleanup) = remove_dir_if_exists(temp).await {
                self.logger.warn(&format!(
                    "Could not remove staging {}: {}",
                    temp.display(),
                    cleanup
                ));
            }
            return Err(e);
        }

        self.log_summary(&report);
        Ok(report)
    }

    async fn stage_and_commit(
        &self,
        tasks: Vec<MediaDownload>,
        destination: &Path,
        temp: &Path,
        report: &mut DownloadReport,
    ) -> Result<()> {
        if self.options.force_clear_temp_files && remove_dir_if_exists(temp).await? {
            self.logger.debug(&format!("Cleared stale staging {}", temp.display()));
        }
        tokio::fs::create_dir_all(temp).await?;

        self.run_pool(tasks, destination, temp, report).await?;
        self.commit(destination, temp).await
    }

    /// Process tasks `max_concurrent` at a time. Returning early drops the
    /// stream, which cancels every task not yet settled.
    async fn run_pool(
        &self,
        tasks: Vec<MediaDownload>,
        destination: &Path,
        temp: &Path,
        report: &mut DownloadReport,
    ) -> Result<()> {
        let abort_on_error = self.options.abort_on_error;
        let mut results = stream::iter(self.group_by_target(tasks))
            .map(|group| async move {
                let mut settled = Vec::with_capacity(group.len());
                for task in group {
                    let result = self.process(&task, destination, temp).await;
                    let stop = abort_on_error && result.is_err();
                    settled.push((task, result));
                    if stop {
                        break;
                    }
                }
                settled
            })
            .buffer_unordered(self.options.max_concurrent.max(1))
            .flat_map(stream::iter);

        while let Some((task, result)) = results.next().await {
            match result {
                Ok(outcome) => report.record(outcome),
                Err(e) if self.options.abort_on_error => {
                    self.logger.error(&format!("Aborting batch: {e}"));
                    return Err(e);
                }
                Err(e) => {
                    self.logger.warn(&e.to_string());
                    report.failures.push(TaskFailure {
                        url: task.url,
                        local_path: task.local_path,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Group tasks writing the same destination path. A group runs one task
    /// after another in input order, so the last task wins.
    fn group_by_target(&self, tasks: Vec<MediaDownload>) -> Vec<Vec<MediaDownload>> {
        let mut groups: Vec<Vec<MediaDownload>> = Vec::with_capacity(tasks.len());
        let mut by_target: HashMap<PathBuf, usize> = HashMap::new();

        for task in tasks {
            // invalid targets fail on their own inside the pool
            let Ok(target) = self.relative_target(&task) else {
                groups.push(vec![task]);
                continue;
            };
            match by_target.get(&target) {
                Some(&index) => {
                    self.logger.warn(&format!(
                        "{} and {} both write {}, the later one wins",
                        groups[index][0].url,
                        task.url,
                        target.display()
                    ));
                    groups[index].push(task);
                }
                None => {
                    by_target.insert(target, groups.len());
                    groups.push(vec![task]);
                }
            }
        }
        groups
    }

    /// Destination-relative path for a task, with `strip` applied.
    fn relative_target(&self, task: &MediaDownload) -> Result<PathBuf> {
        let mut path = task.local_path.to_string_lossy().replace('\\', "/");
        if let Some(strip) = self.options.strip.as_deref().filter(|s| !s.is_empty()) {
            path = path.replace(strip, "");
        }
        let relative = relative_path(&path);
        if relative.as_os_str().is_empty() {
            return Err(AppError::media(&task.url, "empty local path"));
        }
        Ok(relative)
    }

    async fn process(&self, task: &MediaDownload, destination: &Path, temp: &Path) -> Result<TaskOutcome> {
        self.process_inner(task, destination, temp)
            .await
            .map_err(|e| match e {
                AppError::Media { .. } => e,
                other => AppError::media(&task.url, other),
            })
    }

    async fn process_inner(
        &self,
        task: &MediaDownload,
        destination: &Path,
        temp: &Path,
    ) -> Result<TaskOutcome> {
        let relative = self.relative_target(task)?;
        let escapes = || AppError::media(&task.url, format!("{} escapes its root", relative.display()));
        let dest_path = join_within(destination, &relative).ok_or_else(escapes)?;
        let temp_path = join_within(temp, &relative).ok_or_else(escapes)?;
        if let Some(parent) = temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cached = self.is_cached(&task.url, &dest_path).await;
        let bytes = if cached {
            self.logger.debug(&format!("Cache hit {}", dest_path.display()));
            tokio::fs::copy(&dest_path, &temp_path).await?;
            0
        } else {
            self.logger.debug(&format!("GET {} -> {}", task.url, temp_path.display()));
            let result = match self.client.download(&task.url, &temp_path, self.timeout()).await {
                Ok(0) => Err(AppError::media(&task.url, "empty response body")),
                other => other,
            };
            if result.is_err() {
                // partial files must not reach the commit
                let _ = tokio::fs::remove_file(&temp_path).await;
            }
            result?
        };

        let derivatives = if self.options.skip_derivatives {
            0
        } else {
            derivatives::generate(&temp_path, &self.options.image_transforms)
                .await?
                .len()
        };

        Ok(TaskOutcome {
            cached,
            bytes,
            derivatives,
        })
    }

    /// Whether the file at `dest_path` can be reused.
    ///
    /// With both checks disabled an existing file is always reused without
    /// asking the origin, so a changed remote goes unnoticed until
    /// `ignore_cache` is set. A failed metadata request counts as a change.
    async fn is_cached(&self, url: &str, dest_path: &Path) -> bool {
        if self.options.ignore_cache {
            return false;
        }
        let Ok(local) = tokio::fs::metadata(dest_path).await else {
            return false;
        };
        if !local.is_file() {
            return false;
        }

        let check_modified = self.options.enable_if_modified_since_check;
        let check_length = self.options.enable_content_length_check;
        if !check_modified && !check_length {
            return true;
        }

        let since = if check_modified { local.modified().ok() } else { None };
        let remote = match self.client.head(url, since, self.timeout()).await {
            Ok(remote) => remote,
            Err(e) => {
                self.logger.debug(&format!("Metadata request failed for {url}: {e}"));
                return false;
            }
        };

        let mut remote_is_new = false;
        if check_modified && !remote.not_modified {
            remote_is_new = true;
        }
        if check_length && remote.content_length.is_some_and(|len| len != local.len()) {
            remote_is_new = true;
        }
        !remote_is_new
    }

    async fn commit(&self, destination: &Path, temp: &Path) -> Result<()> {
        if self.options.clear_old_files_on_success {
            let keep = self.keep_pattern()?;
            let removed = clear_dir(destination, keep.as_ref()).await?;
            self.logger
                .debug(&format!("Pruned {} file(s) from {}", removed, destination.display()));
        }
        let copied = copy_dir_all(temp, destination).await?;
        remove_dir_if_exists(temp).await?;
        self.logger
            .debug(&format!("Committed {} file(s) to {}", copied, destination.display()));
        Ok(())
    }

    fn log_summary(&self, report: &DownloadReport) {
        self.logger.summary(
            "Media",
            &[
                ("Unique", report.unique.to_string()),
                ("Downloaded", report.downloaded.to_string()),
                ("Cached", report.cached.to_string()),
                ("Derivatives", report.derivatives.to_string()),
                ("Bytes", report.bytes_transferred.to_string()),
                ("Failed", report.failed().to_string()),
            ],
        );
        for failure in &report.failures {
            self.logger.sub_item(&format!("{} ({})", failure.url, failure.message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeMediaClient;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        dest: PathBuf,
        temp: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dest");
        let temp = tmp.path().join(".tmp/run");
        Fixture {
            _tmp: tmp,
            dest,
            temp,
        }
    }

    fn downloader(client: &Arc<FakeMediaClient>, options: DownloaderConfig) -> MediaDownloader {
        MediaDownloader::new(client.clone(), options, Logger::new("test"))
    }

    fn tasks(urls: &[&str]) -> Vec<MediaDownload> {
        urls.iter().map(|url| MediaDownload::new(*url)).collect()
    }

    #[tokio::test]
    async fn test_duplicates_fetch_once() {
        let fx = fixture();
        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/a.png", b"png"));
        let downloader = downloader(&client, DownloaderConfig::default());

        let report = downloader
            .sync(tasks(&["https://x/a.png", "https://x/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert_eq!(report.requested, 2);
        assert_eq!(report.unique, 1);
        assert_eq!(client.downloads(), vec!["https://x/a.png".to_string()]);
        assert_eq!(std::fs::read(fx.dest.join("a.png")).unwrap(), b"png");
        assert!(!fx.temp.exists());
    }

    #[tokio::test]
    async fn test_resync_is_all_cache_hits() {
        let fx = fixture();
        let client = Arc::new(
            FakeMediaClient::new()
                .with_resource("https://x/a.png", b"aaaa")
                .with_resource("https://x/img/b.png", b"bb"),
        );
        let downloader = downloader(&client, DownloaderConfig::default());
        let batch = tasks(&["https://x/a.png", "https://x/img/b.png"]);

        let first = downloader.sync(batch.clone(), &fx.dest, &fx.temp).await.unwrap();
        assert_eq!(first.downloaded, 2);
        assert_eq!(first.bytes_transferred, 6);

        let second = downloader.sync(batch, &fx.dest, &fx.temp).await.unwrap();
        assert_eq!(second.cached, 2);
        assert_eq!(second.downloaded, 0);
        assert_eq!(second.bytes_transferred, 0);
        assert_eq!(client.downloads().len(), 2);
        assert_eq!(std::fs::read(fx.dest.join("img/b.png")).unwrap(), b"bb");
    }

    #[tokio::test]
    async fn test_content_length_change_forces_download() {
        let fx = fixture();
        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/a.png", b"new body"));
        std::fs::create_dir_all(&fx.dest).unwrap();
        std::fs::write(fx.dest.join("a.png"), b"old").unwrap();
        // local copy is newer than the remote, so the conditional request alone says "not modified"
        let downloader = downloader(&client, DownloaderConfig::default());

        let report = downloader
            .sync(tasks(&["https://x/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(std::fs::read(fx.dest.join("a.png")).unwrap(), b"new body");
    }

    #[tokio::test]
    async fn test_both_checks_disabled_never_asks_origin() {
        let fx = fixture();
        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/a.png", b"remote"));
        std::fs::create_dir_all(&fx.dest).unwrap();
        std::fs::write(fx.dest.join("a.png"), b"local").unwrap();
        let options = DownloaderConfig {
            enable_if_modified_since_check: false,
            enable_content_length_check: false,
            ..Default::default()
        };

        let report = downloader(&client, options)
            .sync(tasks(&["https://x/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert_eq!(report.cached, 1);
        assert_eq!(client.request_count(), 0);
        assert_eq!(std::fs::read(fx.dest.join("a.png")).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_ignore_cache_always_downloads() {
        let fx = fixture();
        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/a.png", b"remote"));
        std::fs::create_dir_all(&fx.dest).unwrap();
        std::fs::write(fx.dest.join("a.png"), b"remote").unwrap();
        let options = DownloaderConfig {
            ignore_cache: true,
            ..Default::default()
        };

        let report = downloader(&client, options)
            .sync(tasks(&["https://x/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(client.head_count(), 0);
    }

    #[tokio::test]
    async fn test_abort_on_error_leaves_destination_untouched() {
        let fx = fixture();
        let client = Arc::new(
            FakeMediaClient::new()
                .with_resource("https://x/a.png", b"fresh a")
                .with_resource("https://x/b.png", b"fresh b"),
        );
        std::fs::create_dir_all(&fx.dest).unwrap();
        std::fs::write(fx.dest.join("existing.txt"), b"keep me").unwrap();
        let options = DownloaderConfig {
            abort_on_error: true,
            max_concurrent: 1,
            ..Default::default()
        };

        let err = downloader(&client, options)
            .sync(
                tasks(&["https://x/a.png", "https://x/missing.png", "https://x/b.png"]),
                &fx.dest,
                &fx.temp,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Media { ref url, .. } if url == "https://x/missing.png"));
        let entries: Vec<_> = std::fs::read_dir(&fx.dest).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read(fx.dest.join("existing.txt")).unwrap(), b"keep me");
        assert!(!fx.temp.exists());
        // queued task after the failure never started
        assert!(!client.downloads().contains(&"https://x/b.png".to_string()));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_without_abort() {
        let fx = fixture();
        let client = Arc::new(
            FakeMediaClient::new()
                .with_resource("https://x/a.png", b"a")
                .with_resource("https://x/empty.png", b""),
        );

        let report = downloader(&client, DownloaderConfig::default())
            .sync(
                tasks(&["https://x/a.png", "https://x/empty.png", "https://x/404.png"]),
                &fx.dest,
                &fx.temp,
            )
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed(), 2);
        assert!(fx.dest.join("a.png").exists());
        assert!(!fx.dest.join("empty.png").exists());
    }

    #[tokio::test]
    async fn test_clear_on_success_honours_keep_and_strip() {
        let fx = fixture();
        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/uploads/a.png", b"a"));
        std::fs::create_dir_all(&fx.dest).unwrap();
        std::fs::write(fx.dest.join("stale.png"), b"old").unwrap();
        std::fs::write(fx.dest.join("index.json"), b"{}").unwrap();
        let options = DownloaderConfig {
            clear_old_files_on_success: true,
            keep: Some("*.json".into()),
            strip: Some("uploads/".into()),
            ..Default::default()
        };

        downloader(&client, options)
            .sync(tasks(&["https://x/uploads/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert!(fx.dest.join("a.png").exists());
        assert!(fx.dest.join("index.json").exists());
        assert!(!fx.dest.join("stale.png").exists());
    }

    #[tokio::test]
    async fn test_force_clear_temp_discards_stale_staging() {
        let fx = fixture();
        std::fs::create_dir_all(&fx.temp).unwrap();
        std::fs::write(fx.temp.join("leftover.bin"), b"x").unwrap();
        let client = Arc::new(FakeMediaClient::new());
        let options = DownloaderConfig {
            force_clear_temp_files: true,
            ..Default::default()
        };

        downloader(&client, options).sync(Vec::new(), &fx.dest, &fx.temp).await.unwrap();

        assert!(!fx.dest.join("leftover.bin").exists());
        assert!(!fx.temp.exists());
    }

    #[tokio::test]
    async fn test_newer_remote_forces_download_without_length_check() {
        let fx = fixture();
        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/a.png", b"old!"));
        std::fs::create_dir_all(&fx.dest).unwrap();
        std::fs::write(fx.dest.join("a.png"), b"old!").unwrap();
        let options = DownloaderConfig {
            enable_content_length_check: false,
            ..Default::default()
        };
        let downloader = downloader(&client, options);

        let unchanged = downloader
            .sync(tasks(&["https://x/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();
        assert_eq!(unchanged.cached, 1);

        // same length, modified after the local copy
        client.set_body("https://x/a.png", b"new!");
        let changed = downloader
            .sync(tasks(&["https://x/a.png"]), &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert_eq!(changed.downloaded, 1);
        assert_eq!(client.head_count(), 2);
        assert_eq!(std::fs::read(fx.dest.join("a.png")).unwrap(), b"new!");
    }

    #[tokio::test]
    async fn test_shared_local_path_runs_in_order() {
        let fx = fixture();
        let client = Arc::new(
            FakeMediaClient::new()
                .with_resource("https://x/one/logo.png", b"a much longer body")
                .with_resource("https://x/two/logo.png", b"short"),
        );
        let batch = vec![
            MediaDownload::with_local_path("https://x/one/logo.png", "logo.png"),
            MediaDownload::with_local_path("https://x/two/logo.png", "logo.png"),
        ];

        let report = downloader(&client, DownloaderConfig::default())
            .sync(batch, &fx.dest, &fx.temp)
            .await
            .unwrap();

        assert_eq!(report.downloaded, 2);
        assert_eq!(
            client.downloads(),
            vec!["https://x/one/logo.png".to_string(), "https://x/two/logo.png".to_string()]
        );
        assert_eq!(std::fs::read(fx.dest.join("logo.png")).unwrap(), b"short");
    }

    #[cfg(feature = "derivatives")]
    #[tokio::test]
    async fn test_derivatives_committed_and_rebuilt_on_cache_hit() {
        use crate::models::ImageTransform;

        let fx = fixture();
        let png = fx._tmp.path().join("source.png");
        image::RgbImage::from_pixel(8, 4, image::Rgb([10, 200, 10]))
            .save(&png)
            .unwrap();
        let original = std::fs::read(&png).unwrap();

        let client = Arc::new(FakeMediaClient::new().with_resource("https://x/img/a.png", &original));
        let options = DownloaderConfig {
            image_transforms: vec![ImageTransform::Resize {
                width: 2,
                height: 2,
                suffix: None,
            }],
            ..Default::default()
        };
        let downloader = downloader(&client, options);
        let batch = tasks(&["https://x/img/a.png"]);

        let first = downloader.sync(batch.clone(), &fx.dest, &fx.temp).await.unwrap();
        assert_eq!(first.downloaded, 1);
        assert_eq!(first.derivatives, 1);
        let thumb = fx.dest.join("img/a-2x2.png");
        let decoded = image::open(&thumb).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2, 2));

        std::fs::remove_file(&thumb).unwrap();
        let second = downloader.sync(batch, &fx.dest, &fx.temp).await.unwrap();

        assert_eq!(second.cached, 1);
        assert_eq!(second.derivatives, 1);
        assert!(thumb.exists());
        assert_eq!(client.downloads().len(), 1);
        assert_eq!(std::fs::read(fx.dest.join("img/a.png")).unwrap(), original);
    }
}
