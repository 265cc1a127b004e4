// src/pipeline/sync.rs

//! Sync orchestration.
//!
//! Sources run one after another. For each: snapshot the destination, fetch
//! into the store, download media, transform and persist data files. With
//! `backup_and_restore` the first failing source restores every snapshot and
//! ends the run; without it the failure stays with that source. Staging and
//! backup roots are removed at the end either way.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use super::backup::BackupSet;
use crate::config::{RunPaths, SourcePaths};
use crate::error::{AppError, Result};
use crate::media::{DownloadReport, HttpMediaClient, MediaClient, MediaDownloader};
use crate::models::{Config, DataFile};
use crate::plugins::{AbortSignal, HookDriver, Plugin};
use crate::services::{HttpJsonSource, Source, SourceContext};
use crate::storage::{LocalStorage, clear_dir, persist_data_files, remove_dir_if_exists};
use crate::store::DataStore;
use crate::transform::{ContentTransform, build_transforms};
use crate::utils::Logger;
use crate::utils::http::create_async_client;

/// What happened to one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub documents: usize,
    pub data_files: usize,
    pub media: Option<DownloadReport>,
    /// Data files a transform left unmodified
    pub transform_failures: Vec<String>,
    pub error: Option<String>,
}

impl SourceOutcome {
    fn failed(source_id: &str, error: &AppError) -> Self {
        Self {
            source_id: source_id.to_string(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of one run, handed to `after_sync` hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceOutcome>,
    /// Snapshots were restored after a failure
    pub restored: bool,
    /// The run stopped early on the abort signal
    pub aborted: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        !self.aborted && self.sources.iter().all(SourceOutcome::is_success)
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.sources.iter().filter(|s| !s.is_success())
    }
}

/// Drives sources, plugins and the downloader through one run.
pub struct SyncOrchestrator {
    config: Arc<Config>,
    sources: Vec<Arc<dyn Source>>,
    plugins: Vec<Arc<dyn Plugin>>,
    media: Arc<dyn MediaClient>,
    transforms: Vec<ContentTransform>,
    abort: AbortSignal,
    logger: Logger,
}

impl SyncOrchestrator {
    /// Orchestrator without sources or plugins. The configuration must
    /// already be validated.
    pub fn new(config: Arc<Config>, media: Arc<dyn MediaClient>, logger: Logger) -> Result<Self> {
        let transforms = build_transforms(&config.transforms, &config.downloader)?;
        Ok(Self {
            config,
            sources: Vec::new(),
            plugins: Vec::new(),
            media,
            transforms,
            abort: AbortSignal::never(),
            logger,
        })
    }

    /// Orchestrator wired to the HTTP sources of `config`.
    pub fn from_config(config: Config, logger: Logger) -> Result<Self> {
        config.validate()?;
        let client = create_async_client(&config.http)?;
        let sources = config
            .sources
            .iter()
            .map(|source| {
                HttpJsonSource::new(source.clone(), client.clone())
                    .map(|s| Arc::new(s) as Arc<dyn Source>)
                    .map_err(|e| AppError::from_source(&source.id, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let media = Arc::new(HttpMediaClient::new(client));
        Ok(Self::new(Arc::new(config), media, logger)?.with_sources(sources))
    }

    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn Source>>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Run every source once.
    ///
    /// Source failures are reported in the returned [`SyncReport`], not as
    /// an error. Errors are reserved for path resolution and a failing
    /// `before_sync` hook.
    pub async fn run(&self) -> Result<SyncReport> {
        let started_at = Utc::now();
        let paths = RunPaths::resolve(&self.config.paths, started_at)?;
        let hooks = HookDriver::new(
            self.plugins.clone(),
            self.abort.clone(),
            Arc::clone(&self.config),
            self.logger.clone(),
        );

        self.logger.header("Content sync");
        let mut report = SyncReport {
            started_at,
            ..Default::default()
        };

        if let Err(e) = hooks.before_sync().await {
            let error = AppError::from(e);
            hooks.on_error(&error.to_string()).await;
            return Err(error);
        }

        let mut store = DataStore::new();
        let mut backups = BackupSet::new();
        let total = self.sources.len();

        for (index, source) in self.sources.iter().enumerate() {
            if self.abort.is_aborted() {
                self.logger.warn("Abort requested, skipping remaining sources");
                let error = AppError::Aborted;
                hooks.on_error(&error.to_string()).await;
                report.sources.extend(
                    self.sources[index..]
                        .iter()
                        .map(|skipped| SourceOutcome::failed(skipped.id(), &error)),
                );
                report.aborted = true;
                break;
            }

            let source_id = source.id();
            self.logger.step(index + 1, total, &format!("Syncing '{source_id}'"));
            let source_paths = paths.for_source(source_id);

            let result = self
                .sync_source(source.as_ref(), &source_paths, &mut store, &mut backups, &hooks)
                .await;
            match result {
                Ok(outcome) => report.sources.push(outcome),
                Err(e) => {
                    self.logger.error(&format!("Source '{source_id}' failed: {e}"));
                    hooks.on_error(&format!("source '{source_id}': {e}")).await;
                    report.sources.push(SourceOutcome::failed(source_id, &e));

                    if self.config.backup_and_restore {
                        self.logger.warn("Restoring every source from backup");
                        if let Err(e) = backups.restore_all(&self.logger).await {
                            hooks.on_error(&format!("restore: {e}")).await;
                        }
                        report.restored = true;
                        break;
                    }
                }
            }
        }

        self.cleanup(&paths).await;
        report.finished_at = Utc::now();
        hooks.after_sync(&report).await;
        self.log_summary(&report);

        Ok(report)
    }

    async fn sync_source(
        &self,
        source: &dyn Source,
        paths: &SourcePaths,
        store: &mut DataStore,
        backups: &mut BackupSet,
        hooks: &HookDriver,
    ) -> Result<SourceOutcome> {
        let source_id = source.id();
        let logger = self.logger.child(source_id);
        let options = &self.config.downloader;

        if self.config.backup_and_restore {
            backups.snapshot(source_id, paths).await?;
        }
        if options.clear_old_files_on_start {
            let keep = options.keep.as_deref().map(glob::Pattern::new).transpose().map_err(|e| {
                AppError::config(format!("invalid keep pattern: {e}"))
            })?;
            let removed = clear_dir(&paths.destination, keep.as_ref()).await?;
            logger.debug(&format!("Pruned {removed} file(s) before fetching"));
        }

        let documents = self.fetch_into_store(source, store, &logger).await?;
        hooks.after_fetch(source_id, store).await?;

        let content = source
            .content(store.namespace(source_id)?)
            .map_err(|e| AppError::from_source(source_id, e))?;

        let downloader =
            MediaDownloader::new(Arc::clone(&self.media), options.clone(), logger.child("media"));
        let media = downloader
            .sync(content.media_downloads, &paths.destination, &paths.temp)
            .await?;

        let mut data_files = content.data_files;
        let transform_failures = self.apply_transforms(source_id, &mut data_files, &logger);

        hooks.before_persist(source_id, &mut data_files).await?;
        let storage = LocalStorage::new(&paths.destination);
        let written = persist_data_files(&storage, &data_files).await?;
        logger.success(&format!(
            "{} document(s), {} data file(s) -> {}",
            documents,
            written,
            storage.root().display()
        ));

        Ok(SourceOutcome {
            source_id: source_id.to_string(),
            documents,
            data_files: written,
            media: Some(media),
            transform_failures,
            error: None,
        })
    }

    /// Run every query of the source and load the documents into a new
    /// namespace. Queries resolve concurrently; documents land in query order.
    async fn fetch_into_store(
        &self,
        source: &dyn Source,
        store: &mut DataStore,
        logger: &Logger,
    ) -> Result<usize> {
        let source_id = source.id();
        let queries = {
            let ctx = SourceContext {
                logger: logger.clone(),
                config: &self.config,
                store: &*store,
            };
            source
                .fetch(&ctx)
                .await
                .map_err(|e| AppError::from_source(source_id, e))?
        };

        let results = join_all(queries.into_iter().map(|query| async move {
            (query.id, query.data.await)
        }))
        .await;

        let namespace = store.create_namespace(source_id)?;
        for (query_id, result) in results {
            let documents = result.map_err(|e| AppError::from_source(source_id, e))?;
            logger.debug(&format!("Query '{}' returned {} document(s)", query_id, documents.len()));
            for document in documents {
                namespace.update(document.id, document.data);
            }
        }
        Ok(namespace.len())
    }

    fn apply_transforms(&self, source_id: &str, files: &mut [DataFile], logger: &Logger) -> Vec<String> {
        let mut failed = Vec::new();
        for transform in self.transforms.iter().filter(|t| t.applies_to_source(source_id)) {
            let report = transform.apply_to_data_files(files, logger);
            logger.debug(&format!(
                "Transform {} rewrote {} node(s) in {} file(s)",
                transform.path(),
                report.nodes,
                report.targets
            ));
            failed.extend(report.failed);
        }
        failed
    }

    async fn cleanup(&self, paths: &RunPaths) {
        for dir in [&paths.temp, &paths.backup] {
            if let Err(e) = remove_dir_if_exists(dir).await {
                self.logger.warn(&format!("Could not remove {}: {}", dir.display(), e));
            }
        }
    }

    fn log_summary(&self, report: &SyncReport) {
        let failed = report.failed_sources().count();
        let elapsed = report.finished_at - report.started_at;
        self.logger.summary(
            "Sync",
            &[
                ("Sources", report.sources.len().to_string()),
                ("Failed", failed.to_string()),
                ("Restored", report.restored.to_string()),
                ("Elapsed", format!("{}ms", elapsed.num_milliseconds())),
            ],
        );
        for outcome in report.failed_sources() {
            self.logger.sub_item(&format!(
                "{}: {}",
                outcome.source_id,
                outcome.error.as_deref().unwrap_or_default()
            ));
        }
        if report.is_success() {
            self.logger.success("Sync complete");
        }
    }
}
