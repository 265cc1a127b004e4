//! Sequential hook execution.

use std::sync::Arc;

use super::{AbortSignal, HookEvent, HookResult, Plugin, PluginContext};
use crate::error::PluginError;
use crate::models::{Config, DataFile};
use crate::pipeline::SyncReport;
use crate::store::DataStore;
use crate::utils::Logger;

/// Runs plugin hooks in registration order.
///
/// Fail-fast events stop at the first failing plugin and return its
/// [`PluginError`]. Best-effort events run every plugin and return all
/// failures.
pub struct HookDriver {
    plugins: Vec<Arc<dyn Plugin>>,
    abort: AbortSignal,
    config: Arc<Config>,
    logger: Logger,
}

impl HookDriver {
    pub fn new(
        plugins: Vec<Arc<dyn Plugin>>,
        abort: AbortSignal,
        config: Arc<Config>,
        logger: Logger,
    ) -> Self {
        Self {
            plugins,
            abort,
            config,
            logger,
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn context(&self, plugin: &dyn Plugin) -> PluginContext {
        PluginContext {
            logger: self.logger.child(&format!("plugin::{}", plugin.name())),
            abort: self.abort.clone(),
            config: Arc::clone(&self.config),
        }
    }

    /// Convert a hook result into a tagged error, logging failures.
    fn check(&self, plugin: &dyn Plugin, event: HookEvent, result: HookResult) -> Result<(), PluginError> {
        result.map_err(|e| {
            let error = PluginError {
                plugin: plugin.name().to_string(),
                event: event.to_string(),
                message: e.to_string(),
            };
            self.logger.error(&error.to_string());
            error
        })
    }

    pub async fn before_sync(&self) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            let ctx = self.context(plugin.as_ref());
            let result = plugin.before_sync(&ctx).await;
            self.check(plugin.as_ref(), HookEvent::BeforeSync, result)?;
        }
        Ok(())
    }

    pub async fn after_fetch(&self, source_id: &str, store: &mut DataStore) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            let ctx = self.context(plugin.as_ref());
            let result = plugin.after_fetch(&ctx, source_id, store).await;
            self.check(plugin.as_ref(), HookEvent::AfterFetch, result)?;
        }
        Ok(())
    }

    pub async fn before_persist(
        &self,
        source_id: &str,
        files: &mut Vec<DataFile>,
    ) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            let ctx = self.context(plugin.as_ref());
            let result = plugin.before_persist(&ctx, source_id, files).await;
            self.check(plugin.as_ref(), HookEvent::BeforePersist, result)?;
        }
        Ok(())
    }

    /// Best-effort: every plugin runs.
    pub async fn after_sync(&self, report: &SyncReport) -> Vec<PluginError> {
        let mut failures = Vec::new();
        for plugin in &self.plugins {
            let ctx = self.context(plugin.as_ref());
            let result = plugin.after_sync(&ctx, report).await;
            if let Err(e) = self.check(plugin.as_ref(), HookEvent::AfterSync, result) {
                failures.push(e);
            }
        }
        failures
    }

    /// Best-effort: every plugin runs.
    pub async fn on_error(&self, error: &str) -> Vec<PluginError> {
        let mut failures = Vec::new();
        for plugin in &self.plugins {
            let ctx = self.context(plugin.as_ref());
            let result = plugin.on_error(&ctx, error).await;
            if let Err(e) = self.check(plugin.as_ref(), HookEvent::OnError, result) {
                failures.push(e);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        name: String,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn new(name: &str, fail: bool, calls: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Plugin> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                calls: Arc::clone(calls),
            })
        }

        fn record(&self, event: &str) -> HookResult {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, event));
            if self.fail {
                Err(format!("{} exploded", self.name).into())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn before_sync(&self, _ctx: &PluginContext) -> HookResult {
            self.record("before_sync")
        }

        async fn after_fetch(
            &self,
            _ctx: &PluginContext,
            source_id: &str,
            store: &mut DataStore,
        ) -> HookResult {
            store
                .update(source_id, format!("seen-by-{}", self.name), json!(true))
                .map_err(|e| e.to_string())?;
            self.record("after_fetch")
        }

        async fn after_sync(&self, _ctx: &PluginContext, _report: &SyncReport) -> HookResult {
            self.record("after_sync")
        }
    }

    fn driver(plugins: Vec<Arc<dyn Plugin>>) -> HookDriver {
        HookDriver::new(
            plugins,
            AbortSignal::never(),
            Arc::new(Config::default()),
            Logger::new("test"),
        )
    }

    #[tokio::test]
    async fn test_fail_fast_halts_remaining_plugins() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let driver = driver(vec![
            Recorder::new("p1", true, &calls),
            Recorder::new("p2", false, &calls),
            Recorder::new("p3", false, &calls),
        ]);

        let err = driver.before_sync().await.unwrap_err();

        assert_eq!(err.plugin, "p1");
        assert_eq!(err.event, "before_sync");
        assert_eq!(err.message, "p1 exploded");
        assert_eq!(*calls.lock().unwrap(), vec!["p1:before_sync".to_string()]);
    }

    #[tokio::test]
    async fn test_best_effort_runs_every_plugin() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let driver = driver(vec![
            Recorder::new("p1", true, &calls),
            Recorder::new("p2", false, &calls),
            Recorder::new("p3", true, &calls),
        ]);

        let failures = driver.after_sync(&SyncReport::default()).await;

        assert_eq!(failures.len(), 2);
        assert_eq!(calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_hooks_receive_store_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let driver = driver(vec![
            Recorder::new("a", false, &calls),
            Recorder::new("b", false, &calls),
        ]);
        let mut store = DataStore::new();
        store.create_namespace("posts").unwrap();

        driver.after_fetch("posts", &mut store).await.unwrap();

        let ids: Vec<_> = store.documents("posts").unwrap().map(|d| d.id().to_string()).collect();
        assert_eq!(ids, vec!["seen-by-a", "seen-by-b"]);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["a:after_fetch".to_string(), "b:after_fetch".to_string()]
        );
    }

    #[tokio::test]
    async fn test_plugins_without_hooks_are_skipped() {
        struct Quiet;
        #[async_trait]
        impl Plugin for Quiet {
            fn name(&self) -> &str {
                "quiet"
            }
        }

        let driver = driver(vec![Arc::new(Quiet)]);
        assert!(driver.before_sync().await.is_ok());
        assert!(driver.on_error("boom").await.is_empty());
    }
}
