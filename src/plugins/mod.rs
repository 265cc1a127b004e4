//! Plugin lifecycle hooks.
//!
//! Plugins implement [`Plugin`] and override the hooks they care about; the
//! defaults do nothing. The [`HookDriver`] runs them in registration order.
//!
//! | Event            | Arguments                 | Mode        |
//! |------------------|---------------------------|-------------|
//! | `before_sync`    | -                         | fail-fast   |
//! | `after_fetch`    | source id, `DataStore`    | fail-fast   |
//! | `before_persist` | source id, data files     | fail-fast   |
//! | `after_sync`     | `SyncReport`              | best-effort |
//! | `on_error`       | failure description       | best-effort |

mod driver;
mod signal;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{Config, DataFile};
use crate::pipeline::SyncReport;
use crate::store::DataStore;
use crate::utils::Logger;

pub use driver::HookDriver;
pub use signal::{AbortHandle, AbortSignal, abort_pair};

/// Error returned from a hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a hook.
pub type HookResult = std::result::Result<(), HookError>;

/// Closed set of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeSync,
    AfterFetch,
    BeforePersist,
    AfterSync,
    OnError,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::BeforeSync => "before_sync",
            HookEvent::AfterFetch => "after_fetch",
            HookEvent::BeforePersist => "before_persist",
            HookEvent::AfterSync => "after_sync",
            HookEvent::OnError => "on_error",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base context handed to every hook.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Logger scoped to the plugin
    pub logger: Logger,
    /// Shared cancellation signal; long-running hooks should check it
    pub abort: AbortSignal,
    /// Run configuration
    pub config: Arc<Config>,
}

/// A named set of lifecycle hooks.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn before_sync(&self, _ctx: &PluginContext) -> HookResult {
        Ok(())
    }

    /// Called once a source's documents are in the store.
    async fn after_fetch(
        &self,
        _ctx: &PluginContext,
        _source_id: &str,
        _store: &mut DataStore,
    ) -> HookResult {
        Ok(())
    }

    /// Called with a source's data files right before they are written.
    async fn before_persist(
        &self,
        _ctx: &PluginContext,
        _source_id: &str,
        _files: &mut Vec<DataFile>,
    ) -> HookResult {
        Ok(())
    }

    async fn after_sync(&self, _ctx: &PluginContext, _report: &SyncReport) -> HookResult {
        Ok(())
    }

    async fn on_error(&self, _ctx: &PluginContext, _error: &str) -> HookResult {
        Ok(())
    }
}
