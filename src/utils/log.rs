// src/utils/log.rs

//! Scoped logger with server-style formatting helpers.
//!
//! A [`Logger`] is an explicitly constructed value handed to the orchestrator,
//! the downloader and each plugin. Output goes through the `log` facade with
//! the scope as the target, so `env_logger` filters apply per scope.

/// Logger bound to a scope (`sync`, `media`, `plugin:<name>`, ...).
#[derive(Debug, Clone)]
pub struct Logger {
    scope: String,
}

impl Logger {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    /// Child logger, e.g. `sync` -> `sync::posts`.
    pub fn child(&self, name: &str) -> Self {
        Self::new(format!("{}::{}", self.scope, name))
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn debug(&self, message: &str) {
        log::debug!(target: self.scope.as_str(), "[{}] {}", self.scope, message);
    }

    pub fn info(&self, message: &str) {
        log::info!(target: self.scope.as_str(), "[{}] {}", self.scope, message);
    }

    pub fn warn(&self, message: &str) {
        log::warn!(target: self.scope.as_str(), "[{}] {}", self.scope, message);
    }

    pub fn error(&self, message: &str) {
        log::error!(target: self.scope.as_str(), "[{}] {}", self.scope, message);
    }

    /// Log a success message
    pub fn success(&self, message: &str) {
        self.info(&format!("✓ {message}"));
    }

    /// Log a step in a process
    pub fn step(&self, step_num: usize, total: usize, message: &str) {
        self.info(&format!("[STEP {step_num}/{total}] {message}"));
    }

    /// Log a header
    pub fn header(&self, title: &str) {
        let border = "═".repeat(60);
        self.info(&border);
        self.info(&format!("  {title}"));
        self.info(&border);
    }

    /// Log a sub-item (indented)
    pub fn sub_item(&self, message: &str) {
        self.info(&format!("    {message}"));
    }

    /// Log a summary section
    pub fn summary(&self, title: &str, items: &[(&str, String)]) {
        self.info(&format!("[SUMMARY] {title}"));
        for (key, value) in items {
            self.sub_item(&format!("{key}: {value}"));
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("content_sync")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope() {
        let logger = Logger::new("sync");
        assert_eq!(logger.child("posts").scope(), "sync::posts");
        assert_eq!(Logger::default().scope(), "content_sync");
    }
}
