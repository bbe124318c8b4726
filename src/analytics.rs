use std::sync::Mutex;

use indexmap::IndexMap;
use serde_json::Value;

use crate::errors::FactoryError;

/// One analytics data-extension row, keyed by column name.
pub type AnalyticsRow = serde_json::Map<String, Value>;

/// Engine-facing interface to the remote analytics platform.
///
/// Implementations are synchronous, like [`RemoteStore`]. The factory only
/// talks to analytics when verification or subscriber cleanup is requested.
///
/// [`RemoteStore`]: crate::store::RemoteStore
pub trait AnalyticsStore: Send + Sync {
    /// Fetches the rows of `extension` whose `filter_column` equals
    /// `filter_value`. An extension that does not exist yields an empty
    /// vec, not an error.
    fn fetch_rows(
        &self,
        extension: &str,
        filter_column: &str,
        filter_value: &str,
    ) -> Result<Vec<AnalyticsRow>, FactoryError>;

    /// Starts the automation called `name`. Returns `false` when no such
    /// automation exists.
    fn run_automation(&self, name: &str) -> Result<bool, FactoryError>;

    /// Removes every row from `extension`.
    fn clear_extension(&self, extension: &str) -> Result<(), FactoryError>;

    /// Deletes the subscriber identified by `key`. Returns `false` when
    /// the subscriber was not present.
    fn delete_subscriber(&self, key: &str) -> Result<bool, FactoryError>;
}

#[derive(Debug, Default)]
struct AnalyticsInner {
    extensions: IndexMap<String, Vec<AnalyticsRow>>,
    automations: Vec<String>,
    started: Vec<String>,
    subscribers: Vec<String>,
    fail_calls: usize,
}

impl AnalyticsInner {
    fn take_failure(&mut self, operation: &str) -> Option<FactoryError> {
        if self.fail_calls == 0 {
            return None;
        }
        self.fail_calls -= 1;
        Some(FactoryError::Analytics(format!(
            "scripted failure during {operation}"
        )))
    }
}

/// In-memory analytics backend for tests and offline verification runs.
#[derive(Debug, Default)]
pub struct InMemoryAnalytics {
    inner: Mutex<AnalyticsInner>,
}

impl InMemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row to `extension`, creating the extension if needed.
    pub fn preload_row(&self, extension: &str, row: AnalyticsRow) {
        let mut inner = self.inner.lock().expect("analytics mutex poisoned");
        inner
            .extensions
            .entry(extension.to_string())
            .or_default()
            .push(row);
    }

    /// Registers an automation that `run_automation` will find.
    pub fn with_automation(self, name: &str) -> Self {
        self.inner
            .lock()
            .expect("analytics mutex poisoned")
            .automations
            .push(name.to_string());
        self
    }

    /// Registers a subscriber key that `delete_subscriber` can remove.
    pub fn preload_subscriber(&self, key: &str) {
        let mut inner = self.inner.lock().expect("analytics mutex poisoned");
        inner.subscribers.push(key.to_string());
    }

    /// Makes the next `count` calls fail at the transport level.
    pub fn fail_next_calls(&self, count: usize) {
        self.inner
            .lock()
            .expect("analytics mutex poisoned")
            .fail_calls = count;
    }

    /// Names of automations started so far, in start order.
    pub fn started(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("analytics mutex poisoned")
            .started
            .clone()
    }

    /// Number of rows currently held by `extension`.
    pub fn row_count(&self, extension: &str) -> usize {
        let inner = self.inner.lock().expect("analytics mutex poisoned");
        inner.extensions.get(extension).map(Vec::len).unwrap_or(0)
    }

    /// Subscriber keys still present.
    pub fn subscribers(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("analytics mutex poisoned")
            .subscribers
            .clone()
    }
}

impl AnalyticsStore for InMemoryAnalytics {
    fn fetch_rows(
        &self,
        extension: &str,
        filter_column: &str,
        filter_value: &str,
    ) -> Result<Vec<AnalyticsRow>, FactoryError> {
        let mut inner = self.inner.lock().expect("analytics mutex poisoned");
        if let Some(error) = inner.take_failure("fetch_rows") {
            return Err(error);
        }
        let Some(rows) = inner.extensions.get(extension) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .iter()
            .filter(|row| {
                row.get(filter_column).and_then(Value::as_str) == Some(filter_value)
            })
            .cloned()
            .collect())
    }

    fn run_automation(&self, name: &str) -> Result<bool, FactoryError> {
        let mut inner = self.inner.lock().expect("analytics mutex poisoned");
        if let Some(error) = inner.take_failure("run_automation") {
            return Err(error);
        }
        if !inner.automations.iter().any(|known| known == name) {
            return Ok(false);
        }
        inner.started.push(name.to_string());
        Ok(true)
    }

    fn clear_extension(&self, extension: &str) -> Result<(), FactoryError> {
        let mut inner = self.inner.lock().expect("analytics mutex poisoned");
        if let Some(error) = inner.take_failure("clear_extension") {
            return Err(error);
        }
        if let Some(rows) = inner.extensions.get_mut(extension) {
            rows.clear();
        }
        Ok(())
    }

    fn delete_subscriber(&self, key: &str) -> Result<bool, FactoryError> {
        let mut inner = self.inner.lock().expect("analytics mutex poisoned");
        if let Some(error) = inner.take_failure("delete_subscriber") {
            return Err(error);
        }
        let before = inner.subscribers.len();
        inner.subscribers.retain(|subscriber| subscriber != key);
        Ok(inner.subscribers.len() < before)
    }
}
