//! Configuration for the sync engine.

use std::time::Duration;

/// What a drain pass does with an intent the server rejects as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectionPolicy {
    /// Halt the pass, leaving the intent at the head of the queue.
    Halt,
    /// Move the intent to the dead-letter list and continue with the next.
    #[default]
    DeadLetter,
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the expense API (e.g., "https://api.example.com").
    pub api_base_url: String,
    /// Path of the expenses collection.
    pub expenses_path: String,
    /// Path of the categories collection.
    pub categories_path: String,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Handling of permanently rejected intents.
    pub rejection_policy: RejectionPolicy,
    /// Interval for automatic drains, if enabled.
    pub auto_sync_interval: Option<Duration>,
    /// Upper bound on passes a single drain runs for coalesced triggers.
    pub max_passes_per_drain: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            expenses_path: "/api/expenses/".into(),
            categories_path: "/api/categories/".into(),
            request_timeout: Duration::from_secs(30),
            rejection_policy: RejectionPolicy::default(),
            auto_sync_interval: None,
            max_passes_per_drain: 16,
        }
    }

    /// Sets the expenses collection path.
    pub fn with_expenses_path(mut self, path: impl Into<String>) -> Self {
        self.expenses_path = path.into();
        self
    }

    /// Sets the categories collection path.
    pub fn with_categories_path(mut self, path: impl Into<String>) -> Self {
        self.categories_path = path.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the rejection policy.
    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    /// Sets the interval for automatic drains.
    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    /// Sets the pass limit per drain. Values below one are raised to one.
    pub fn with_max_passes_per_drain(mut self, passes: usize) -> Self {
        self.max_passes_per_drain = passes.max(1);
        self
    }

    /// Full URL of the expenses collection.
    pub fn expenses_url(&self) -> String {
        join_url(&self.api_base_url, &self.expenses_path)
    }

    /// Full URL of the categories collection.
    pub fn categories_url(&self) -> String {
        join_url(&self.api_base_url, &self.categories_path)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8000")
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("https://api.example.com")
            .with_timeout(Duration::from_secs(60))
            .with_rejection_policy(RejectionPolicy::Halt)
            .with_auto_sync_interval(Duration::from_secs(300))
            .with_max_passes_per_drain(4);

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.rejection_policy, RejectionPolicy::Halt);
        assert_eq!(config.auto_sync_interval, Some(Duration::from_secs(300)));
        assert_eq!(config.max_passes_per_drain, 4);
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.rejection_policy, RejectionPolicy::DeadLetter);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.auto_sync_interval.is_none());
        assert_eq!(SyncConfig::new("x").with_max_passes_per_drain(0).max_passes_per_drain, 1);
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let config = SyncConfig::new("https://api.example.com/");
        assert_eq!(config.expenses_url(), "https://api.example.com/api/expenses/");
        assert_eq!(config.categories_url(), "https://api.example.com/api/categories/");

        let config = SyncConfig::new("https://api.example.com").with_expenses_path("v2/expenses/");
        assert_eq!(config.expenses_url(), "https://api.example.com/v2/expenses/");
    }
}
