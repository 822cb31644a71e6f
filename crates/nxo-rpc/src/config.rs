//! Channel configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use nxo_rpc::RpcConfig;
//!
//! pub static CONFIG: RpcConfig = RpcConfig::new()
//!     .with_call_timeout(Some(Duration::from_secs(2)))
//!     .with_max_outstanding_calls(64);
//! ```

use std::time::Duration;

/// Timing and capacity settings for an [`RpcChannel`](crate::RpcChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcConfig {
    /// How long a caller waits for a result before the call resolves to
    /// [`CallError::TimedOut`](crate::CallError::TimedOut). `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// First delay before an unanswered call's poll is resent.
    /// `None` disables resending.
    pub poll_interval: Option<Duration>,
    /// Upper bound for the doubling poll backoff.
    pub max_poll_interval: Duration,
    /// Maximum number of calls that may be unresolved or unclaimed at once.
    pub max_outstanding_calls: usize,
    /// How long a settled result waits for a poll before it is dropped.
    /// `None` keeps it forever.
    pub pending_result_ttl: Option<Duration>,
    /// Send results as soon as they settle instead of waiting for a poll.
    pub push_results: bool,
}

impl RpcConfig {
    /// Default call timeout.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default initial poll resend interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
    /// Default ceiling for the poll backoff.
    pub const DEFAULT_MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Default outstanding call limit.
    pub const DEFAULT_MAX_OUTSTANDING_CALLS: usize = 1024;
    /// Default lifetime of an unpolled result.
    pub const DEFAULT_PENDING_RESULT_TTL: Duration = Duration::from_secs(60);

    /// Bare poll-driven protocol: no timeouts, no resends, no eviction and
    /// results only leave the callee when a poll asks for them.
    pub const REFERENCE: Self = Self {
        call_timeout: None,
        poll_interval: None,
        max_poll_interval: Self::DEFAULT_MAX_POLL_INTERVAL,
        max_outstanding_calls: usize::MAX,
        pending_result_ttl: None,
        push_results: false,
    };

    /// Create a configuration with default values.
    pub const fn new() -> Self {
        Self {
            call_timeout: Some(Self::DEFAULT_CALL_TIMEOUT),
            poll_interval: Some(Self::DEFAULT_POLL_INTERVAL),
            max_poll_interval: Self::DEFAULT_MAX_POLL_INTERVAL,
            max_outstanding_calls: Self::DEFAULT_MAX_OUTSTANDING_CALLS,
            pending_result_ttl: Some(Self::DEFAULT_PENDING_RESULT_TTL),
            push_results: true,
        }
    }

    /// Set the call timeout.
    pub const fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the initial poll resend interval.
    pub const fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the poll backoff ceiling.
    pub const fn with_max_poll_interval(mut self, interval: Duration) -> Self {
        self.max_poll_interval = interval;
        self
    }

    /// Set the outstanding call limit.
    pub const fn with_max_outstanding_calls(mut self, limit: usize) -> Self {
        self.max_outstanding_calls = limit;
        self
    }

    /// Set the lifetime of unpolled results.
    pub const fn with_pending_result_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.pending_result_ttl = ttl;
        self
    }

    /// Enable or disable pushing results on settlement.
    pub const fn with_push_results(mut self, push: bool) -> Self {
        self.push_results = push;
        self
    }

    /// Next poll delay after `current`, doubled and capped.
    pub(crate) fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_poll_interval)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RpcConfig::default();
        assert_eq!(config.call_timeout, Some(RpcConfig::DEFAULT_CALL_TIMEOUT));
        assert_eq!(config.poll_interval, Some(RpcConfig::DEFAULT_POLL_INTERVAL));
        assert!(config.push_results);
    }

    #[test]
    fn test_reference_disables_robustness() {
        let config = RpcConfig::REFERENCE;
        assert_eq!(config.call_timeout, None);
        assert_eq!(config.poll_interval, None);
        assert_eq!(config.pending_result_ttl, None);
        assert!(!config.push_results);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RpcConfig::new().with_max_poll_interval(Duration::from_millis(300));
        let first = Duration::from_millis(100);
        let second = config.next_backoff(first);
        assert_eq!(second, Duration::from_millis(200));
        assert_eq!(config.next_backoff(second), Duration::from_millis(300));
        assert_eq!(
            config.next_backoff(Duration::from_millis(300)),
            Duration::from_millis(300)
        );
    }
}
