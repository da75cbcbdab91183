//! Global atomic counters for the commit pipeline.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the daemon drains).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    requests_received: AtomicU64,
    commits_succeeded: AtomicU64,
    commits_failed: AtomicU64,
    publish_failures: AtomicU64,
    malformed_messages: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            commits_succeeded: AtomicU64::new(0),
            commits_failed: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    /// One inbound message consumed.
    pub fn inc_requests_received(&self) {
        Self::bump(&self.requests_received, "requests_received");
    }

    /// One request terminated with a Success status.
    pub fn inc_commits_succeeded(&self) {
        Self::bump(&self.commits_succeeded, "commits_succeeded");
    }

    /// One request terminated with a Failed status.
    pub fn inc_commits_failed(&self) {
        Self::bump(&self.commits_failed, "commits_failed");
    }

    /// A terminal status could not be published.
    pub fn inc_publish_failures(&self) {
        Self::bump(&self.publish_failures, "publish_failures");
    }

    /// An inbound payload could not be decoded.
    pub fn inc_malformed_messages(&self) {
        Self::bump(&self.malformed_messages, "malformed_messages");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            requests_received = self.requests_received(),
            commits_succeeded = self.commits_succeeded(),
            commits_failed = self.commits_failed(),
            publish_failures = self.publish_failures(),
            malformed_messages = self.malformed_messages(),
        );
    }

    pub fn requests_received(&self) -> u64 {
        self.requests_received.load(Ordering::Relaxed)
    }

    pub fn commits_succeeded(&self) -> u64 {
        self.commits_succeeded.load(Ordering::Relaxed)
    }

    pub fn commits_failed(&self) -> u64 {
        self.commits_failed.load(Ordering::Relaxed)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    pub fn malformed_messages(&self) -> u64 {
        self.malformed_messages.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.requests_received.store(0, Ordering::Relaxed);
        self.commits_succeeded.store(0, Ordering::Relaxed);
        self.commits_failed.store(0, Ordering::Relaxed);
        self.publish_failures.store(0, Ordering::Relaxed);
        self.malformed_messages.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.requests_received(), 0);
        m.inc_requests_received();
        m.inc_requests_received();
        assert_eq!(m.requests_received(), 2);

        m.inc_commits_succeeded();
        m.inc_commits_failed();
        m.inc_commits_failed();
        assert_eq!(m.commits_succeeded(), 1);
        assert_eq!(m.commits_failed(), 2);

        m.inc_publish_failures();
        m.inc_malformed_messages();
        assert_eq!(m.publish_failures(), 1);
        assert_eq!(m.malformed_messages(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_requests_received();
        m.inc_commits_succeeded();
        m.inc_commits_failed();
        m.inc_publish_failures();
        m.inc_malformed_messages();
        m.reset();
        assert_eq!(m.requests_received(), 0);
        assert_eq!(m.commits_succeeded(), 0);
        assert_eq!(m.commits_failed(), 0);
        assert_eq!(m.publish_failures(), 0);
        assert_eq!(m.malformed_messages(), 0);
    }
}
