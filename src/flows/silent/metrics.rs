// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for silent cache lookups.
#[derive(Debug, Default)]
pub struct SilentFlowMetrics {
	attempts: AtomicU64,
	cache_hits: AtomicU64,
	refresh_required: AtomicU64,
	failures: AtomicU64,
}
impl SilentFlowMetrics {
	/// Returns the total number of cache lookups.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups served from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups that asked the caller to refresh.
	pub fn refresh_required(&self) -> u64 {
		self.refresh_required.load(Ordering::Relaxed)
	}

	/// Returns the number of lookups that failed with a request error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_required(&self) {
		self.refresh_required.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
