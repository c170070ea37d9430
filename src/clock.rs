//! Injectable time source so expiry, max-age, and cookie checks never read ambient time.

// self
use crate::_prelude::*;

/// Source of the current instant.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for deterministic tests and simulations.
///
/// Clones share the same instant.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `now`.
	pub fn new(now: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(now)))
	}

	/// Moves the clock to `now`, backwards included.
	pub fn set(&self, now: OffsetDateTime) {
		*self.0.lock() = now;
	}

	/// Advances the clock by `delta`.
	pub fn advance(&self, delta: Duration) {
		let mut guard = self.0.lock();

		*guard += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn manual_clock_moves_both_ways_and_is_shared() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let shared = clock.clone();

		clock.advance(Duration::minutes(5));

		assert_eq!(shared.now(), datetime!(2025-01-01 00:05 UTC));

		shared.set(datetime!(2024-12-31 23:00 UTC));

		assert_eq!(clock.now(), datetime!(2024-12-31 23:00 UTC));
	}

	#[test]
	fn system_clock_tracks_wall_time() {
		let before = OffsetDateTime::now_utc();
		let now = SystemClock.now();

		assert!(now >= before);
	}
}
