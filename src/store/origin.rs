//! Shared resources of one storage origin: the key-value primitive, the cookie jar, and
//! the change broadcast that keeps sibling store instances converging.
//!
//! Instances never lock the shared primitives. Writes are last-write-wins; mirrors
//! converge eventually once the broadcast is drained, with no stronger guarantee.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::broadcast;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	store::{CacheStorage, CookieStore, MemoryCookieJar, MemoryStorage},
};

/// Buffered notifications per subscriber before it is marked lagged.
pub const UPDATE_CHANNEL_CAPACITY: usize = 1_024;

/// What happened to a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheUpdateKind {
	/// A value was written.
	Written,
	/// A value was removed.
	Removed,
	/// The whole namespace was cleared.
	Cleared,
}

/// Change notification published by a store instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheUpdate {
	/// Affected key; empty for [`CacheUpdateKind::Cleared`].
	pub key: String,
	/// What happened.
	pub kind: CacheUpdateKind,
	/// Publishing instance.
	pub instance_id: u64,
	/// Publication instant.
	pub timestamp: OffsetDateTime,
}

/// Resources shared by every store instance of an origin.
#[derive(Clone)]
pub struct StorageOrigin {
	storage: Arc<dyn CacheStorage>,
	cookies: Arc<dyn CookieStore>,
	clock: Arc<dyn Clock>,
	updates: broadcast::Sender<CacheUpdate>,
	next_instance: Arc<AtomicU64>,
}
impl StorageOrigin {
	/// Creates an origin over the provided primitives.
	pub fn new(storage: Arc<dyn CacheStorage>, cookies: Arc<dyn CookieStore>, clock: Arc<dyn Clock>) -> Self {
		let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

		Self { storage, cookies, clock, updates, next_instance: Arc::new(AtomicU64::new(1)) }
	}

	/// In-memory origin driven by `clock`.
	pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
		let cookies = Arc::new(MemoryCookieJar::new(clock.clone()));

		Self::new(Arc::new(MemoryStorage::default()), cookies, clock)
	}

	/// In-memory origin on the wall clock.
	pub fn in_memory_system() -> Self {
		Self::in_memory(Arc::new(SystemClock))
	}

	/// Shared key-value primitive.
	pub fn storage(&self) -> &Arc<dyn CacheStorage> {
		&self.storage
	}

	/// Shared cookie jar.
	pub fn cookies(&self) -> &Arc<dyn CookieStore> {
		&self.cookies
	}

	/// Shared clock.
	pub fn clock(&self) -> &Arc<dyn Clock> {
		&self.clock
	}

	/// Subscribes to change notifications published after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
		self.updates.subscribe()
	}

	/// Publishes a change notification; a no-op when nobody listens.
	pub fn publish(&self, key: &str, kind: CacheUpdateKind, instance_id: u64) {
		let update = CacheUpdate {
			key: key.to_owned(),
			kind,
			instance_id,
			timestamp: self.clock.now(),
		};

		let _ = self.updates.send(update);
	}

	pub(crate) fn next_instance_id(&self) -> u64 {
		self.next_instance.fetch_add(1, Ordering::Relaxed)
	}
}
impl Debug for StorageOrigin {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StorageOrigin")
			.field("subscribers", &self.updates.receiver_count())
			.finish_non_exhaustive()
	}
}
