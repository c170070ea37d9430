//! Thread-safe in-memory [`CacheStorage`] for tests, demos, and as a shared origin primitive.

// self
use crate::{
	_prelude::*,
	store::{CacheStorage, StoreError},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps entries in-process.
///
/// Clones share the same map, so one instance can back several encrypted stores the
/// way a browser origin's local storage backs several tabs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(StoreMap);
impl MemoryStorage {
	/// Number of entries currently stored.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl CacheStorage for MemoryStorage {
	fn get_item(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove_item(&self, key: &str) {
		self.0.write().remove(key);
	}

	fn get_keys(&self) -> Vec<String> {
		self.0.read().keys().cloned().collect()
	}

	fn contains_key(&self, key: &str) -> bool {
		self.0.read().contains_key(key)
	}

	fn clear(&self) {
		self.0.write().clear();
	}
}
