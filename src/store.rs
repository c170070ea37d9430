//! Storage contracts and built-in backends consumed by the credential cache.
//!
//! [`CacheStorage`] is the key-value contract the cache writes through. Plain items
//! (`get_item`/`set_item`) carry non-sensitive metadata such as the key-index
//! registries; user data (`get_user_data`/`set_user_data`) carries credential
//! material and is encrypted by [`EncryptedStore`]. Unencrypted backends treat both
//! surfaces the same.

pub mod cookie;
pub mod crypto;
pub mod encrypted;
pub mod file;
pub mod memory;
pub mod origin;

pub use cookie::{CookieStore, MemoryCookieJar};
pub use encrypted::EncryptedStore;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use origin::{CacheUpdate, CacheUpdateKind, StorageOrigin};

// self
use crate::_prelude::*;

/// Key-value backend contract used by [`CredentialStore`](crate::cache::CredentialStore).
pub trait CacheStorage
where
	Self: Send + Sync,
{
	/// Reads a plain (unencrypted) item.
	fn get_item(&self, key: &str) -> Option<String>;

	/// Writes a plain (unencrypted) item.
	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Reads sensitive user data; encrypted backends serve it from their plaintext mirror.
	fn get_user_data(&self, key: &str) -> Option<String> {
		self.get_item(key)
	}

	/// Writes sensitive user data.
	fn set_user_data(&self, key: &str, value: &str, correlation_id: &str) -> Result<(), StoreError> {
		let _ = correlation_id;

		self.set_item(key, value)
	}

	/// Removes an entry from every layer of the backend.
	fn remove_item(&self, key: &str);

	/// Lists every key currently held by the backend.
	fn get_keys(&self) -> Vec<String>;

	/// Returns true if the backend holds `key`.
	fn contains_key(&self, key: &str) -> bool;

	/// Removes every entry.
	fn clear(&self);
}

/// Error type produced by [`CacheStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Encrypted writes were attempted before `initialize`.
	#[error("Encrypted store has not been initialized.")]
	NotInitialized,
}
