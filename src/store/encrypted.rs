//! Encrypted, mirrored, cross-instance synchronized [`CacheStorage`].
//!
//! Sensitive values are sealed into [`Envelope`]s in the origin's shared key-value
//! primitive and served from a per-instance plaintext mirror. Every write publishes a
//! [`CacheUpdate`]; instances drain pending updates before each mirror read and rebuild
//! the mirror from storage when their queue lagged. Convergence is eventual only.
//!
//! Decryption and parse faults are logged and treated as missing data.

// crates.io
use tokio::sync::broadcast::{self, error::TryRecvError};
// self
use crate::{
	_prelude::*,
	cache::index,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{
		CacheStorage, CacheUpdate, CacheUpdateKind, StorageOrigin, StoreError,
		cookie::ENCRYPTION_COOKIE,
		crypto::{CryptoError, EncryptionKey, Envelope},
	},
};

/// Encrypted store instance; one per application instance (tab, process, worker).
pub struct EncryptedStore {
	client_id: String,
	origin: StorageOrigin,
	instance_id: u64,
	key: RwLock<Option<EncryptionKey>>,
	mirror: RwLock<HashMap<String, String>>,
	updates: Mutex<broadcast::Receiver<CacheUpdate>>,
}
impl EncryptedStore {
	/// Creates an uninitialized instance attached to `origin`.
	///
	/// Updates published after this call are buffered for the instance, so siblings
	/// writing before [`Self::initialize`] are not missed.
	pub fn new(client_id: impl Into<String>, origin: StorageOrigin) -> Self {
		let updates = Mutex::new(origin.subscribe());
		let instance_id = origin.next_instance_id();

		Self {
			client_id: client_id.into(),
			origin,
			instance_id,
			key: RwLock::new(None),
			mirror: RwLock::new(HashMap::new()),
			updates,
		}
	}

	/// Identifier stamped on updates published by this instance.
	pub fn instance_id(&self) -> u64 {
		self.instance_id
	}

	/// Loads or creates the encryption key and fills the mirror.
	///
	/// With a readable key cookie every envelope in the namespace is decrypted into the
	/// mirror; unreadable entries are skipped. Without one, fresh key material is stored
	/// in the cookie and all existing ciphertext plus the key registries are purged, since
	/// nothing sealed under the lost key can be opened again.
	pub fn initialize(&self, correlation_id: &str) -> Result<(), StoreError> {
		obs::record_flow_outcome(FlowKind::StorageInit, FlowOutcome::Attempt);

		let result = FlowSpan::new(FlowKind::StorageInit, "initialize")
			.with_correlation_id(correlation_id)
			.in_scope(|| self.initialize_inner(correlation_id));

		obs::record_flow_outcome(FlowKind::StorageInit, FlowOutcome::of(&result));

		result
	}

	fn initialize_inner(&self, correlation_id: &str) -> Result<(), StoreError> {
		let cookies = self.origin.cookies();
		let existing = cookies.get(ENCRYPTION_COOKIE).and_then(|value| {
			EncryptionKey::from_cookie_value(&value)
				.map_err(|e| {
					obs::absorbed_fault(FlowKind::StorageInit, "initialize", &format!("{e} Regenerating."));
				})
				.ok()
		});

		match existing {
			Some(key) => {
				*self.key.write() = Some(key);

				self.reload();
				obs::debug_event(
					FlowKind::StorageInit,
					"initialize",
					&format!(
						"Restored {} cache entries (correlation id {correlation_id}).",
						self.mirror.read().len()
					),
				);
			},
			None => {
				let key = EncryptionKey::generate();

				cookies.set(ENCRYPTION_COOKIE, &key.to_cookie_value(), None)?;

				*self.key.write() = Some(key);

				self.purge_namespace();
				self.origin.publish("", CacheUpdateKind::Cleared, self.instance_id);
				obs::debug_event(
					FlowKind::StorageInit,
					"initialize",
					&format!("Generated a new cache key (correlation id {correlation_id})."),
				);
			},
		}

		Ok(())
	}

	/// Returns true once [`Self::initialize`] has installed a key.
	pub fn is_initialized(&self) -> bool {
		self.key.read().is_some()
	}

	/// Applies pending sibling updates to the mirror.
	pub fn sync(&self) {
		let mut pending = Vec::new();
		let mut lagged = false;

		{
			let mut receiver = self.updates.lock();

			loop {
				match receiver.try_recv() {
					Ok(update) if update.instance_id != self.instance_id => pending.push(update),
					Ok(_) => {},
					Err(TryRecvError::Lagged(skipped)) => {
						obs::debug_event(
							FlowKind::StorageInit,
							"sync",
							&format!("Update queue lagged by {skipped}; rebuilding mirror."),
						);

						lagged = true;
					},
					Err(TryRecvError::Empty | TryRecvError::Closed) => break,
				}
			}
		}

		if lagged {
			self.reload();

			return;
		}

		for update in pending {
			self.apply(update);
		}
	}

	fn apply(&self, update: CacheUpdate) {
		match update.kind {
			CacheUpdateKind::Written => {
				let storage = self.origin.storage();
				let Some(raw) = storage.get_item(&update.key) else {
					self.mirror.write().remove(&update.key);

					return;
				};

				match self.open(&update.key, &raw) {
					Ok(plaintext) => {
						self.mirror.write().insert(update.key, plaintext);
					},
					Err(CryptoError::KeyMismatch { .. }) => self.adopt_cookie_key(),
					Err(e) => {
						obs::absorbed_fault(
							FlowKind::StorageInit,
							"sync",
							&format!("Skipping update for {}: {e}", update.key),
						);
						self.mirror.write().remove(&update.key);
					},
				}
			},
			CacheUpdateKind::Removed => {
				self.mirror.write().remove(&update.key);
			},
			CacheUpdateKind::Cleared => self.adopt_cookie_key(),
		}
	}

	// A sibling regenerated the key; follow the cookie and rebuild from storage.
	fn adopt_cookie_key(&self) {
		let current = self.key.read().as_ref().map(|k| k.id().to_owned());
		let cookie = self
			.origin
			.cookies()
			.get(ENCRYPTION_COOKIE)
			.and_then(|value| EncryptionKey::from_cookie_value(&value).ok());

		if let Some(key) = cookie.filter(|k| Some(k.id()) != current.as_deref()) {
			*self.key.write() = Some(key);
		}

		self.reload();
	}

	fn reload(&self) {
		// Updates queued so far are covered by the rebuild.
		{
			let mut receiver = self.updates.lock();

			*receiver = receiver.resubscribe();
		}

		let Some(key) = self.key.read().clone() else {
			self.mirror.write().clear();

			return;
		};
		let storage = self.origin.storage();
		let mut mirror = HashMap::new();

		for entry_key in storage.get_keys() {
			if index::is_registry_key(&entry_key) {
				continue;
			}

			let Some(raw) = storage.get_item(&entry_key) else {
				continue;
			};
			// Plain metadata lives next to envelopes and is not ours to decrypt.
			let Ok(envelope) = Envelope::parse(&raw) else {
				continue;
			};

			match key.open(&entry_key, &envelope) {
				Ok(plaintext) => {
					mirror.insert(entry_key, plaintext);
				},
				Err(e) => obs::absorbed_fault(
					FlowKind::StorageInit,
					"reload",
					&format!("Skipping cache entry {entry_key}: {e}"),
				),
			}
		}

		*self.mirror.write() = mirror;
	}

	fn open(&self, storage_key: &str, raw: &str) -> Result<String, CryptoError> {
		let guard = self.key.read();
		let key = guard.as_ref().ok_or(CryptoError::Decrypt)?;

		key.open(storage_key, &Envelope::parse(raw)?)
	}

	fn purge_namespace(&self) {
		let storage = self.origin.storage();

		for entry_key in storage.get_keys() {
			let is_envelope =
				storage.get_item(&entry_key).is_some_and(|raw| Envelope::parse(&raw).is_ok());

			if is_envelope || index::is_registry_key(&entry_key) {
				storage.remove_item(&entry_key);
			}
		}

		self.mirror.write().clear();
	}
}
impl CacheStorage for EncryptedStore {
	fn get_item(&self, key: &str) -> Option<String> {
		self.origin.storage().get_item(key)
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.origin.storage().set_item(key, value)
	}

	fn get_user_data(&self, key: &str) -> Option<String> {
		self.sync();

		self.mirror.read().get(key).cloned()
	}

	fn set_user_data(&self, key: &str, value: &str, correlation_id: &str) -> Result<(), StoreError> {
		let envelope = {
			let guard = self.key.read();
			let encryption_key = guard.as_ref().ok_or(StoreError::NotInitialized)?;

			encryption_key.seal(key, value).map_err(|e| StoreError::Backend {
				message: format!("{e} (correlation id {correlation_id})"),
			})?
		};
		let raw = envelope
			.to_json()
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		self.origin.storage().set_item(key, &raw)?;
		self.mirror.write().insert(key.to_owned(), value.to_owned());
		self.origin.publish(key, CacheUpdateKind::Written, self.instance_id);

		Ok(())
	}

	fn remove_item(&self, key: &str) {
		let storage = self.origin.storage();

		storage.remove_item(key);
		self.mirror.write().remove(key);

		if !index::is_registry_key(key) {
			if let Err(e) = index::scrub_key(storage.as_ref(), &self.client_id, key) {
				obs::absorbed_fault(FlowKind::StorageInit, "remove_item", &e.to_string());
			}
		}

		self.origin.publish(key, CacheUpdateKind::Removed, self.instance_id);
	}

	fn get_keys(&self) -> Vec<String> {
		self.origin.storage().get_keys()
	}

	fn contains_key(&self, key: &str) -> bool {
		self.origin.storage().contains_key(key)
	}

	fn clear(&self) {
		self.purge_namespace();

		if let Err(e) = index::reset(self.origin.storage().as_ref(), &self.client_id) {
			obs::absorbed_fault(FlowKind::StorageInit, "clear", &e.to_string());
		}

		self.origin.publish("", CacheUpdateKind::Cleared, self.instance_id);
	}
}
impl Debug for EncryptedStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptedStore")
			.field("client_id", &self.client_id)
			.field("instance_id", &self.instance_id)
			.field("initialized", &self.is_initialized())
			.field("mirrored", &self.mirror.read().len())
			.finish()
	}
}
