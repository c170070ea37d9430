//! Unencrypted key-index registries that let the cache enumerate entries without
//! decrypting or scanning the whole backend.

// self
use crate::{
	_prelude::*,
	cache::CredentialType,
	store::{CacheStorage, StoreError},
};

/// Registry of account keys shared by every client in the namespace.
pub const ACCOUNT_KEYS: &str = "msal.account.keys";
/// Prefix of the per-client credential registry.
pub const TOKEN_KEYS_PREFIX: &str = "msal.token.keys";

/// Name of the credential registry for `client_id`.
pub fn token_keys_name(client_id: &str) -> String {
	format!("{TOKEN_KEYS_PREFIX}.{client_id}")
}

/// Credential keys grouped by credential type, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenKeys {
	/// ID token keys.
	pub id_token: Vec<String>,
	/// Access token keys, bearer and scheme-bound alike.
	pub access_token: Vec<String>,
	/// Refresh token keys.
	pub refresh_token: Vec<String>,
}
impl TokenKeys {
	/// Keys registered for `credential_type`.
	pub fn keys(&self, credential_type: CredentialType) -> &[String] {
		match credential_type {
			CredentialType::IdToken => &self.id_token,
			CredentialType::AccessToken | CredentialType::AccessTokenWithAuthScheme =>
				&self.access_token,
			CredentialType::RefreshToken => &self.refresh_token,
		}
	}

	/// Every registered key.
	pub fn all(&self) -> impl Iterator<Item = &str> {
		self.id_token
			.iter()
			.chain(&self.access_token)
			.chain(&self.refresh_token)
			.map(String::as_str)
	}

	/// Registers `key`; returns false if it was already present.
	pub fn insert(&mut self, credential_type: CredentialType, key: &str) -> bool {
		let list = match credential_type {
			CredentialType::IdToken => &mut self.id_token,
			CredentialType::AccessToken | CredentialType::AccessTokenWithAuthScheme =>
				&mut self.access_token,
			CredentialType::RefreshToken => &mut self.refresh_token,
		};

		if list.iter().any(|k| k == key) {
			return false;
		}

		list.push(key.to_owned());

		true
	}

	/// Unregisters `key` from every list; returns true if anything changed.
	pub fn remove(&mut self, key: &str) -> bool {
		let before = self.id_token.len() + self.access_token.len() + self.refresh_token.len();

		self.id_token.retain(|k| k != key);
		self.access_token.retain(|k| k != key);
		self.refresh_token.retain(|k| k != key);

		before != self.id_token.len() + self.access_token.len() + self.refresh_token.len()
	}
}

/// Reads the account registry; unreadable registries count as empty.
pub fn load_account_keys(storage: &dyn CacheStorage) -> Vec<String> {
	storage.get_item(ACCOUNT_KEYS).and_then(|raw| serde_json::from_str(&raw).ok()).unwrap_or_default()
}

/// Reads the credential registry of `client_id`; unreadable registries count as empty.
pub fn load_token_keys(storage: &dyn CacheStorage, client_id: &str) -> TokenKeys {
	storage
		.get_item(&token_keys_name(client_id))
		.and_then(|raw| serde_json::from_str(&raw).ok())
		.unwrap_or_default()
}

/// Registers an account key.
pub fn add_account_key(storage: &dyn CacheStorage, key: &str) -> Result<(), StoreError> {
	let mut keys = load_account_keys(storage);

	if keys.iter().any(|k| k == key) {
		return Ok(());
	}

	keys.push(key.to_owned());

	save(storage, ACCOUNT_KEYS, &keys)
}

/// Registers a credential key for `client_id`.
pub fn add_token_key(
	storage: &dyn CacheStorage,
	client_id: &str,
	credential_type: CredentialType,
	key: &str,
) -> Result<(), StoreError> {
	let mut keys = load_token_keys(storage, client_id);

	if keys.insert(credential_type, key) {
		save(storage, &token_keys_name(client_id), &keys)?;
	}

	Ok(())
}

/// Removes `key` from the account registry and from the credential registry of `client_id`.
pub fn scrub_key(storage: &dyn CacheStorage, client_id: &str, key: &str) -> Result<(), StoreError> {
	let mut accounts = load_account_keys(storage);
	let account_count = accounts.len();

	accounts.retain(|k| k != key);

	if accounts.len() != account_count {
		save(storage, ACCOUNT_KEYS, &accounts)?;
	}

	let mut tokens = load_token_keys(storage, client_id);

	if tokens.remove(key) {
		save(storage, &token_keys_name(client_id), &tokens)?;
	}

	Ok(())
}

/// Empties both registries for `client_id`.
pub fn reset(storage: &dyn CacheStorage, client_id: &str) -> Result<(), StoreError> {
	save(storage, ACCOUNT_KEYS, &Vec::<String>::new())?;
	save(storage, &token_keys_name(client_id), &TokenKeys::default())
}

/// Returns true for registry entries, which are never encrypted.
pub fn is_registry_key(key: &str) -> bool {
	key == ACCOUNT_KEYS || key.starts_with(TOKEN_KEYS_PREFIX)
}

fn save<T>(storage: &dyn CacheStorage, name: &str, value: &T) -> Result<(), StoreError>
where
	T: Serialize,
{
	let raw = serde_json::to_string(value)
		.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

	storage.set_item(name, &raw)
}
