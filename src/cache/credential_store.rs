//! Typed get/set/remove over cache entities with scope, claims, and alias-aware matching.
//!
//! Reads never fail: missing, undecryptable, or unparsable entries are reported as
//! `None` and the silent flow maps absence to a refresh. Writes surface [`StoreError`]
//! so callers hydrating the cache learn about an unusable backend.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{AccountInfo, ClientId, ScopeSet, claims_hash, is_empty_claims, known_alias_group},
	cache::{
		AccessTokenEntity, AccountEntity, AppMetadataEntity, AuthenticationScheme,
		AuthorityMetadataEntity, CacheRecord, CredentialType, IdTokenEntity, RefreshTokenEntity,
		entity::CredentialHeader,
		index,
		key::{self, CredentialKey},
	},
	clock::Clock,
	config::CacheOptions,
	obs::{self, FlowKind},
	store::{CacheStorage, StoreError},
};

/// Access-token lookup parameters.
#[derive(Clone, Copy, Debug)]
pub struct AccessTokenQuery<'a> {
	/// Requested scopes; OIDC defaults are normalized away before matching.
	pub scopes: &'a ScopeSet,
	/// Raw request claims.
	pub claims: Option<&'a str>,
	/// Requested token scheme.
	pub scheme: AuthenticationScheme,
}

/// Credential cache for one client over an injected storage backend.
#[derive(Clone)]
pub struct CredentialStore {
	client_id: ClientId,
	storage: Arc<dyn CacheStorage>,
	options: CacheOptions,
	clock: Arc<dyn Clock>,
}
impl CredentialStore {
	/// Creates a store for `client_id`.
	pub fn new(
		client_id: ClientId,
		storage: Arc<dyn CacheStorage>,
		options: CacheOptions,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self { client_id, storage, options, clock }
	}

	/// Client this store serves.
	pub fn client_id(&self) -> &ClientId {
		&self.client_id
	}

	/// Cache behavior switches.
	pub fn options(&self) -> &CacheOptions {
		&self.options
	}

	/// Writes an account and registers its key.
	pub fn set_account(&self, account: &AccountEntity, correlation_id: &str) -> Result<(), StoreError> {
		let key = account.cache_key();

		self.write_entity(&key, account, correlation_id)?;

		index::add_account_key(self.storage.as_ref(), &key)
	}

	/// Reads an account by cache key.
	pub fn get_account(&self, key: &str) -> Option<AccountEntity> {
		self.read_entity(key)
	}

	/// Resolves a caller-supplied account against every alias of its environment.
	pub fn read_account_from_cache(&self, account: &AccountInfo) -> Option<AccountEntity> {
		self.environment_aliases(&account.environment).iter().find_map(|environment| {
			self.get_account(&key::account_key(
				&account.home_account_id,
				environment,
				&account.tenant_id,
			))
		})
	}

	/// Every registered account that can still be read.
	pub fn get_all_accounts(&self) -> Vec<AccountInfo> {
		index::load_account_keys(self.storage.as_ref())
			.iter()
			.filter_map(|key| self.get_account(key))
			.map(|account| account.to_account_info())
			.collect()
	}

	/// Writes an ID token and registers its key.
	pub fn set_id_token(&self, token: &IdTokenEntity, correlation_id: &str) -> Result<(), StoreError> {
		let key = token.cache_key();

		self.write_entity(&key, token, correlation_id)?;

		index::add_token_key(self.storage.as_ref(), &token.client_id, CredentialType::IdToken, &key)
	}

	/// ID token of `account` for this client.
	pub fn get_id_token(&self, account: &AccountEntity) -> Option<IdTokenEntity> {
		self.environment_aliases(&account.environment).iter().find_map(|environment| {
			self.read_entity(
				&CredentialKey {
					home_account_id: &account.home_account_id,
					environment,
					credential_type: CredentialType::IdToken,
					client_or_family_id: &self.client_id,
					realm: &account.realm,
					target: "",
					requested_claims_hash: None,
					scheme: AuthenticationScheme::Bearer,
				}
				.render(),
			)
		})
	}

	/// Writes an access token after evicting partition siblings whose target overlaps it.
	pub fn set_access_token(
		&self,
		token: &AccessTokenEntity,
		correlation_id: &str,
	) -> Result<(), StoreError> {
		let key = token.cache_key();
		let target = token.scopes();

		for existing_key in index::load_token_keys(self.storage.as_ref(), &token.client_id).access_token
		{
			if existing_key == key {
				continue;
			}

			let Some(existing) = self.read_entity::<AccessTokenEntity>(&existing_key) else {
				continue;
			};

			if existing.same_partition(token) && existing.scopes().intersects(&target) {
				self.remove_credential(&existing_key)?;
			}
		}

		self.write_entity(&key, token, correlation_id)?;

		index::add_token_key(self.storage.as_ref(), &token.client_id, token.credential_type, &key)
	}

	/// Best cached access token of `account` satisfying `query`.
	///
	/// Candidates must share the account's home id, an alias of its environment, this
	/// client, its realm, and the requested scheme; their target must contain every
	/// requested scope. Non-empty claims disqualify the cache unless claims-based caching
	/// is enabled, in which case the claims hash must match exactly. The smallest target
	/// wins, then the most recent `cached_at`.
	pub fn get_access_token(
		&self,
		account: &AccountEntity,
		query: &AccessTokenQuery<'_>,
	) -> Option<AccessTokenEntity> {
		let requested_hash = match query.claims.filter(|claims| !is_empty_claims(claims)) {
			Some(_) if !self.options.claims_based_caching_enabled => return None,
			Some(claims) => Some(claims_hash(claims)),
			None => None,
		};
		let search = query.scopes.search_scopes();
		let environments = self.environment_aliases(&account.environment);
		let credential_type = CredentialType::for_scheme(query.scheme);
		let mut best: Option<(usize, AccessTokenEntity)> = None;

		for key in index::load_token_keys(self.storage.as_ref(), &self.client_id).access_token {
			let Some(candidate) = self.read_entity::<AccessTokenEntity>(&key) else {
				continue;
			};

			if candidate.home_account_id != account.home_account_id
				|| !environments.iter().any(|e| e.eq_ignore_ascii_case(&candidate.environment))
				|| candidate.client_id != self.client_id
				|| !candidate.realm.eq_ignore_ascii_case(&account.realm)
				|| candidate.credential_type != credential_type
				|| candidate.token_type != query.scheme
				|| candidate.requested_claims_hash != requested_hash
			{
				continue;
			}

			let target = candidate.scopes();

			if !search.is_empty() && !target.contains_all(&search) {
				continue;
			}

			let width = target.len();
			let replace = match &best {
				None => true,
				Some((best_width, current)) =>
					width < *best_width
						|| (width == *best_width && candidate.cached_at > current.cached_at),
			};

			if replace {
				best = Some((width, candidate));
			}
		}

		best.map(|(_, token)| token)
	}

	/// Writes a refresh token and registers its key.
	pub fn set_refresh_token(
		&self,
		token: &RefreshTokenEntity,
		correlation_id: &str,
	) -> Result<(), StoreError> {
		let key = token.cache_key();

		self.write_entity(&key, token, correlation_id)?;

		index::add_token_key(self.storage.as_ref(), &token.client_id, CredentialType::RefreshToken, &key)
	}

	/// Refresh token of `account`, preferring the family token when `allow_family` is set
	/// and app metadata places this client in a family.
	pub fn get_refresh_token(
		&self,
		account: &AccountEntity,
		allow_family: bool,
	) -> Option<RefreshTokenEntity> {
		let family_id = allow_family
			.then(|| self.get_app_metadata(&account.environment))
			.flatten()
			.and_then(|metadata| metadata.family_id);
		let owners = family_id.iter().map(String::as_str).chain([self.client_id.as_str()]);

		for owner in owners {
			for environment in self.environment_aliases(&account.environment) {
				let key = CredentialKey {
					home_account_id: &account.home_account_id,
					environment: &environment,
					credential_type: CredentialType::RefreshToken,
					client_or_family_id: owner,
					realm: "",
					target: "",
					requested_claims_hash: None,
					scheme: AuthenticationScheme::Bearer,
				}
				.render();

				if let Some(token) = self.read_entity(&key) {
					return Some(token);
				}
			}
		}

		None
	}

	/// Removes a credential and unregisters its key.
	pub fn remove_credential(&self, key: &str) -> Result<(), StoreError> {
		self.storage.remove_item(key);

		index::scrub_key(self.storage.as_ref(), &self.client_id, key)
	}

	/// Removes an account and every credential of this client sharing its home account id
	/// and environment, then unregisters all removed keys.
	pub fn remove_account(&self, account_key: &str) -> Result<(), StoreError> {
		if let Some(account) = self.get_account(account_key) {
			let credential_keys = index::load_token_keys(self.storage.as_ref(), &self.client_id)
				.all()
				.map(str::to_owned)
				.collect::<Vec<_>>();

			for key in credential_keys {
				let Some(header) = self.read_entity::<CredentialHeader>(&key) else {
					continue;
				};

				if header.home_account_id == account.home_account_id.as_str()
					&& header.environment.eq_ignore_ascii_case(&account.environment)
					&& header.client_id == self.client_id.as_str()
				{
					self.remove_credential(&key)?;
				}
			}
		}

		self.storage.remove_item(account_key);

		index::scrub_key(self.storage.as_ref(), &self.client_id, account_key)
	}

	/// Writes discovery metadata under every alias it lists.
	pub fn set_authority_metadata(&self, metadata: &AuthorityMetadataEntity) -> Result<(), StoreError> {
		let mut hosts = vec![metadata.host.clone()];

		hosts.extend(metadata.aliases.iter().filter(|a| !a.eq_ignore_ascii_case(&metadata.host)).cloned());

		for host in hosts {
			let entry = AuthorityMetadataEntity { host, ..metadata.clone() };

			self.write_plain(&entry.cache_key(&self.client_id), &entry)?;
		}

		Ok(())
	}

	/// Discovery metadata cached for `host`, expired or not.
	pub fn get_authority_metadata(&self, host: &str) -> Option<AuthorityMetadataEntity> {
		self.read_plain(&key::authority_metadata_key(&self.client_id, host))
	}

	/// Writes app metadata.
	pub fn set_app_metadata(&self, metadata: &AppMetadataEntity) -> Result<(), StoreError> {
		self.write_plain(&metadata.cache_key(), metadata)
	}

	/// App metadata of this client in `environment`.
	pub fn get_app_metadata(&self, environment: &str) -> Option<AppMetadataEntity> {
		self.read_plain(&key::app_metadata_key(environment, &self.client_id))
	}

	/// Writes every part of `record`.
	pub fn save_cache_record(&self, record: &CacheRecord, correlation_id: &str) -> Result<(), StoreError> {
		if let Some(account) = &record.account {
			self.set_account(account, correlation_id)?;
		}
		if let Some(id_token) = &record.id_token {
			self.set_id_token(id_token, correlation_id)?;
		}
		if let Some(access_token) = &record.access_token {
			self.set_access_token(access_token, correlation_id)?;
		}
		if let Some(refresh_token) = &record.refresh_token {
			self.set_refresh_token(refresh_token, correlation_id)?;
		}
		if let Some(app_metadata) = &record.app_metadata {
			self.set_app_metadata(app_metadata)?;
		}

		Ok(())
	}

	/// Hosts treated as the same cache partition as `host`, most preferred first.
	///
	/// Unexpired cached discovery metadata wins; otherwise the built-in alias groups are
	/// consulted; otherwise `host` stands alone.
	pub fn environment_aliases(&self, host: &str) -> Vec<String> {
		let now = self.clock.now();
		let mut aliases = Vec::new();
		let mut push = |candidate: &str| {
			if !aliases.iter().any(|a: &String| a.eq_ignore_ascii_case(candidate)) {
				aliases.push(candidate.to_ascii_lowercase());
			}
		};

		match self.get_authority_metadata(host).filter(|m| !m.is_expired(now) && m.has_alias(host)) {
			Some(metadata) => {
				push(metadata.preferred_cache.as_str());
				push(host);

				for alias in &metadata.aliases {
					push(alias.as_str());
				}
			},
			None => match known_alias_group(host) {
				Some(group) => {
					for alias in group.iter().copied() {
						push(alias);
					}
				},
				None => push(host),
			},
		}

		aliases
	}

	fn read_entity<T>(&self, key: &str) -> Option<T>
	where
		T: DeserializeOwned,
	{
		let raw = self.storage.get_user_data(key)?;

		parse_entry(key, &raw)
	}

	fn write_entity<T>(&self, key: &str, value: &T, correlation_id: &str) -> Result<(), StoreError>
	where
		T: Serialize,
	{
		let raw = serde_json::to_string(value)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		self.storage.set_user_data(key, &raw, correlation_id)
	}

	fn read_plain<T>(&self, key: &str) -> Option<T>
	where
		T: DeserializeOwned,
	{
		let raw = self.storage.get_item(key)?;

		parse_entry(key, &raw)
	}

	fn write_plain<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
	where
		T: Serialize,
	{
		let raw = serde_json::to_string(value)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		self.storage.set_item(key, &raw)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore")
			.field("client_id", &self.client_id)
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

fn parse_entry<T>(key: &str, raw: &str) -> Option<T>
where
	T: DeserializeOwned,
{
	let de = &mut serde_json::Deserializer::from_str(raw);

	match serde_path_to_error::deserialize(de) {
		Ok(value) => Some(value),
		Err(e) => {
			obs::absorbed_fault(
				FlowKind::SilentCache,
				"parse_entry",
				&format!("Ignoring unreadable cache entry {key} at {}: {}", e.path(), e.inner()),
			);

			None
		},
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{auth::HomeAccountId, clock::ManualClock, store::MemoryStorage};

	const NOW: OffsetDateTime = datetime!(2025-03-01 12:00 UTC);

	struct Fixture {
		storage: MemoryStorage,
		store: CredentialStore,
		account: AccountEntity,
		client: ClientId,
	}

	fn fixture_with(options: CacheOptions) -> Fixture {
		let storage = MemoryStorage::default();
		let client = ClientId::new("client").expect("Client fixture should be valid.");
		let store = CredentialStore::new(
			client.clone(),
			Arc::new(storage.clone()),
			options,
			Arc::new(ManualClock::new(NOW)),
		);
		let account = AccountEntity::from_account_info(&AccountInfo::new(
			HomeAccountId::new("uid.utid").expect("Home account fixture should be valid."),
			"login.microsoftonline.com",
			"utid",
		));

		Fixture { storage, store, account, client }
	}

	fn fixture() -> Fixture {
		fixture_with(CacheOptions::default())
	}

	fn scopes(target: &str) -> ScopeSet {
		target.parse().expect("Scope fixture should parse.")
	}

	fn access_token(f: &Fixture, target: &str, cached_at: OffsetDateTime) -> AccessTokenEntity {
		AccessTokenEntity::new(
			&f.account,
			&f.client,
			format!("at:{target}"),
			&scopes(target),
			cached_at,
			cached_at + Duration::hours(1),
		)
	}

	fn query(scopes: &ScopeSet) -> AccessTokenQuery<'_> {
		AccessTokenQuery { scopes, claims: None, scheme: AuthenticationScheme::Bearer }
	}

	#[test]
	fn access_token_lookup_prefers_smallest_superset() {
		let f = fixture();

		f.store
			.set_access_token(&access_token(&f, "a b c", NOW), "corr")
			.expect("Write should succeed.");

		let requested = scopes("a");
		let found = f.store.get_access_token(&f.account, &query(&requested)).expect("Superset should match.");

		assert_eq!(found.target, "a b c");

		// Writing `a` evicts the overlapping `a b c` entry.
		f.store.set_access_token(&access_token(&f, "a", NOW), "corr").expect("Write should succeed.");
		f.store.set_access_token(&access_token(&f, "x y", NOW), "corr").expect("Write should succeed.");

		let keys = index::load_token_keys(&f.storage, "client").access_token;

		assert_eq!(keys.len(), 2);

		let found = f.store.get_access_token(&f.account, &query(&requested)).expect("Exact scope should match.");

		assert_eq!(found.target, "a");
		assert!(f.store.get_access_token(&f.account, &query(&scopes("a x"))).is_none());
	}

	#[test]
	fn access_token_lookup_breaks_ties_by_recency() {
		let f = fixture();
		let older = access_token(&f, "a b", NOW - Duration::minutes(10));
		let newer = access_token(&f, "a c", NOW);

		// Bypass write-side eviction to seed two equally wide candidates.
		for token in [&older, &newer] {
			f.store
				.write_entity(&token.cache_key(), token, "corr")
				.expect("Write should succeed.");
			index::add_token_key(&f.storage, "client", CredentialType::AccessToken, &token.cache_key())
				.expect("Registry write should succeed.");
		}

		let found = f.store.get_access_token(&f.account, &query(&scopes("a"))).expect("Match expected.");

		assert_eq!(found.target, "a c");
	}

	#[test]
	fn oidc_defaults_and_case_are_ignored_when_matching() {
		let f = fixture();

		f.store
			.set_access_token(&access_token(&f, "User.Read", NOW), "corr")
			.expect("Write should succeed.");

		let requested = scopes("openid profile offline_access user.read");

		assert!(f.store.get_access_token(&f.account, &query(&requested)).is_some());
		assert!(f.store.get_access_token(&f.account, &query(&ScopeSet::default())).is_some());
	}

	#[test]
	fn claims_disqualify_cache_unless_claims_caching_is_enabled() {
		let claims = r#"{"access_token":{"xms_cc":{"values":["cp1"]}}}"#;
		let f = fixture();

		f.store.set_access_token(&access_token(&f, "a", NOW), "corr").expect("Write should succeed.");

		let requested = scopes("a");
		let with_claims = AccessTokenQuery { claims: Some(claims), ..query(&requested) };
		let with_empty_claims = AccessTokenQuery { claims: Some("{}"), ..query(&requested) };

		assert!(f.store.get_access_token(&f.account, &with_claims).is_none());
		assert!(f.store.get_access_token(&f.account, &with_empty_claims).is_some());

		let f = fixture_with(CacheOptions { claims_based_caching_enabled: true, ..Default::default() });

		f.store
			.set_access_token(&access_token(&f, "a", NOW).with_requested_claims(claims), "corr")
			.expect("Write should succeed.");

		let with_claims = AccessTokenQuery { claims: Some(claims), ..query(&requested) };
		let other_claims = AccessTokenQuery { claims: Some(r#"{"id_token":{}}"#), ..query(&requested) };

		assert!(f.store.get_access_token(&f.account, &with_claims).is_some());
		assert!(f.store.get_access_token(&f.account, &other_claims).is_none());
		assert!(f.store.get_access_token(&f.account, &query(&requested)).is_none());
	}

	#[test]
	fn scheme_partitions_lookups() {
		let f = fixture();

		f.store
			.set_access_token(&access_token(&f, "a", NOW).with_scheme(AuthenticationScheme::Pop), "corr")
			.expect("Write should succeed.");

		let requested = scopes("a");

		assert!(f.store.get_access_token(&f.account, &query(&requested)).is_none());
		assert!(
			f.store
				.get_access_token(
					&f.account,
					&AccessTokenQuery { scheme: AuthenticationScheme::Pop, ..query(&requested) }
				)
				.is_some()
		);
	}

	#[test]
	fn accounts_resolve_through_known_and_cached_aliases() {
		let f = fixture();

		f.store.set_account(&f.account, "corr").expect("Write should succeed.");

		let via_alias = AccountInfo::new(f.account.home_account_id.clone(), "login.windows.net", "utid");

		assert_eq!(f.store.read_account_from_cache(&via_alias), Some(f.account.clone()));

		let custom = AccountEntity { environment: "login.contoso.com".into(), ..f.account.clone() };

		f.store.set_account(&custom, "corr").expect("Write should succeed.");

		let via_custom_alias =
			AccountInfo::new(f.account.home_account_id.clone(), "sts.contoso.com", "utid");

		assert!(f.store.read_account_from_cache(&via_custom_alias).is_none());

		f.store
			.set_authority_metadata(&AuthorityMetadataEntity {
				host: "login.contoso.com".into(),
				aliases: vec!["login.contoso.com".into(), "sts.contoso.com".into()],
				preferred_cache: "login.contoso.com".into(),
				preferred_network: "login.contoso.com".into(),
				canonical_authority: "https://login.contoso.com/utid/".into(),
				authorization_endpoint: None,
				token_endpoint: None,
				issuer: None,
				expires_at: NOW + Duration::days(1),
			})
			.expect("Metadata write should succeed.");

		assert_eq!(f.store.read_account_from_cache(&via_custom_alias), Some(custom));
		assert_eq!(f.store.get_all_accounts().len(), 2);
	}

	#[test]
	fn family_refresh_token_is_preferred_when_app_metadata_names_a_family() {
		let f = fixture();
		let own = RefreshTokenEntity::new(&f.account, &f.client, "own");
		let family = RefreshTokenEntity::new(&f.account, &f.client, "family").with_family_id("1");

		f.store.set_refresh_token(&own, "corr").expect("Write should succeed.");
		f.store.set_refresh_token(&family, "corr").expect("Write should succeed.");

		let found = f.store.get_refresh_token(&f.account, true).expect("Own token should be found.");

		assert_eq!(found.secret.expose(), "own");

		f.store
			.set_app_metadata(&AppMetadataEntity {
				client_id: f.client.clone(),
				environment: f.account.environment.clone(),
				family_id: Some("1".into()),
			})
			.expect("Metadata write should succeed.");

		let found = f.store.get_refresh_token(&f.account, true).expect("Family token should be found.");

		assert_eq!(found.secret.expose(), "family");

		let found = f.store.get_refresh_token(&f.account, false).expect("Own token should be found.");

		assert_eq!(found.secret.expose(), "own");
	}

	#[test]
	fn unreadable_entries_read_as_absent() {
		let f = fixture();

		f.storage.set_item(&f.account.cache_key(), "{broken").expect("Raw write should succeed.");

		assert!(f.store.get_account(&f.account.cache_key()).is_none());
	}
}
