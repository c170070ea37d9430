mod common;

// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use common::{CLIENT_ID, NOW, account_entity, clock, config, credential_store, eventually};
use oidc_token_cache::{
	auth::ScopeSet,
	cache::{
		AccessTokenEntity, AccessTokenQuery, AccountEntity, AuthenticationScheme, CredentialStore,
		IdTokenEntity, RefreshTokenEntity, index,
	},
	store::{EncryptedStore, StorageOrigin},
};

fn seed(store: &CredentialStore, account: &AccountEntity, target: &str) -> Vec<String> {
	let client = store.client_id().clone();
	let scopes: ScopeSet = target.parse().expect("Scope fixture should parse.");
	let id_token = IdTokenEntity::new(account, &client, "id-token");
	let access_token =
		AccessTokenEntity::new(account, &client, "access-token", &scopes, NOW, NOW + Duration::hours(1));
	let refresh_token = RefreshTokenEntity::new(account, &client, "refresh-token");

	store.set_account(account, "corr").expect("Account write should succeed.");
	store.set_id_token(&id_token, "corr").expect("ID token write should succeed.");
	store.set_access_token(&access_token, "corr").expect("Access token write should succeed.");
	store.set_refresh_token(&refresh_token, "corr").expect("Refresh token write should succeed.");

	vec![id_token.cache_key(), access_token.cache_key(), refresh_token.cache_key()]
}

#[tokio::test]
async fn removing_an_account_cascades_across_instances() {
	let config = config();
	let clock = Arc::new(clock());
	let origin = StorageOrigin::in_memory(clock.clone());
	let writer = Arc::new(EncryptedStore::new(CLIENT_ID, origin.clone()));
	let reader = Arc::new(EncryptedStore::new(CLIENT_ID, origin.clone()));

	writer.initialize("corr").expect("Initialization should succeed.");
	reader.initialize("corr").expect("Initialization should succeed.");

	let writer_cache = credential_store(&config, writer.clone(), clock.clone());
	let reader_cache = credential_store(&config, reader.clone(), clock.clone());
	let alice = account_entity("alice");
	let bob = account_entity("bob");
	let alice_keys = seed(&writer_cache, &alice, "User.Read");
	let bob_keys = seed(&writer_cache, &bob, "User.Read");

	assert!(eventually(10, 50, || reader_cache.get_all_accounts().len() == 2).await);

	reader_cache.remove_account(&alice.cache_key()).expect("Account removal should succeed.");

	let registry = index::load_token_keys(origin.storage().as_ref(), CLIENT_ID);
	let registered = registry.all().map(str::to_owned).collect::<Vec<_>>();

	for key in &alice_keys {
		assert!(!registered.contains(key), "{key} should be unregistered.");
		assert!(!origin.storage().contains_key(key), "{key} should be removed.");
	}
	for key in &bob_keys {
		assert!(registered.contains(key), "{key} should stay registered.");
	}

	assert_eq!(
		index::load_account_keys(origin.storage().as_ref()),
		vec![bob.cache_key()]
	);

	let query = AccessTokenQuery {
		scopes: &"User.Read".parse().expect("Scope fixture should parse."),
		claims: None,
		scheme: AuthenticationScheme::Bearer,
	};

	assert!(eventually(10, 50, || writer_cache.get_id_token(&alice).is_none()).await);
	assert!(writer_cache.get_access_token(&alice, &query).is_none());
	assert!(writer_cache.get_refresh_token(&alice, false).is_none());
	assert!(writer_cache.get_access_token(&bob, &query).is_some());
	assert_eq!(writer_cache.get_all_accounts().len(), 1);
}

#[test]
fn credentials_of_other_clients_survive_account_removal() {
	let config = config();
	let clock = Arc::new(clock());
	let origin = StorageOrigin::in_memory(clock.clone());
	let store = Arc::new(EncryptedStore::new(CLIENT_ID, origin.clone()));

	store.initialize("corr").expect("Initialization should succeed.");

	let cache = credential_store(&config, store.clone(), clock.clone());
	let other_config = oidc_token_cache::config::ClientConfig::builder("other-client")
		.build()
		.expect("Config fixture should build.");
	let other_cache = credential_store(&other_config, store, clock);
	let alice = account_entity("alice");

	seed(&cache, &alice, "User.Read");

	let other_keys = seed(&other_cache, &alice, "Mail.Read");

	cache.remove_account(&alice.cache_key()).expect("Account removal should succeed.");

	for key in &other_keys {
		assert!(origin.storage().contains_key(key), "{key} should survive.");
	}

	assert!(other_cache.get_refresh_token(&alice, false).is_some());
}
