mod common;

// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use common::{NOW, clock, eventually};
use oidc_token_cache::{
	clock::Clock,
	store::{
		CacheStorage, CookieStore, EncryptedStore, FileStorage, MemoryCookieJar, StorageOrigin,
		cookie::ENCRYPTION_COOKIE, crypto::Envelope,
	},
};

const CLIENT_ID: &str = "client";

fn initialized(origin: &StorageOrigin) -> EncryptedStore {
	let store = EncryptedStore::new(CLIENT_ID, origin.clone());

	store.initialize("corr").expect("Initialization should succeed.");

	store
}

#[test]
fn values_round_trip_and_survive_reinitialization() {
	let origin = StorageOrigin::in_memory(Arc::new(clock()));
	let first = initialized(&origin);

	for (key, value) in [("credential-a", "alpha"), ("credential-b", ""), ("credential-c", "ünïcødé")] {
		first.set_user_data(key, value, "corr").expect("Encrypted write should succeed.");

		assert_eq!(first.get_user_data(key).as_deref(), Some(value));

		let raw = origin.storage().get_item(key).expect("Ciphertext should be persisted.");

		assert!(Envelope::parse(&raw).is_ok());
		assert!(value.is_empty() || !raw.contains(value));
	}

	let reloaded = initialized(&origin);

	assert_eq!(reloaded.get_user_data("credential-a").as_deref(), Some("alpha"));
	assert_eq!(reloaded.get_user_data("credential-b").as_deref(), Some(""));
	assert_eq!(reloaded.get_user_data("credential-c").as_deref(), Some("ünïcødé"));
}

#[test]
fn losing_the_key_cookie_purges_the_namespace() {
	let origin = StorageOrigin::in_memory(Arc::new(clock()));
	let first = initialized(&origin);

	first.set_user_data("credential-a", "alpha", "corr").expect("Encrypted write should succeed.");
	first.set_user_data("credential-b", "beta", "corr").expect("Encrypted write should succeed.");
	first.set_item("msal.token.keys.client", r#"{"idToken":[],"accessToken":["credential-a"],"refreshToken":[]}"#)
		.expect("Plain write should succeed.");
	first.set_item("unrelated", "plain").expect("Plain write should succeed.");
	origin.cookies().remove(ENCRYPTION_COOKIE);

	let second = initialized(&origin);

	assert_eq!(second.get_user_data("credential-a"), None);
	assert!(!origin.storage().contains_key("credential-a"));
	assert!(!origin.storage().contains_key("credential-b"));
	assert!(!origin.storage().contains_key("msal.token.keys.client"));
	assert_eq!(origin.storage().get_item("unrelated").as_deref(), Some("plain"));
	// The first instance follows the regenerated key on its next read.
	assert_eq!(first.get_user_data("credential-a"), None);

	second.set_user_data("credential-a", "gamma", "corr").expect("Encrypted write should succeed.");

	assert_eq!(first.get_user_data("credential-a").as_deref(), Some("gamma"));
}

#[test]
fn expired_key_cookie_forces_regeneration() {
	let clock = clock();
	let origin = StorageOrigin::in_memory(Arc::new(clock.clone()));
	let first = initialized(&origin);

	first.set_user_data("credential-a", "alpha", "corr").expect("Encrypted write should succeed.");

	let cookie = origin.cookies().get(ENCRYPTION_COOKIE).expect("Key cookie should be set.");

	origin
		.cookies()
		.set(ENCRYPTION_COOKIE, &cookie, Some(NOW + Duration::minutes(1)))
		.expect("Cookie write should succeed.");
	clock.advance(Duration::minutes(2));

	let second = initialized(&origin);

	assert_eq!(second.get_user_data("credential-a"), None);
	assert!(origin.storage().get_item("credential-a").is_none());
	assert_ne!(origin.cookies().get(ENCRYPTION_COOKIE), Some(cookie));
}

#[tokio::test]
async fn sibling_instances_converge() {
	let origin = StorageOrigin::in_memory_system();
	let writer = initialized(&origin);
	let reader = initialized(&origin);

	assert_ne!(writer.instance_id(), reader.instance_id());

	writer.set_user_data("credential-k", "v1", "corr").expect("Encrypted write should succeed.");

	assert!(eventually(10, 50, || reader.get_user_data("credential-k").as_deref() == Some("v1")).await);

	writer.set_user_data("credential-k", "v2", "corr").expect("Encrypted write should succeed.");

	assert!(eventually(10, 50, || reader.get_user_data("credential-k").as_deref() == Some("v2")).await);

	reader.remove_item("credential-k");

	assert!(eventually(10, 50, || writer.get_user_data("credential-k").is_none()).await);
}

#[test]
fn uninitialized_writes_are_rejected() {
	let store = EncryptedStore::new(CLIENT_ID, StorageOrigin::in_memory_system());

	assert!(!store.is_initialized());
	assert!(store.set_user_data("credential-a", "alpha", "corr").is_err());
}

#[test]
fn file_backed_origin_survives_restart() -> color_eyre::Result<()> {
	let path = std::env::temp_dir()
		.join(format!("oidc-token-cache-it-{}.json", oidc_token_cache::flows::new_correlation_id()));
	let clock: Arc<dyn Clock> = Arc::new(clock());
	// The cookie jar outlives the process in this scenario, like a persistent cookie.
	let cookies = Arc::new(MemoryCookieJar::new(clock.clone()));

	{
		let origin = StorageOrigin::new(Arc::new(FileStorage::open(&path)?), cookies.clone(), clock.clone());
		let store = initialized(&origin);

		store.set_user_data("credential-a", "alpha", "corr")?;
	}

	let origin = StorageOrigin::new(Arc::new(FileStorage::open(&path)?), cookies, clock);
	let store = initialized(&origin);

	assert_eq!(store.get_user_data("credential-a").as_deref(), Some("alpha"));

	std::fs::remove_file(&path)?;

	Ok(())
}
