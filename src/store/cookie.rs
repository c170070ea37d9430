//! Scoped cookie-like values shared by every store instance of an origin.

// self
use crate::{_prelude::*, clock::Clock, store::StoreError};

/// Name of the cookie holding the cache encryption key.
pub const ENCRYPTION_COOKIE: &str = "msal.cache.encryption";

/// Cookie primitive holding small scoped values with optional expiry.
pub trait CookieStore
where
	Self: Send + Sync,
{
	/// Current value, or `None` when absent or expired.
	fn get(&self, name: &str) -> Option<String>;

	/// Stores a value that expires at `expires_at` (session cookie when `None`).
	fn set(&self, name: &str, value: &str, expires_at: Option<OffsetDateTime>) -> Result<(), StoreError>;

	/// Deletes a value.
	fn remove(&self, name: &str);
}

#[derive(Clone, Debug)]
struct Cookie {
	value: String,
	expires_at: Option<OffsetDateTime>,
}

/// In-process cookie jar that evaluates expiry against an injected clock.
#[derive(Clone)]
pub struct MemoryCookieJar {
	entries: Arc<RwLock<HashMap<String, Cookie>>>,
	clock: Arc<dyn Clock>,
}
impl MemoryCookieJar {
	/// Creates an empty jar.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { entries: Default::default(), clock }
	}
}
impl CookieStore for MemoryCookieJar {
	fn get(&self, name: &str) -> Option<String> {
		let now = self.clock.now();
		let entries = self.entries.read();
		let cookie = entries.get(name)?;

		match cookie.expires_at {
			Some(expires_at) if expires_at <= now => None,
			_ => Some(cookie.value.clone()),
		}
	}

	fn set(&self, name: &str, value: &str, expires_at: Option<OffsetDateTime>) -> Result<(), StoreError> {
		self.entries
			.write()
			.insert(name.to_owned(), Cookie { value: value.to_owned(), expires_at });

		Ok(())
	}

	fn remove(&self, name: &str) {
		self.entries.write().remove(name);
	}
}
impl Debug for MemoryCookieJar {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCookieJar").field("len", &self.entries.read().len()).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;
	use crate::clock::ManualClock;

	#[test]
	fn expired_cookies_read_as_absent() {
		let clock = ManualClock::new(datetime!(2025-01-01 00:00 UTC));
		let jar = MemoryCookieJar::new(Arc::new(clock.clone()));

		jar.set(ENCRYPTION_COOKIE, "v", Some(datetime!(2025-01-01 01:00 UTC)))
			.expect("Cookie write should succeed.");
		jar.set("session", "s", None).expect("Cookie write should succeed.");

		assert_eq!(jar.get(ENCRYPTION_COOKIE).as_deref(), Some("v"));

		clock.advance(Duration::hours(1));

		assert!(jar.get(ENCRYPTION_COOKIE).is_none());
		assert_eq!(jar.get("session").as_deref(), Some("s"));

		jar.remove("session");

		assert!(jar.get("session").is_none());
	}
}
