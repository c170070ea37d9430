//! Client configuration consumed by the credential cache, the silent flow, and the broker.
//!
//! Option structs deserialize with per-field defaults so hosts can load them from any
//! serde format; [`ClientConfig::builder`] validates the assembled result.

// self
use crate::{
	_prelude::*,
	auth::{Authority, ClientId},
	broker::PREFERRED_EXTENSION_ID,
	error::ConfigError,
};

/// Authority used when the builder is not given one.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common/";
/// Default forward buffer applied to access-token expiry checks, in seconds.
pub const DEFAULT_TOKEN_RENEWAL_OFFSET_SECS: i64 = 300;
/// Default broker handshake timeout, in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 2_000;
/// Default upper bound on in-flight broker requests.
pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 256;

/// Cache behavior switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
	/// Key access tokens by the hash of the request claims instead of bypassing the cache.
	pub claims_based_caching_enabled: bool,
	/// Tokens expiring within this many seconds are treated as expired.
	pub token_renewal_offset_secs: i64,
}
impl CacheOptions {
	/// Forward buffer applied to expiry checks.
	pub fn renewal_offset(&self) -> Duration {
		Duration::seconds(self.token_renewal_offset_secs)
	}
}
impl Default for CacheOptions {
	fn default() -> Self {
		Self {
			claims_based_caching_enabled: false,
			token_renewal_offset_secs: DEFAULT_TOKEN_RENEWAL_OFFSET_SECS,
		}
	}
}

/// Broker delegation settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerOptions {
	/// Caller opt-in for broker delegation.
	pub allow_broker: bool,
	/// Time allowed for each handshake attempt.
	pub handshake_timeout_ms: u64,
	/// Maximum number of unresolved requests per channel.
	pub max_pending_requests: usize,
	/// Broker endpoint tried before falling back to any available one.
	pub preferred_extension_id: Option<String>,
}
impl BrokerOptions {
	/// Handshake timeout as a [`std::time::Duration`].
	pub fn handshake_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_millis(self.handshake_timeout_ms)
	}
}
impl Default for BrokerOptions {
	fn default() -> Self {
		Self {
			allow_broker: false,
			handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
			max_pending_requests: DEFAULT_MAX_PENDING_REQUESTS,
			preferred_extension_id: Some(PREFERRED_EXTENSION_ID.into()),
		}
	}
}

/// Validated client configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Application (client) identifier.
	pub client_id: ClientId,
	/// Default authority for requests that do not carry one.
	pub authority: Authority,
	/// Cache behavior switches.
	pub cache: CacheOptions,
	/// Broker delegation settings.
	pub broker: BrokerOptions,
}
impl ClientConfig {
	/// Starts a builder for the provided client identifier.
	pub fn builder(client_id: impl AsRef<str>) -> ClientConfigBuilder {
		ClientConfigBuilder::new(client_id)
	}

	/// Re-runs builder validation, e.g. after deserializing.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.cache.token_renewal_offset_secs < 0 {
			return Err(ConfigError::NegativeRenewalOffset);
		}
		if self.broker.handshake_timeout_ms == 0 {
			return Err(ConfigError::ZeroHandshakeTimeout);
		}
		if self.broker.max_pending_requests == 0 {
			return Err(ConfigError::ZeroPendingLimit);
		}

		Ok(())
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	client_id: String,
	authority: Option<String>,
	cache: CacheOptions,
	broker: BrokerOptions,
}
impl ClientConfigBuilder {
	fn new(client_id: impl AsRef<str>) -> Self {
		Self {
			client_id: client_id.as_ref().to_owned(),
			authority: None,
			cache: CacheOptions::default(),
			broker: BrokerOptions::default(),
		}
	}

	/// Sets the default authority URL.
	pub fn authority(mut self, authority: impl Into<String>) -> Self {
		self.authority = Some(authority.into());

		self
	}

	/// Overrides the cache options wholesale.
	pub fn cache_options(mut self, cache: CacheOptions) -> Self {
		self.cache = cache;

		self
	}

	/// Overrides the broker options wholesale.
	pub fn broker_options(mut self, broker: BrokerOptions) -> Self {
		self.broker = broker;

		self
	}

	/// Toggles claims-based caching.
	pub fn claims_based_caching(mut self, enabled: bool) -> Self {
		self.cache.claims_based_caching_enabled = enabled;

		self
	}

	/// Sets the expiry forward buffer in seconds.
	pub fn token_renewal_offset_secs(mut self, secs: i64) -> Self {
		self.cache.token_renewal_offset_secs = secs;

		self
	}

	/// Opts into broker delegation.
	pub fn allow_broker(mut self, allow: bool) -> Self {
		self.broker.allow_broker = allow;

		self
	}

	/// Sets the handshake timeout in milliseconds.
	pub fn handshake_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.broker.handshake_timeout_ms = timeout_ms;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let client_id = ClientId::new(&self.client_id)?;
		let authority =
			Authority::parse(self.authority.as_deref().unwrap_or(DEFAULT_AUTHORITY))?;
		let config = ClientConfig { client_id, authority, cache: self.cache, broker: self.broker };

		config.validate()?;

		Ok(config)
	}
}
