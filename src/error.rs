//! Crate-level error types shared by the cache, the silent flow, and the broker channel.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure that could not be absorbed (e.g. a write to an uninitialized store).
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Broker connection or broker-reported failure.
	#[error(transparent)]
	Broker(#[from] crate::broker::BrokerError),

	/// Silent request carried no account.
	#[error("No account object was provided to the silent token request.")]
	NoAccountInSilentRequest,
	/// Cached credentials cannot satisfy the request; fall through to a refresh exchange.
	#[error("Cached credentials cannot satisfy the request; a token refresh is required.")]
	TokenRefreshRequired,
	/// `max_age` was requested but the ID token carries no `auth_time` claim.
	#[error("The ID token does not contain an auth_time claim required by max_age.")]
	AuthTimeNotFound,
	/// More than `max_age` elapsed since the last end-user authentication.
	#[error("Max age has transpired since the last end-user authentication.")]
	MaxAgeTranspired,
}
impl Error {
	/// Returns true for the cache-miss signal that instructs callers to refresh.
	pub fn is_refresh_required(&self) -> bool {
		matches!(self, Self::TokenRefreshRequired)
	}

	/// Returns true for request errors that typically call for interactive auth.
	pub fn is_client_request_error(&self) -> bool {
		matches!(self, Self::NoAccountInSilentRequest | Self::AuthTimeNotFound | Self::MaxAgeTranspired)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Client identifier is invalid.
	#[error("Client identifier is invalid.")]
	InvalidClientId(#[from] crate::auth::IdentifierError),
	/// Authority is invalid.
	#[error("Authority is invalid.")]
	InvalidAuthority(#[from] crate::auth::AuthorityError),
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Handshake timeout must be positive.
	#[error("The broker handshake timeout must be greater than zero.")]
	ZeroHandshakeTimeout,
	/// Pending-request bound must be positive.
	#[error("The broker pending-request limit must be greater than zero.")]
	ZeroPendingLimit,
	/// Token renewal offset cannot be negative.
	#[error("The token renewal offset cannot be negative.")]
	NegativeRenewalOffset,
}
