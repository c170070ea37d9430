//! ID-token claim extraction and request-claims normalization.
//!
//! Claims are decoded from the JWT payload only; signatures are never checked here.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors raised while decoding ID-token claims.
#[derive(Debug, ThisError)]
pub enum ClaimsError {
	/// The token is not a three-segment compact JWT.
	#[error("Token is not a compact JWT.")]
	MalformedToken,
	/// The payload segment is not valid base64url.
	#[error("Token payload is not valid base64url.")]
	InvalidEncoding(#[from] base64::DecodeError),
	/// The payload is not a JSON claims object.
	#[error("Token payload is not a valid claims object.")]
	InvalidPayload(#[from] serde_path_to_error::Error<serde_json::Error>),
}

/// Claims carried by an OIDC ID token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
	/// Issuer.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iss: Option<String>,
	/// Audience (string or array).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub aud: Option<Value>,
	/// Subject.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Object identifier of the user in the tenant.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub oid: Option<String>,
	/// Tenant identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tid: Option<String>,
	/// Sign-in name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preferred_username: Option<String>,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Time of the end-user authentication, in seconds since the epoch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_time: Option<i64>,
	/// Issued-at, in seconds since the epoch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iat: Option<i64>,
	/// Expiry, in seconds since the epoch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// Any other claims.
	#[serde(flatten)]
	pub extra: BTreeMap<String, Value>,
}
impl IdTokenClaims {
	/// Decodes the payload segment of a compact JWT.
	pub fn from_token(token: &str) -> Result<Self, ClaimsError> {
		let mut segments = token.split('.');
		let (Some(_), Some(payload), Some(_), None) =
			(segments.next(), segments.next(), segments.next(), segments.next())
		else {
			return Err(ClaimsError::MalformedToken);
		};
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
		let de = &mut serde_json::Deserializer::from_slice(&bytes);

		Ok(serde_path_to_error::deserialize(de)?)
	}

	/// `auth_time` as an instant, when present and in range.
	pub fn auth_time_at(&self) -> Option<OffsetDateTime> {
		self.auth_time.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
	}

	/// Unique user identifier (`oid`, falling back to `sub`).
	pub fn unique_id(&self) -> Option<&str> {
		self.oid.as_deref().or(self.sub.as_deref())
	}
}

/// Returns true when a request `claims` string carries no claims.
///
/// Whitespace-only strings and JSON objects without members (`{}`) count as empty.
/// Anything else, non-JSON text included, is a claims request and forces a refresh
/// unless claims-based caching is enabled.
pub fn is_empty_claims(claims: &str) -> bool {
	let trimmed = claims.trim();

	if trimmed.is_empty() {
		return true;
	}

	matches!(serde_json::from_str::<Value>(trimmed), Ok(Value::Object(map)) if map.is_empty())
}

/// Normalized digest of a request `claims` JSON payload.
///
/// Valid JSON is re-serialized with sorted keys before hashing so formatting and key
/// order do not split the cache; anything else is hashed as trimmed text.
pub fn claims_hash(claims: &str) -> String {
	let trimmed = claims.trim();
	let normalized = match serde_json::from_str::<Value>(trimmed) {
		Ok(value) => value.to_string(),
		Err(_) => trimmed.to_owned(),
	};
	let mut hasher = Sha256::new();

	hasher.update(normalized.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &IdTokenClaims) -> String {
	let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\",\"typ\":\"JWT\"}");
	let payload = URL_SAFE_NO_PAD
		.encode(serde_json::to_vec(claims).expect("Claims fixture should serialize."));

	format!("{header}.{payload}.signature")
}
