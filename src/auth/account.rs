//! Caller-facing account descriptor passed into silent requests and returned in results.

// self
use crate::{
	_prelude::*,
	auth::{HomeAccountId, IdTokenClaims},
};

/// Account identity as seen by the calling application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
	/// Stable cross-tenant identifier.
	pub home_account_id: HomeAccountId,
	/// Issuer host the account belongs to.
	pub environment: String,
	/// Tenant the account was last used with.
	pub tenant_id: String,
	/// Tenant-local object identifier.
	pub local_account_id: String,
	/// Sign-in name.
	pub username: String,
	/// Display name, when known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Raw ID-token claims, when the account was built from a token response.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token_claims: Option<IdTokenClaims>,
}
impl AccountInfo {
	/// Creates an account descriptor with empty optional fields.
	pub fn new(
		home_account_id: HomeAccountId,
		environment: impl Into<String>,
		tenant_id: impl Into<String>,
	) -> Self {
		Self {
			home_account_id,
			environment: environment.into(),
			tenant_id: tenant_id.into(),
			local_account_id: String::new(),
			username: String::new(),
			name: None,
			id_token_claims: None,
		}
	}

	/// Sets the tenant-local object identifier.
	pub fn with_local_account_id(mut self, local_account_id: impl Into<String>) -> Self {
		self.local_account_id = local_account_id.into();

		self
	}

	/// Sets the sign-in name.
	pub fn with_username(mut self, username: impl Into<String>) -> Self {
		self.username = username.into();

		self
	}

	/// Attaches ID-token claims.
	pub fn with_id_token_claims(mut self, claims: IdTokenClaims) -> Self {
		self.id_token_claims = Some(claims);

		self
	}
}
