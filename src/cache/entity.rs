//! Typed cache records for accounts, credentials, and supporting metadata.
//!
//! Entities carry no behavior beyond key derivation and conversions; matching lives in
//! [`CredentialStore`](crate::cache::CredentialStore).

// self
use crate::{
	_prelude::*,
	auth::{AccountInfo, ClientId, HomeAccountId, IdTokenClaims, ScopeSet},
	cache::{TokenSecret, key},
};

/// Authority type recorded on accounts issued by the default identity service.
pub const AUTHORITY_TYPE_MSSTS: &str = "MSSTS";

/// Credential discriminator stored on every credential entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
	/// OIDC ID token.
	IdToken,
	/// Bearer access token.
	AccessToken,
	/// Access token bound to a non-bearer scheme.
	#[serde(rename = "AccessToken_With_AuthScheme")]
	AccessTokenWithAuthScheme,
	/// Refresh token.
	RefreshToken,
}
impl CredentialType {
	/// Wire label used in keys and stored JSON.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialType::IdToken => "IdToken",
			CredentialType::AccessToken => "AccessToken",
			CredentialType::AccessTokenWithAuthScheme => "AccessToken_With_AuthScheme",
			CredentialType::RefreshToken => "RefreshToken",
		}
	}

	/// Access-token credential type that stores tokens of `scheme`.
	pub fn for_scheme(scheme: AuthenticationScheme) -> Self {
		match scheme {
			AuthenticationScheme::Bearer => CredentialType::AccessToken,
			_ => CredentialType::AccessTokenWithAuthScheme,
		}
	}
}
impl Display for CredentialType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Token scheme an access token was issued for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthenticationScheme {
	/// Plain bearer tokens.
	#[default]
	Bearer,
	/// Proof-of-possession tokens.
	#[serde(rename = "pop")]
	Pop,
	/// SSH certificates.
	#[serde(rename = "ssh-cert")]
	Ssh,
}
impl AuthenticationScheme {
	/// Wire label used in keys and stored JSON.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthenticationScheme::Bearer => "Bearer",
			AuthenticationScheme::Pop => "pop",
			AuthenticationScheme::Ssh => "ssh-cert",
		}
	}
}
impl Display for AuthenticationScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Cached account record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntity {
	/// Stable cross-tenant identifier.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: String,
	/// Tenant.
	pub realm: String,
	/// Tenant-local object identifier.
	pub local_account_id: String,
	/// Sign-in name.
	pub username: String,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Issuing service family.
	pub authority_type: String,
	/// Raw client-info blob returned by the service.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_info: Option<String>,
	/// Claims of the ID token the account was built from.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token_claims: Option<IdTokenClaims>,
}
impl AccountEntity {
	/// Cache key of this account.
	pub fn cache_key(&self) -> String {
		key::account_key(&self.home_account_id, &self.environment, &self.realm)
	}

	/// Builds a best-effort record from a caller-supplied account.
	pub fn from_account_info(info: &AccountInfo) -> Self {
		Self {
			home_account_id: info.home_account_id.clone(),
			environment: info.environment.clone(),
			realm: info.tenant_id.clone(),
			local_account_id: info.local_account_id.clone(),
			username: info.username.clone(),
			name: info.name.clone(),
			authority_type: AUTHORITY_TYPE_MSSTS.into(),
			client_info: None,
			id_token_claims: info.id_token_claims.clone(),
		}
	}

	/// Caller-facing view of the record.
	pub fn to_account_info(&self) -> AccountInfo {
		AccountInfo {
			home_account_id: self.home_account_id.clone(),
			environment: self.environment.clone(),
			tenant_id: self.realm.clone(),
			local_account_id: self.local_account_id.clone(),
			username: self.username.clone(),
			name: self.name.clone(),
			id_token_claims: self.id_token_claims.clone(),
		}
	}
}

/// Fields shared by every credential record, used for cascading removal.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CredentialHeader {
	pub home_account_id: String,
	pub environment: String,
	pub client_id: String,
}

/// Cached ID token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTokenEntity {
	/// Owning home account.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: String,
	/// Always [`CredentialType::IdToken`].
	pub credential_type: CredentialType,
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Raw compact JWT.
	pub secret: TokenSecret,
	/// Tenant.
	pub realm: String,
}
impl IdTokenEntity {
	/// Creates an ID token owned by `account`.
	pub fn new(account: &AccountEntity, client_id: &ClientId, secret: impl Into<TokenSecret>) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			environment: account.environment.clone(),
			credential_type: CredentialType::IdToken,
			client_id: client_id.clone(),
			secret: secret.into(),
			realm: account.realm.clone(),
		}
	}

	/// Cache key of this token.
	pub fn cache_key(&self) -> String {
		key::CredentialKey {
			home_account_id: &self.home_account_id,
			environment: &self.environment,
			credential_type: CredentialType::IdToken,
			client_or_family_id: &self.client_id,
			realm: &self.realm,
			target: "",
			requested_claims_hash: None,
			scheme: AuthenticationScheme::Bearer,
		}
		.render()
	}

	/// Decoded claims, or `None` when the secret is not a readable JWT.
	pub fn claims(&self) -> Option<IdTokenClaims> {
		IdTokenClaims::from_token(self.secret.expose()).ok()
	}
}

/// Cached access token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenEntity {
	/// Owning home account.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: String,
	/// [`CredentialType::AccessToken`] or [`CredentialType::AccessTokenWithAuthScheme`].
	pub credential_type: CredentialType,
	/// Client the token was issued to.
	pub client_id: ClientId,
	/// Token value.
	pub secret: TokenSecret,
	/// Tenant.
	pub realm: String,
	/// Space-delimited granted scopes, in the order they were granted.
	pub target: String,
	/// Instant the token was written.
	#[serde(with = "time::serde::timestamp")]
	pub cached_at: OffsetDateTime,
	/// Expiry instant.
	#[serde(with = "time::serde::timestamp")]
	pub expires_on: OffsetDateTime,
	/// Extended expiry granted during service outages.
	#[serde(default, with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub extended_expires_on: Option<OffsetDateTime>,
	/// Token scheme.
	#[serde(default)]
	pub token_type: AuthenticationScheme,
	/// Raw request claims the token was minted for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub requested_claims: Option<String>,
	/// Hash of [`Self::requested_claims`].
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub requested_claims_hash: Option<String>,
}
impl AccessTokenEntity {
	/// Creates a bearer access token owned by `account`.
	pub fn new(
		account: &AccountEntity,
		client_id: &ClientId,
		secret: impl Into<TokenSecret>,
		target: &ScopeSet,
		cached_at: OffsetDateTime,
		expires_on: OffsetDateTime,
	) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			environment: account.environment.clone(),
			credential_type: CredentialType::AccessToken,
			client_id: client_id.clone(),
			secret: secret.into(),
			realm: account.realm.clone(),
			target: target.to_target(),
			cached_at,
			expires_on,
			extended_expires_on: None,
			token_type: AuthenticationScheme::Bearer,
			requested_claims: None,
			requested_claims_hash: None,
		}
	}

	/// Sets the token scheme and the matching credential type.
	pub fn with_scheme(mut self, scheme: AuthenticationScheme) -> Self {
		self.token_type = scheme;
		self.credential_type = CredentialType::for_scheme(scheme);

		self
	}

	/// Records the request claims and their hash.
	pub fn with_requested_claims(mut self, claims: impl Into<String>) -> Self {
		let claims = claims.into();

		self.requested_claims_hash = Some(crate::auth::claims_hash(&claims));
		self.requested_claims = Some(claims);

		self
	}

	/// Sets the extended expiry.
	pub fn with_extended_expires_on(mut self, extended_expires_on: OffsetDateTime) -> Self {
		self.extended_expires_on = Some(extended_expires_on);

		self
	}

	/// Granted scopes parsed from [`Self::target`].
	pub fn scopes(&self) -> ScopeSet {
		ScopeSet::from_target(&self.target)
	}

	/// Cache key of this token.
	pub fn cache_key(&self) -> String {
		key::CredentialKey {
			home_account_id: &self.home_account_id,
			environment: &self.environment,
			credential_type: self.credential_type,
			client_or_family_id: &self.client_id,
			realm: &self.realm,
			target: &self.target,
			requested_claims_hash: self.requested_claims_hash.as_deref(),
			scheme: self.token_type,
		}
		.render()
	}

	/// Returns true when both tokens live in the same cache partition.
	pub(crate) fn same_partition(&self, other: &Self) -> bool {
		self.home_account_id == other.home_account_id
			&& self.environment.eq_ignore_ascii_case(&other.environment)
			&& self.client_id == other.client_id
			&& self.realm.eq_ignore_ascii_case(&other.realm)
			&& self.token_type == other.token_type
			&& self.requested_claims_hash == other.requested_claims_hash
	}
}

/// Cached refresh token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenEntity {
	/// Owning home account.
	pub home_account_id: HomeAccountId,
	/// Issuer host.
	pub environment: String,
	/// Always [`CredentialType::RefreshToken`].
	pub credential_type: CredentialType,
	/// Client that stored the token.
	pub client_id: ClientId,
	/// Token value.
	pub secret: TokenSecret,
	/// Family the token is shared with, when it is a family refresh token.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
	/// Expiry instant, when the service reports one.
	#[serde(default, with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub expires_on: Option<OffsetDateTime>,
}
impl RefreshTokenEntity {
	/// Creates a refresh token owned by `account`.
	pub fn new(account: &AccountEntity, client_id: &ClientId, secret: impl Into<TokenSecret>) -> Self {
		Self {
			home_account_id: account.home_account_id.clone(),
			environment: account.environment.clone(),
			credential_type: CredentialType::RefreshToken,
			client_id: client_id.clone(),
			secret: secret.into(),
			family_id: None,
			expires_on: None,
		}
	}

	/// Marks the token as a family refresh token.
	pub fn with_family_id(mut self, family_id: impl Into<String>) -> Self {
		self.family_id = Some(family_id.into());

		self
	}

	/// Sets the expiry instant.
	pub fn with_expires_on(mut self, expires_on: OffsetDateTime) -> Self {
		self.expires_on = Some(expires_on);

		self
	}

	/// Cache key of this token; family tokens are keyed by family id instead of client id.
	pub fn cache_key(&self) -> String {
		key::CredentialKey {
			home_account_id: &self.home_account_id,
			environment: &self.environment,
			credential_type: CredentialType::RefreshToken,
			client_or_family_id: self.family_id.as_deref().unwrap_or(&self.client_id),
			realm: "",
			target: "",
			requested_claims_hash: None,
			scheme: AuthenticationScheme::Bearer,
		}
		.render()
	}
}

/// Cached discovery result for an authority host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityMetadataEntity {
	/// Host this entry describes.
	pub host: String,
	/// Hosts serving the same identity partition.
	pub aliases: Vec<String>,
	/// Host used as the cache environment.
	pub preferred_cache: String,
	/// Host used for network calls.
	pub preferred_network: String,
	/// Canonical authority URL.
	pub canonical_authority: String,
	/// Authorization endpoint, when discovered.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub authorization_endpoint: Option<String>,
	/// Token endpoint, when discovered.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_endpoint: Option<String>,
	/// Issuer, when discovered.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub issuer: Option<String>,
	/// Instant after which the entry must be rediscovered.
	#[serde(with = "time::serde::timestamp")]
	pub expires_at: OffsetDateTime,
}
impl AuthorityMetadataEntity {
	/// Cache key of this entry for `client_id`.
	pub fn cache_key(&self, client_id: &str) -> String {
		key::authority_metadata_key(client_id, &self.host)
	}

	/// Returns true once the entry must be rediscovered.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}

	/// Returns true if `host` is one of the aliases.
	pub fn has_alias(&self, host: &str) -> bool {
		self.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(host))
	}
}

/// Per-client application metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadataEntity {
	/// Client the entry describes.
	pub client_id: ClientId,
	/// Issuer host.
	pub environment: String,
	/// Family the client belongs to, when it participates in family refresh tokens.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub family_id: Option<String>,
}
impl AppMetadataEntity {
	/// Cache key of this entry.
	pub fn cache_key(&self) -> String {
		key::app_metadata_key(&self.environment, &self.client_id)
	}
}

/// Account plus credentials written together after a token response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheRecord {
	/// Account to write.
	pub account: Option<AccountEntity>,
	/// ID token to write.
	pub id_token: Option<IdTokenEntity>,
	/// Access token to write.
	pub access_token: Option<AccessTokenEntity>,
	/// Refresh token to write.
	pub refresh_token: Option<RefreshTokenEntity>,
	/// App metadata to write.
	pub app_metadata: Option<AppMetadataEntity>,
}
