//! Deterministic, case-normalized cache keys.
//!
//! Keys are `-`-delimited and lowercased so host or identifier casing never splits a
//! cache partition. Equal keys denote the same logical record; writes overwrite.

// self
use crate::{
	_prelude::*,
	cache::{AuthenticationScheme, CredentialType},
};

/// Prefix of every account key.
pub const ACCOUNT_KEY_PREFIX: &str = "account";
/// Prefix of every credential key.
pub const CREDENTIAL_KEY_PREFIX: &str = "credential";
/// Prefix of authority metadata keys.
pub const AUTHORITY_METADATA_KEY_PREFIX: &str = "authority-metadata";
/// Prefix of app metadata keys.
pub const APP_METADATA_KEY_PREFIX: &str = "appmetadata";

const SEPARATOR: char = '-';

/// Builds `account-<homeAccountId>-<environment>-<realm>`.
pub fn account_key(home_account_id: &str, environment: &str, realm: &str) -> String {
	join([ACCOUNT_KEY_PREFIX, home_account_id, environment, realm])
}

/// Builds `authority-metadata-<clientId>-<host>`.
pub fn authority_metadata_key(client_id: &str, host: &str) -> String {
	join([AUTHORITY_METADATA_KEY_PREFIX, client_id, host])
}

/// Builds `appmetadata-<environment>-<clientId>`.
pub fn app_metadata_key(environment: &str, client_id: &str) -> String {
	join([APP_METADATA_KEY_PREFIX, environment, client_id])
}

/// Identifying fields of a credential key.
///
/// Renders as
/// `credential-<home>-<env>-<type>-<clientOrFamilyId>-<realm>-<target>[-<claimsHash>][-<scheme>]`;
/// the scheme suffix is omitted for bearer tokens.
#[derive(Clone, Copy, Debug)]
pub struct CredentialKey<'a> {
	/// Owning home account.
	pub home_account_id: &'a str,
	/// Issuer host.
	pub environment: &'a str,
	/// Credential discriminator.
	pub credential_type: CredentialType,
	/// Client id, or family id for family refresh tokens.
	pub client_or_family_id: &'a str,
	/// Tenant; empty for refresh tokens.
	pub realm: &'a str,
	/// Scope target; empty for id and refresh tokens.
	pub target: &'a str,
	/// Hash of the request claims the token was minted for.
	pub requested_claims_hash: Option<&'a str>,
	/// Token scheme.
	pub scheme: AuthenticationScheme,
}
impl CredentialKey<'_> {
	/// Renders the lowercased key string.
	pub fn render(&self) -> String {
		let mut key = join([
			CREDENTIAL_KEY_PREFIX,
			self.home_account_id,
			self.environment,
			self.credential_type.as_str(),
			self.client_or_family_id,
			self.realm,
			self.target,
		]);

		if let Some(hash) = self.requested_claims_hash.filter(|h| !h.is_empty()) {
			key.push(SEPARATOR);
			key.push_str(&hash.to_lowercase());
		}
		if self.scheme != AuthenticationScheme::Bearer {
			key.push(SEPARATOR);
			key.push_str(self.scheme.as_str());
		}

		key
	}
}
impl Display for CredentialKey<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.render())
	}
}

fn join<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
	let mut key = String::new();

	for (i, part) in parts.into_iter().enumerate() {
		if i > 0 {
			key.push(SEPARATOR);
		}

		key.push_str(&part.to_lowercase());
	}

	key
}
