//! Scope modeling helpers used for cache matching.

// std
use std::hash::{Hash, Hasher};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// OpenID Connect `openid` scope.
pub const OPENID_SCOPE: &str = "openid";
/// OpenID Connect `profile` scope.
pub const PROFILE_SCOPE: &str = "profile";
/// Scope requesting a refresh token.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";
/// Scopes implicitly attached to every OIDC request.
pub const OIDC_DEFAULT_SCOPES: [&str; 3] = [OPENID_SCOPE, PROFILE_SCOPE, OFFLINE_ACCESS_SCOPE];

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Order-preserving set of OAuth scopes with case-insensitive membership.
///
/// The first spelling of each scope wins and insertion order is kept so a cached
/// `target` renders back exactly as it was granted. Equality and hashing ignore
/// order and case.
#[derive(Clone, Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Creates a scope set from any iterator, rejecting empty or padded entries.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut kept = Vec::new();

		for scope in scopes {
			let scope = scope.into();

			if scope.is_empty() {
				return Err(ScopeValidationError::Empty);
			}
			if scope.chars().any(char::is_whitespace) {
				return Err(ScopeValidationError::ContainsWhitespace { scope });
			}

			push_unique(&mut kept, scope);
		}

		Ok(Self::from_vec(kept))
	}

	/// Parses a space-delimited cache `target`, tolerating repeated whitespace.
	pub fn from_target(target: &str) -> Self {
		let mut kept = Vec::new();

		target.split_whitespace().for_each(|scope| push_unique(&mut kept, scope.to_owned()));

		Self::from_vec(kept)
	}

	fn from_vec(scopes: Vec<String>) -> Self {
		Self { scopes: Arc::from(scopes) }
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the set contains the provided scope (ASCII case-insensitive).
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.iter().any(|candidate| candidate.eq_ignore_ascii_case(scope))
	}

	/// Returns true if every scope of `other` is present in this set.
	pub fn contains_all(&self, other: &ScopeSet) -> bool {
		other.iter().all(|scope| self.contains(scope))
	}

	/// Returns true if the two sets share at least one scope.
	pub fn intersects(&self, other: &ScopeSet) -> bool {
		other.iter().any(|scope| self.contains(scope))
	}

	/// Returns true if the set holds nothing besides the OIDC default scopes.
	pub fn contains_only_oidc_scopes(&self) -> bool {
		self.iter().all(|scope| OIDC_DEFAULT_SCOPES.iter().any(|d| d.eq_ignore_ascii_case(scope)))
	}

	/// Returns a copy without the provided scopes.
	pub fn without(&self, removed: &[&str]) -> Self {
		Self::from_vec(
			self.scopes
				.iter()
				.filter(|scope| !removed.iter().any(|r| r.eq_ignore_ascii_case(scope)))
				.cloned()
				.collect(),
		)
	}

	/// Scope set used when searching cached access tokens.
	///
	/// Resource scopes are compared without the OIDC defaults, since providers do not
	/// echo them back in the granted target. A pure OIDC request only drops
	/// `offline_access`.
	pub fn search_scopes(&self) -> Self {
		if self.contains_only_oidc_scopes() {
			self.without(&[OFFLINE_ACCESS_SCOPE])
		} else {
			self.without(&OIDC_DEFAULT_SCOPES)
		}
	}

	/// Iterator over scopes in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(|s| s.as_str())
	}

	/// Space-delimited representation stored as a cache `target`.
	pub fn to_target(&self) -> String {
		self.scopes.join(" ")
	}

	/// Returns the scopes in insertion order.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}

	/// Order- and case-independent SHA-256 fingerprint (base64url, no padding), used to
	/// key in-flight acquisitions.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.normalized().join(" ").as_bytes());

		URL_SAFE_NO_PAD.encode(digest)
	}

	fn normalized(&self) -> Vec<String> {
		let mut normalized = self.scopes.iter().map(|s| s.to_ascii_lowercase()).collect::<Vec<_>>();

		normalized.sort_unstable();

		normalized
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.len() == other.len() && self.contains_all(other)
	}
}
impl Eq for ScopeSet {}
impl Hash for ScopeSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.normalized().hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.to_target())
	}
}

impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.collect_seq(self.scopes.iter())
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

fn push_unique(kept: &mut Vec<String>, scope: String) {
	if !kept.iter().any(|k| k.eq_ignore_ascii_case(&scope)) {
		kept.push(scope);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn scopes_keep_order_and_dedupe_case_insensitively() {
		let scopes = ScopeSet::new(["User.Read", "email", "user.read"])
			.expect("Scope fixture should be valid.");

		assert_eq!(scopes.as_slice(), ["User.Read".to_string(), "email".to_string()]);
		assert_eq!(scopes.to_target(), "User.Read email");
	}

	#[test]
	fn equality_and_fingerprint_ignore_order_and_case() {
		let lhs = ScopeSet::new(["profile", "Email"]).expect("Left-hand scopes should be valid.");
		let rhs = ScopeSet::new(["email", "profile"]).expect("Right-hand scopes should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.fingerprint(), rhs.fingerprint());
		assert_eq!(HashSet::from([lhs, rhs]).len(), 1);
	}

	#[test]
	fn scopes_reject_whitespace_padding() {
		let err = ScopeSet::new([" profile "]).expect_err("Padded scopes must be rejected.");

		assert!(matches!(err, ScopeValidationError::ContainsWhitespace { .. }));
		assert!(ScopeSet::new([""]).is_err());
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn target_parsing_is_lenient() {
		let target = ScopeSet::from_target("  openid   profile User.Read ");

		assert_eq!(target.len(), 3);
		assert!(target.contains("user.read"));
	}

	#[test]
	fn superset_and_intersection_checks() {
		let granted = ScopeSet::from_target("openid profile User.Read Mail.Read");
		let requested = ScopeSet::new(["mail.read"]).expect("Requested scopes should be valid.");
		let foreign = ScopeSet::new(["Files.Read"]).expect("Foreign scopes should be valid.");

		assert!(granted.contains_all(&requested));
		assert!(!granted.contains_all(&foreign));
		assert!(granted.intersects(&requested));
		assert!(!granted.intersects(&foreign));
		assert!(granted.contains_all(&ScopeSet::default()), "Empty sets are always contained.");
	}

	#[test]
	fn search_scopes_strip_oidc_defaults() {
		let mixed = ScopeSet::new(["openid", "offline_access", "User.Read"])
			.expect("Mixed scopes should be valid.");

		assert_eq!(mixed.search_scopes().to_target(), "User.Read");

		let oidc_only = ScopeSet::new(["openid", "profile", "offline_access"])
			.expect("OIDC scopes should be valid.");

		assert_eq!(oidc_only.search_scopes().to_target(), "openid profile");
	}
}
