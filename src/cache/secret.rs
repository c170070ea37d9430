//! Credential material held by cache entities.

// crates.io
use serde::{Deserializer, Serializer};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;
// self
use crate::_prelude::*;

/// Token string wiped from memory on drop.
///
/// `Debug` prints a short SHA-256 fingerprint instead of the value so two log lines can
/// be matched to the same credential without revealing it. `Display` prints nothing
/// useful at all.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(Zeroizing<String>);
impl TokenSecret {
	/// Wraps a token string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(Zeroizing::new(value.into()))
	}

	/// Returns the raw token. Never log it.
	pub fn expose(&self) -> &str {
		self.0.as_str()
	}

	/// Returns true for an empty token string.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// First eight hex digits of the token's SHA-256 digest.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());

		digest[..4].iter().map(|b| format!("{b:02x}")).collect()
	}
}
impl From<&str> for TokenSecret {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "TokenSecret(sha256:{})", self.fingerprint())
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
impl Serialize for TokenSecret {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.expose())
	}
}
impl<'de> Deserialize<'de> for TokenSecret {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		String::deserialize(deserializer).map(Self::new)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn formatters_hide_the_token() {
		let secret = TokenSecret::new("super-secret");
		let debug = format!("{secret:?}");

		assert!(!debug.contains("super-secret"));
		assert_eq!(debug, format!("TokenSecret(sha256:{})", secret.fingerprint()));
		assert_eq!(secret.fingerprint().len(), 8);
		assert_eq!(format!("{secret}"), "<redacted>");
		assert_eq!(secret.expose(), "super-secret");
	}

	#[test]
	fn fingerprints_tell_tokens_apart() {
		assert_eq!(TokenSecret::from("a").fingerprint(), TokenSecret::from("a").fingerprint());
		assert_ne!(TokenSecret::from("a").fingerprint(), TokenSecret::from("b").fingerprint());
	}

	#[test]
	fn serializes_as_plain_string() {
		let secret = TokenSecret::from(String::from("abc"));
		let json = serde_json::to_string(&secret).expect("Secret should serialize.");

		assert_eq!(json, "\"abc\"");
		assert_eq!(
			serde_json::from_str::<TokenSecret>(&json).expect("Secret should deserialize."),
			secret
		);
	}
}
