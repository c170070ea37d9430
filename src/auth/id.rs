//! Validated identifiers used as cache-key components.
//!
//! Cache keys are built by joining identifiers with `-` and `|`, so an identifier must
//! be non-empty and free of whitespace to keep keys unambiguous. Each identifier kind is
//! a zero-sized marker implementing [`IdKind`]; [`Identifier`] carries the string.

// std
use std::{
	borrow::Borrow,
	cmp::Ordering,
	hash::{Hash, Hasher},
	marker::PhantomData,
	ops::Deref,
};
// crates.io
use serde::{Deserializer, Serializer, de::Error as _};
// self
use crate::_prelude::*;

/// OAuth client (application) identifier partitioning the cache.
pub type ClientId = Identifier<Client>;
/// Stable cross-tenant identifier of an end user, usually `<uid>.<utid>`.
pub type HomeAccountId = Identifier<HomeAccount>;

/// Marker describing one identifier kind.
pub trait IdKind {
	/// Label used in errors and `Debug` output.
	const LABEL: &'static str;
	/// Maximum length in bytes.
	const MAX_LEN: usize = 256;
}

/// Marker for [`ClientId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Client {}
impl IdKind for Client {
	const LABEL: &'static str = "Client";
}

/// Marker for [`HomeAccountId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HomeAccount {}
impl IdKind for HomeAccount {
	const LABEL: &'static str = "HomeAccount";
	// `<uid>.<utid>` where both halves are GUID-sized or base64url object ids.
	const MAX_LEN: usize = 512;
}

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Identifier kind label.
		kind: &'static str,
	},
	/// The identifier contains a whitespace character at `position`.
	#[error("{kind} identifier contains whitespace at byte {position}.")]
	ContainsWhitespace {
		/// Identifier kind label.
		kind: &'static str,
		/// Byte offset of the first whitespace character.
		position: usize,
	},
	/// The identifier exceeded the allowed length.
	#[error("{kind} identifier exceeds {max} bytes.")]
	TooLong {
		/// Identifier kind label.
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

/// Non-empty, whitespace-free identifier of kind `K`.
pub struct Identifier<K> {
	value: String,
	kind: PhantomData<fn() -> K>,
}
impl<K> Identifier<K>
where
	K: IdKind,
{
	/// Validates `value` and wraps it.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		Self::try_from(value.as_ref().to_owned())
	}

	/// Returns the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.value
	}

	/// Consumes the identifier, returning the owned string.
	pub fn into_string(self) -> String {
		self.value
	}

	fn validate(value: &str) -> Result<(), IdentifierError> {
		let kind = K::LABEL;

		if value.is_empty() {
			return Err(IdentifierError::Empty { kind });
		}
		if let Some((position, _)) = value.char_indices().find(|(_, c)| c.is_whitespace()) {
			return Err(IdentifierError::ContainsWhitespace { kind, position });
		}
		if value.len() > K::MAX_LEN {
			return Err(IdentifierError::TooLong { kind, max: K::MAX_LEN });
		}

		Ok(())
	}
}
impl<K> TryFrom<String> for Identifier<K>
where
	K: IdKind,
{
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::validate(&value)?;

		Ok(Self { value, kind: PhantomData })
	}
}
impl<K> FromStr for Identifier<K>
where
	K: IdKind,
{
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl<K> Clone for Identifier<K> {
	fn clone(&self) -> Self {
		Self { value: self.value.clone(), kind: PhantomData }
	}
}
impl<K> PartialEq for Identifier<K> {
	fn eq(&self, other: &Self) -> bool {
		self.value == other.value
	}
}
impl<K> Eq for Identifier<K> {}
impl<K> PartialOrd for Identifier<K> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
impl<K> Ord for Identifier<K> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.value.cmp(&other.value)
	}
}
impl<K> Hash for Identifier<K> {
	// Must hash like `str` so `Borrow<str>` lookups work.
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.value.hash(state);
	}
}
impl<K> Deref for Identifier<K> {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.value
	}
}
impl<K> AsRef<str> for Identifier<K> {
	fn as_ref(&self) -> &str {
		&self.value
	}
}
impl<K> Borrow<str> for Identifier<K> {
	fn borrow(&self) -> &str {
		&self.value
	}
}
impl<K> Debug for Identifier<K>
where
	K: IdKind,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}({})", K::LABEL, self.value)
	}
}
impl<K> Display for Identifier<K> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.value)
	}
}
impl<K> Serialize for Identifier<K> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.value)
	}
}
impl<'de, K> Deserialize<'de> for Identifier<K>
where
	K: IdKind,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Self::try_from(String::deserialize(deserializer)?).map_err(D::Error::custom)
	}
}
