//! Authority URLs and the built-in alias groups of well-known cloud hosts.

// self
use crate::_prelude::*;

/// Alias groups for hosts that serve the same identity partition.
///
/// The first entry of each group is the preferred cache environment.
const KNOWN_ALIAS_GROUPS: &[&[&str]] = &[
	&["login.microsoftonline.com", "login.windows.net", "login.microsoft.com", "sts.windows.net"],
	&["login.partner.microsoftonline.cn", "login.chinacloudapi.cn"],
	&["login.microsoftonline.us", "login.usgovcloudapi.net"],
];

/// Errors raised while parsing an authority URL.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthorityError {
	/// The authority could not be parsed as a URL.
	#[error("Authority is not a valid URL.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Authorities must be served over HTTPS.
	#[error("Authority `{authority}` must use https.")]
	InsecureScheme {
		/// Offending authority string.
		authority: String,
	},
	/// The authority has no host component.
	#[error("Authority `{authority}` has no host.")]
	MissingHost {
		/// Offending authority string.
		authority: String,
	},
	/// The authority has no tenant path segment.
	#[error("Authority `{authority}` has no tenant segment.")]
	MissingTenant {
		/// Offending authority string.
		authority: String,
	},
}

/// Validated authority such as `https://login.microsoftonline.com/common/`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority {
	host: String,
	tenant: String,
}
impl Authority {
	/// Parses and validates an authority URL.
	pub fn parse(value: &str) -> Result<Self, AuthorityError> {
		let url = Url::parse(value).map_err(|source| AuthorityError::InvalidUrl { source })?;

		if url.scheme() != "https" {
			return Err(AuthorityError::InsecureScheme { authority: value.into() });
		}

		let host = url
			.host_str()
			.filter(|h| !h.is_empty())
			.ok_or_else(|| AuthorityError::MissingHost { authority: value.into() })?
			.to_ascii_lowercase();
		let tenant = url
			.path_segments()
			.and_then(|mut segments| segments.find(|s| !s.is_empty()))
			.ok_or_else(|| AuthorityError::MissingTenant { authority: value.into() })?
			.to_owned();

		Ok(Self { host, tenant })
	}

	/// Lowercased host, used as the cache `environment`.
	pub fn host(&self) -> &str {
		&self.host
	}

	/// Tenant path segment (`common`, `organizations`, or a tenant id).
	pub fn tenant(&self) -> &str {
		&self.tenant
	}

	/// Canonical `https://<host>/<tenant>/` form.
	pub fn canonical(&self) -> String {
		format!("https://{}/{}/", self.host, self.tenant)
	}
}
impl Debug for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Authority({})", self.canonical())
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.canonical())
	}
}
impl FromStr for Authority {
	type Err = AuthorityError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}
impl TryFrom<String> for Authority {
	type Error = AuthorityError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value)
	}
}
impl From<Authority> for String {
	fn from(value: Authority) -> Self {
		value.canonical()
	}
}

/// Returns the built-in alias group containing `host`, if any.
pub fn known_alias_group(host: &str) -> Option<&'static [&'static str]> {
	KNOWN_ALIAS_GROUPS
		.iter()
		.copied()
		.find(|group| group.iter().any(|alias| alias.eq_ignore_ascii_case(host)))
}
