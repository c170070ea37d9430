//! Cache lookup policies and the ordered token-source fallback.
//!
//! [`SilentTokenClient::acquire_token_silent`] consults the cache engine when the policy
//! allows it. On [`Error::TokenRefreshRequired`] it walks the registered
//! [`TokenSource`]s in order, skipping the ones the policy excludes or that report
//! themselves unavailable, and returns the first success. Concurrent fallbacks for the
//! same account and scopes are serialized, and the cache is re-read once the guard is
//! held so only one caller pays for the exchange.

// self
use crate::{
	_prelude::*,
	cache::{AccountEntity, CacheRecord, CredentialStore, RefreshTokenEntity},
	flows::{AuthenticationResult, SilentFlowClient, SilentFlowRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Boxed future returned by [`TokenSource::acquire`].
pub type TokenSourceFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenSourceOutcome>> + 'a + Send>>;

/// Which cache layers a silent request may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheLookupPolicy {
	/// Cached access token, then refresh token, then network sources.
	#[default]
	Default,
	/// Cached access token only.
	AccessToken,
	/// Cached access token, then refresh token.
	AccessTokenAndRefreshToken,
	/// Refresh token only; the cached access token is ignored.
	RefreshToken,
	/// Refresh token, then network sources; the cached access token is ignored.
	RefreshTokenAndNetwork,
	/// Network sources only.
	Skip,
}
impl CacheLookupPolicy {
	/// Returns true if the cached access token may be served.
	pub fn uses_cached_access_token(self) -> bool {
		matches!(self, Self::Default | Self::AccessToken | Self::AccessTokenAndRefreshToken)
	}

	/// Returns true if sources of `kind` may be attempted.
	pub fn allows(self, kind: TokenSourceKind) -> bool {
		match kind {
			TokenSourceKind::RefreshToken => matches!(
				self,
				Self::Default
					| Self::AccessTokenAndRefreshToken
					| Self::RefreshToken | Self::RefreshTokenAndNetwork
			),
			TokenSourceKind::Network =>
				matches!(self, Self::Default | Self::RefreshTokenAndNetwork | Self::Skip),
		}
	}
}

/// Layer a token source stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenSourceKind {
	/// Redeems the cached refresh token.
	RefreshToken,
	/// Obtains tokens without cached material (identity provider or broker).
	Network,
}

/// Inputs handed to a token source.
#[derive(Clone, Debug)]
pub struct TokenSourceContext<'a> {
	/// Original request.
	pub request: &'a SilentFlowRequest,
	/// Account resolved from the cache, or built from the request.
	pub account: &'a AccountEntity,
	/// Cached refresh token, when one exists.
	pub refresh_token: Option<&'a RefreshTokenEntity>,
}

/// Successful source result plus the cache record to hydrate from it.
#[derive(Clone, Debug)]
pub struct TokenSourceOutcome {
	/// Result returned to the caller.
	pub result: AuthenticationResult,
	/// Entries to write to the cache before returning.
	pub record: Option<CacheRecord>,
}

/// Fallback acquisition path attempted when the cache cannot serve a request.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Stable label for logs.
	fn name(&self) -> &'static str;

	/// Layer this source stands for.
	fn kind(&self) -> TokenSourceKind;

	/// Returns false to skip this source for `request`.
	fn is_available(&self, request: &SilentFlowRequest) -> bool {
		let _ = request;

		true
	}

	/// Acquires tokens.
	fn acquire<'a>(&'a self, context: TokenSourceContext<'a>) -> TokenSourceFuture<'a>;
}

/// Silent acquisition facade combining the cache engine with ordered fallbacks.
#[derive(Clone)]
pub struct SilentTokenClient {
	engine: SilentFlowClient,
	sources: Vec<Arc<dyn TokenSource>>,
	flow_guards: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}
impl SilentTokenClient {
	/// Creates a client with no fallback sources.
	pub fn new(engine: SilentFlowClient) -> Self {
		Self { engine, sources: Vec::new(), flow_guards: Default::default() }
	}

	/// Appends a fallback source; sources are attempted in insertion order.
	pub fn with_source(mut self, source: Arc<dyn TokenSource>) -> Self {
		self.sources.push(source);

		self
	}

	/// Cache engine.
	pub fn engine(&self) -> &SilentFlowClient {
		&self.engine
	}

	/// Acquires a token under `policy`.
	pub async fn acquire_token_silent(
		&self,
		request: &SilentFlowRequest,
		policy: CacheLookupPolicy,
	) -> Result<AuthenticationResult> {
		const KIND: FlowKind = FlowKind::SilentFallback;

		let span = FlowSpan::new(KIND, "acquire_token_silent")
			.with_correlation_id(&request.correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.acquire_inner(request, policy)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));

		result
	}

	async fn acquire_inner(
		&self,
		request: &SilentFlowRequest,
		policy: CacheLookupPolicy,
	) -> Result<AuthenticationResult> {
		let requested = request.account.as_ref().ok_or(Error::NoAccountInSilentRequest)?;

		if policy.uses_cached_access_token() {
			match self.engine.acquire_cached_token(request) {
				Ok((result, _)) => return Ok(result),
				Err(e) if e.is_refresh_required() && policy != CacheLookupPolicy::AccessToken => {},
				Err(e) => return Err(e),
			}
		}

		let store = self.engine.store();
		let account = store
			.read_account_from_cache(requested)
			.unwrap_or_else(|| AccountEntity::from_account_info(requested));
		let guard = self.flow_guard(&account, request);
		let _singleflight = guard.lock().await;

		// A concurrent caller may have hydrated the cache while we waited.
		if policy.uses_cached_access_token() && !request.force_refresh {
			if let Ok((result, _)) = self.engine.acquire_cached_token(request) {
				return Ok(result);
			}
		}

		let refresh_token = store.get_refresh_token(&account, true);
		let mut last_error = None;

		for source in &self.sources {
			let kind = source.kind();

			if !policy.allows(kind) || !source.is_available(request) {
				continue;
			}
			if kind == TokenSourceKind::RefreshToken && refresh_token.is_none() {
				continue;
			}

			let context =
				TokenSourceContext { request, account: &account, refresh_token: refresh_token.as_ref() };

			match source.acquire(context).await {
				Ok(outcome) => {
					self.hydrate(store, outcome.record.as_ref(), &request.correlation_id);

					return Ok(outcome.result);
				},
				Err(e) => {
					obs::absorbed_fault(
						FlowKind::SilentFallback,
						"acquire_token_silent",
						&format!("Token source {} failed: {e}", source.name()),
					);

					last_error = Some(e);
				},
			}
		}

		Err(last_error.unwrap_or(Error::TokenRefreshRequired))
	}

	// Cache write failures do not invalidate a token the caller already holds.
	fn hydrate(&self, store: &CredentialStore, record: Option<&CacheRecord>, correlation_id: &str) {
		let Some(record) = record else {
			return;
		};

		if let Err(e) = store.save_cache_record(record, correlation_id) {
			obs::absorbed_fault(
				FlowKind::SilentFallback,
				"hydrate",
				&format!("Failed to cache acquired tokens: {e}"),
			);
		}
	}

	fn flow_guard(&self, account: &AccountEntity, request: &SilentFlowRequest) -> Arc<AsyncMutex<()>> {
		let key = format!("{}|{}", account.cache_key(), request.scopes.fingerprint());
		let mut guards = self.flow_guards.lock();

		guards.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}
}
impl Debug for SilentTokenClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentTokenClient")
			.field("engine", &self.engine)
			.field("sources", &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>())
			.finish()
	}
}
