//! Silent cache-lookup decision engine.
//!
//! [`SilentFlowClient::acquire_cached_token`] makes one pass over the cache per request
//! and ends in either a cached [`AuthenticationResult`] or a typed failure. The common
//! failure, [`Error::TokenRefreshRequired`], tells the caller to fall through to a
//! refresh exchange. Lookups never mutate the cache; only the hit counters move.

mod metrics;

pub use metrics::SilentFlowMetrics;

// self
use crate::{
	_prelude::*,
	auth::{AccountInfo, Authority, IdTokenClaims, ScopeSet, is_empty_claims},
	cache::{
		AccessTokenEntity, AccessTokenQuery, AccountEntity, AuthenticationScheme,
		CredentialStore, IdTokenEntity, TokenSecret,
	},
	clock::Clock,
	config::ClientConfig,
	flows::new_correlation_id,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Input of a silent acquisition.
#[derive(Clone, Debug)]
pub struct SilentFlowRequest {
	/// Requested scopes; empty requests accept any cached access token of the account.
	pub scopes: ScopeSet,
	/// Account to acquire for; required.
	pub account: Option<AccountInfo>,
	/// Authority override; defaults to the configured authority.
	pub authority: Option<Authority>,
	/// Identifier threaded through logs and storage writes.
	pub correlation_id: String,
	/// Skip the cache entirely.
	pub force_refresh: bool,
	/// Request claims JSON.
	pub claims: Option<String>,
	/// Maximum time since the last end-user authentication.
	pub max_age: Option<Duration>,
	/// Opaque value echoed in the result.
	pub state: Option<String>,
	/// Requested token scheme.
	pub scheme: AuthenticationScheme,
}
impl SilentFlowRequest {
	/// Creates a request with a fresh correlation id and no optional constraints.
	pub fn new(scopes: ScopeSet, account: Option<AccountInfo>) -> Self {
		Self {
			scopes,
			account,
			authority: None,
			correlation_id: new_correlation_id(),
			force_refresh: false,
			claims: None,
			max_age: None,
			state: None,
			scheme: AuthenticationScheme::Bearer,
		}
	}

	/// Overrides the authority.
	pub fn with_authority(mut self, authority: Authority) -> Self {
		self.authority = Some(authority);

		self
	}

	/// Overrides the correlation id.
	pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
		self.correlation_id = correlation_id.into();

		self
	}

	/// Overrides the force-refresh flag.
	pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
		self.force_refresh = force_refresh;

		self
	}

	/// Attaches request claims.
	pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
		self.claims = Some(claims.into());

		self
	}

	/// Sets the maximum authentication age.
	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(max_age);

		self
	}

	/// Sets the maximum authentication age in milliseconds.
	pub fn with_max_age_ms(self, max_age_ms: u64) -> Self {
		self.with_max_age(Duration::milliseconds(i64::try_from(max_age_ms).unwrap_or(i64::MAX)))
	}

	/// Sets the echoed state.
	pub fn with_state(mut self, state: impl Into<String>) -> Self {
		self.state = Some(state.into());

		self
	}

	/// Sets the requested token scheme.
	pub fn with_scheme(mut self, scheme: AuthenticationScheme) -> Self {
		self.scheme = scheme;

		self
	}
}

/// Tokens and metadata handed back to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticationResult {
	/// Canonical authority the result applies to.
	pub authority: String,
	/// User identifier (`oid`, else `sub`, else the local account id).
	pub unique_id: String,
	/// Tenant of the token.
	pub tenant_id: String,
	/// Granted scopes, in granted order.
	pub scopes: Vec<String>,
	/// Account the tokens belong to.
	pub account: AccountInfo,
	/// Raw ID token, when cached.
	pub id_token: Option<TokenSecret>,
	/// Claims of the ID token.
	pub id_token_claims: Option<IdTokenClaims>,
	/// Access token.
	pub access_token: TokenSecret,
	/// True when served without contacting a token issuer.
	pub from_cache: bool,
	/// Access-token expiry.
	pub expires_on: OffsetDateTime,
	/// Extended expiry, when granted.
	pub ext_expires_on: Option<OffsetDateTime>,
	/// Token scheme.
	pub token_type: AuthenticationScheme,
	/// Correlation id of the request.
	pub correlation_id: String,
	/// Echoed request state, empty when none was sent.
	pub state: String,
}

/// Cache-only decision engine.
#[derive(Clone)]
pub struct SilentFlowClient {
	config: ClientConfig,
	store: Arc<CredentialStore>,
	clock: Arc<dyn Clock>,
	metrics: Arc<SilentFlowMetrics>,
}
impl SilentFlowClient {
	/// Creates an engine over `store`.
	pub fn new(config: ClientConfig, store: Arc<CredentialStore>, clock: Arc<dyn Clock>) -> Self {
		Self { config, store, clock, metrics: Default::default() }
	}

	/// Shares an existing metrics sink.
	pub fn with_metrics(mut self, metrics: Arc<SilentFlowMetrics>) -> Self {
		self.metrics = metrics;

		self
	}

	/// Lookup counters.
	pub fn metrics(&self) -> &Arc<SilentFlowMetrics> {
		&self.metrics
	}

	/// Credential store backing the engine.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// Client configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Serves `request` from the cache.
	///
	/// Returns the result together with the ID-token claims that were evaluated, so
	/// callers can detect claims newer than the ones on the account they passed in.
	///
	/// Fails with [`Error::NoAccountInSilentRequest`] without an account; with
	/// [`Error::TokenRefreshRequired`] on `force_refresh`, non-empty claims while
	/// claims-based caching is off, a missing access token, an access token expiring
	/// within the renewal offset, or one cached in the future; with
	/// [`Error::AuthTimeNotFound`] or [`Error::MaxAgeTranspired`] when `max_age` cannot
	/// be satisfied.
	pub fn acquire_cached_token(
		&self,
		request: &SilentFlowRequest,
	) -> Result<(AuthenticationResult, Option<IdTokenClaims>)> {
		const KIND: FlowKind = FlowKind::SilentCache;

		let span = FlowSpan::new(KIND, "acquire_cached_token")
			.with_correlation_id(&request.correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span.in_scope(|| self.lookup(request));

		match &result {
			Ok(_) => {
				self.metrics.record_cache_hit();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(e) => {
				if e.is_refresh_required() {
					self.metrics.record_refresh_required();
				} else {
					self.metrics.record_failure();
				}

				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::debug_event(
					KIND,
					"acquire_cached_token",
					&format!("{e} (correlation id {})", request.correlation_id),
				);
			},
		}

		result
	}

	fn lookup(
		&self,
		request: &SilentFlowRequest,
	) -> Result<(AuthenticationResult, Option<IdTokenClaims>)> {
		let requested = request.account.as_ref().ok_or(Error::NoAccountInSilentRequest)?;
		let account = self
			.store
			.read_account_from_cache(requested)
			.unwrap_or_else(|| AccountEntity::from_account_info(requested));

		if request.force_refresh {
			return Err(Error::TokenRefreshRequired);
		}

		let claims = request.claims.as_deref().filter(|claims| !is_empty_claims(claims));

		if claims.is_some() && !self.config.cache.claims_based_caching_enabled {
			return Err(Error::TokenRefreshRequired);
		}

		let id_token = self.store.get_id_token(&account);
		let access_token = self
			.store
			.get_access_token(
				&account,
				&AccessTokenQuery { scopes: &request.scopes, claims, scheme: request.scheme },
			)
			.ok_or(Error::TokenRefreshRequired)?;
		let now = self.clock.now();

		if is_expiring(&access_token, now, self.config.cache.renewal_offset())
			|| access_token.cached_at > now
		{
			return Err(Error::TokenRefreshRequired);
		}

		let id_token_claims = id_token
			.as_ref()
			.and_then(IdTokenEntity::claims)
			.or_else(|| account.id_token_claims.clone());

		if let Some(max_age) = request.max_age {
			let auth_time = id_token_claims
				.as_ref()
				.and_then(IdTokenClaims::auth_time_at)
				.ok_or(Error::AuthTimeNotFound)?;

			if max_age.is_zero() || now - auth_time > max_age {
				return Err(Error::MaxAgeTranspired);
			}
		}

		let result = self.build_result(request, &account, id_token, id_token_claims.clone(), access_token);

		Ok((result, id_token_claims))
	}

	fn build_result(
		&self,
		request: &SilentFlowRequest,
		account: &AccountEntity,
		id_token: Option<IdTokenEntity>,
		id_token_claims: Option<IdTokenClaims>,
		access_token: AccessTokenEntity,
	) -> AuthenticationResult {
		let authority = request.authority.as_ref().unwrap_or(&self.config.authority).canonical();
		let mut account_info = account.to_account_info();

		if id_token_claims.is_some() {
			account_info.id_token_claims = id_token_claims.clone();
		}

		let unique_id = id_token_claims
			.as_ref()
			.and_then(|claims| claims.unique_id().map(str::to_owned))
			.unwrap_or_else(|| account.local_account_id.clone());
		let tenant_id = id_token_claims
			.as_ref()
			.and_then(|claims| claims.tid.clone())
			.unwrap_or_else(|| account.realm.clone());

		AuthenticationResult {
			authority,
			unique_id,
			tenant_id,
			scopes: access_token.scopes().iter().map(str::to_owned).collect(),
			account: account_info,
			id_token: id_token.map(|token| token.secret.clone()),
			id_token_claims,
			access_token: access_token.secret.clone(),
			from_cache: true,
			expires_on: access_token.expires_on,
			ext_expires_on: access_token.extended_expires_on,
			token_type: access_token.token_type,
			correlation_id: request.correlation_id.clone(),
			state: request.state.clone().unwrap_or_default(),
		}
	}
}
impl Debug for SilentFlowClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SilentFlowClient")
			.field("config", &self.config)
			.field("store", &self.store)
			.field("metrics", &self.metrics)
			.finish()
	}
}

fn is_expiring(token: &AccessTokenEntity, now: OffsetDateTime, offset: Duration) -> bool {
	now + offset >= token.expires_on
}
