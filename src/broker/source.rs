//! Token source that delegates silent requests to a connected broker.

// self
use crate::{
	_prelude::*,
	auth::{IdTokenClaims, ScopeSet, is_empty_claims},
	broker::{BrokerChannel, BrokerError, BrokerMethod, is_broker_available},
	cache::{AccessTokenEntity, AccountEntity, CacheRecord, IdTokenEntity},
	clock::Clock,
	config::ClientConfig,
	flows::{
		AuthenticationResult, SilentFlowRequest, TokenSource, TokenSourceContext,
		TokenSourceFuture, TokenSourceKind, TokenSourceOutcome,
	},
};

#[derive(Debug, Deserialize)]
struct BrokerTokenResponse {
	access_token: String,
	#[serde(default)]
	id_token: Option<String>,
	expires_in: i64,
	#[serde(default)]
	scope: String,
	#[serde(default)]
	state: Option<String>,
	#[serde(default)]
	account: Option<BrokerAccount>,
}

#[derive(Debug, Deserialize)]
struct BrokerAccount {
	id: String,
	#[serde(default, rename = "userName")]
	user_name: Option<String>,
}

/// [`TokenSource`] that sends `GetToken` requests over a [`BrokerChannel`].
#[derive(Clone)]
pub struct BrokerTokenSource {
	channel: Arc<BrokerChannel>,
	config: ClientConfig,
	clock: Arc<dyn Clock>,
}
impl BrokerTokenSource {
	/// Creates a source over a connected channel.
	pub fn new(channel: Arc<BrokerChannel>, config: ClientConfig, clock: Arc<dyn Clock>) -> Self {
		Self { channel, config, clock }
	}

	fn token_request(&self, context: &TokenSourceContext<'_>) -> Value {
		let request = context.request;
		let authority = request.authority.as_ref().unwrap_or(&self.config.authority).canonical();
		let mut body = serde_json::json!({
			"clientId": self.config.client_id.as_str(),
			"authority": authority,
			"scope": request.scopes.to_target(),
			"correlationId": request.correlation_id,
			"accountId": context.account.local_account_id,
			"loginHint": context.account.username,
			"tokenType": request.scheme.as_str(),
		});

		if let Some(object) = body.as_object_mut() {
			if let Some(claims) = request.claims.as_deref().filter(|claims| !is_empty_claims(claims)) {
				object.insert("claims".into(), Value::String(claims.to_owned()));
			}
			if let Some(state) = &request.state {
				object.insert("state".into(), Value::String(state.clone()));
			}
		}

		serde_json::json!({ "method": BrokerMethod::GetToken.as_str(), "request": body })
	}

	fn build_outcome(&self, context: &TokenSourceContext<'_>, value: Value) -> Result<TokenSourceOutcome> {
		let response: BrokerTokenResponse =
			serde_path_to_error::deserialize(value).map_err(BrokerError::from)?;
		let request = context.request;
		let now = self.clock.now();
		let expires_on = expiry_from(now, response.expires_in)?;
		let claims = response.id_token.as_deref().and_then(|token| IdTokenClaims::from_token(token).ok());
		let account = merge_account(context.account, claims.as_ref(), response.account.as_ref());
		let client_id = &self.config.client_id;
		let scopes = if response.scope.trim().is_empty() {
			request.scopes.clone()
		} else {
			ScopeSet::from_target(&response.scope)
		};
		let mut access_token =
			AccessTokenEntity::new(&account, client_id, response.access_token, &scopes, now, expires_on)
				.with_scheme(request.scheme);

		if self.config.cache.claims_based_caching_enabled {
			if let Some(claims) = request.claims.as_deref().filter(|claims| !is_empty_claims(claims)) {
				access_token = access_token.with_requested_claims(claims);
			}
		}

		let id_token = response.id_token.map(|token| IdTokenEntity::new(&account, client_id, token));
		let result = AuthenticationResult {
			authority: request.authority.as_ref().unwrap_or(&self.config.authority).canonical(),
			unique_id: claims
				.as_ref()
				.and_then(|claims| claims.unique_id().map(str::to_owned))
				.unwrap_or_else(|| account.local_account_id.clone()),
			tenant_id: account.realm.clone(),
			scopes: scopes.iter().map(str::to_owned).collect(),
			account: account.to_account_info(),
			id_token: id_token.as_ref().map(|token| token.secret.clone()),
			id_token_claims: claims,
			access_token: access_token.secret.clone(),
			from_cache: false,
			expires_on,
			ext_expires_on: None,
			token_type: request.scheme,
			correlation_id: request.correlation_id.clone(),
			state: response.state.or_else(|| request.state.clone()).unwrap_or_default(),
		};
		let record = CacheRecord {
			account: Some(account),
			id_token,
			access_token: Some(access_token),
			..Default::default()
		};

		Ok(TokenSourceOutcome { result, record: Some(record) })
	}
}
impl Debug for BrokerTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerTokenSource")
			.field("channel", &self.channel)
			.field("client_id", &self.config.client_id)
			.finish()
	}
}
impl TokenSource for BrokerTokenSource {
	fn name(&self) -> &'static str {
		"broker"
	}

	fn kind(&self) -> TokenSourceKind {
		TokenSourceKind::Network
	}

	fn is_available(&self, request: &SilentFlowRequest) -> bool {
		is_broker_available(&self.config.broker, Some(&self.channel), Some(request.scheme))
	}

	fn acquire<'a>(&'a self, context: TokenSourceContext<'a>) -> TokenSourceFuture<'a> {
		Box::pin(async move {
			let value = self.channel.send_message(self.token_request(&context)).await?;

			self.build_outcome(&context, value)
		})
	}
}

// Claims from a fresh ID token take precedence over what the cache knew.
fn merge_account(
	cached: &AccountEntity,
	claims: Option<&IdTokenClaims>,
	broker_account: Option<&BrokerAccount>,
) -> AccountEntity {
	let mut account = cached.clone();

	if let Some(claims) = claims {
		if let Some(tid) = &claims.tid {
			account.realm = tid.clone();
		}
		if let Some(oid) = &claims.oid {
			account.local_account_id = oid.clone();
		}
		if let Some(username) = &claims.preferred_username {
			account.username = username.clone();
		}
		if claims.name.is_some() {
			account.name = claims.name.clone();
		}

		account.id_token_claims = Some(claims.clone());
	}
	if let Some(broker_account) = broker_account {
		if account.local_account_id.is_empty() {
			account.local_account_id = broker_account.id.clone();
		}
		if let Some(user_name) = broker_account.user_name.as_ref().filter(|_| account.username.is_empty()) {
			account.username = user_name.clone();
		}
	}

	account
}

/// Absolute expiry for a broker-reported lifetime in seconds.
///
/// Negative lifetimes and instants past the representable range are broker faults.
fn expiry_from(now: OffsetDateTime, expires_in: i64) -> Result<OffsetDateTime, BrokerError> {
	if expires_in < 0 {
		return Err(BrokerError::UnexpectedResponse {
			message: format!("expires_in is negative: {expires_in}"),
		});
	}

	now.checked_add(Duration::seconds(expires_in))
		.ok_or_else(|| BrokerError::UnexpectedResponse { message: "expires_in out of range".into() })
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	use time::macros::datetime;
	// self
	use super::*;
	use crate::{
		auth::{AccountInfo, HomeAccountId, encode_test_token},
		broker::{MessageBus, test_broker::FakeBroker},
		cache::CredentialStore,
		clock::ManualClock,
		flows::{CacheLookupPolicy, SilentFlowClient, SilentTokenClient},
		store::MemoryStorage,
	};

	const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

	fn broker_result() -> Value {
		let claims = IdTokenClaims {
			oid: Some("object-id".into()),
			tid: Some("utid".into()),
			preferred_username: Some("user@contoso.com".into()),
			..Default::default()
		};

		json!({
			"access_token": "broker-at",
			"id_token": encode_test_token(&claims),
			"expires_in": 3600,
			"scope": "User.Read",
			"account": { "id": "wam-account", "userName": "user@contoso.com" },
		})
	}

	#[tokio::test]
	async fn broker_results_hydrate_the_cache() {
		let clock = ManualClock::new(NOW);
		let config = ClientConfig::builder("client")
			.allow_broker(true)
			.build()
			.expect("Config fixture should build.");
		let store = Arc::new(CredentialStore::new(
			config.client_id.clone(),
			Arc::new(MemoryStorage::default()),
			config.cache.clone(),
			Arc::new(clock.clone()),
		));
		let bus = MessageBus::new();

		bus.add_interceptor(FakeBroker::new("fake", broker_result()));

		let channel = Arc::new(
			BrokerChannel::connect(&bus, &config.broker).await.expect("Handshake should succeed."),
		);

		assert_eq!(channel.extension_id(), Some("fake"));

		let engine = SilentFlowClient::new(config.clone(), store.clone(), Arc::new(clock.clone()));
		let client = SilentTokenClient::new(engine).with_source(Arc::new(BrokerTokenSource::new(
			channel,
			config,
			Arc::new(clock.clone()),
		)));
		let account = AccountInfo::new(
			HomeAccountId::new("uid.utid").expect("Home account fixture should be valid."),
			"login.microsoftonline.com",
			"utid",
		);
		let request = SilentFlowRequest::new(
			"User.Read".parse().expect("Scope fixture should parse."),
			Some(account),
		)
		.with_state("s1");
		let first = client
			.acquire_token_silent(&request, CacheLookupPolicy::Default)
			.await
			.expect("Broker should serve the request.");

		assert!(!first.from_cache);
		assert_eq!(first.access_token.expose(), "broker-at");
		assert_eq!(first.unique_id, "object-id");
		assert_eq!(first.state, "s1");
		assert_eq!(first.expires_on, NOW + Duration::hours(1));

		let second = client
			.acquire_token_silent(&request, CacheLookupPolicy::AccessToken)
			.await
			.expect("Hydrated cache should serve the request.");

		assert!(second.from_cache);
		assert_eq!(second.access_token.expose(), "broker-at");
		assert_eq!(second.account.username, "user@contoso.com");
	}

	#[tokio::test]
	async fn unrepresentable_lifetimes_fail_as_broker_errors() {
		let clock = ManualClock::new(NOW);
		let config = ClientConfig::builder("client")
			.allow_broker(true)
			.build()
			.expect("Config fixture should build.");
		let store = Arc::new(CredentialStore::new(
			config.client_id.clone(),
			Arc::new(MemoryStorage::default()),
			config.cache.clone(),
			Arc::new(clock.clone()),
		));
		let bus = MessageBus::new();
		let mut result = broker_result();

		result["expires_in"] = json!(i64::MAX);
		bus.add_interceptor(FakeBroker::new("fake", result));

		let channel = Arc::new(
			BrokerChannel::connect(&bus, &config.broker).await.expect("Handshake should succeed."),
		);
		let engine = SilentFlowClient::new(config.clone(), store.clone(), Arc::new(clock.clone()));
		let client = SilentTokenClient::new(engine).with_source(Arc::new(BrokerTokenSource::new(
			channel,
			config,
			Arc::new(clock.clone()),
		)));
		let request = SilentFlowRequest::new(
			"User.Read".parse().expect("Scope fixture should parse."),
			Some(AccountInfo::new(
				HomeAccountId::new("uid.utid").expect("Home account fixture should be valid."),
				"login.microsoftonline.com",
				"utid",
			)),
		);
		let err = client
			.acquire_token_silent(&request, CacheLookupPolicy::Default)
			.await
			.expect_err("Overflowing lifetimes should be rejected.");

		assert!(matches!(err, Error::Broker(BrokerError::UnexpectedResponse { .. })));
		assert!(store.get_all_accounts().is_empty(), "Rejected results should not be cached.");
	}

	#[test]
	fn expiry_rejects_negative_and_overflowing_lifetimes() {
		assert_eq!(
			expiry_from(NOW, 60).expect("Small lifetimes should fit."),
			NOW + Duration::minutes(1)
		);
		assert!(matches!(expiry_from(NOW, -1), Err(BrokerError::UnexpectedResponse { .. })));
		assert!(matches!(expiry_from(NOW, i64::MAX), Err(BrokerError::UnexpectedResponse { .. })));
	}

	#[test]
	fn broker_account_fills_gaps_only() {
		let cached = AccountEntity::from_account_info(&AccountInfo::new(
			HomeAccountId::new("uid.utid").expect("Home account fixture should be valid."),
			"login.microsoftonline.com",
			"utid",
		));
		let broker_account = BrokerAccount { id: "wam".into(), user_name: Some("u@contoso.com".into()) };
		let merged = merge_account(&cached, None, Some(&broker_account));

		assert_eq!(merged.local_account_id, "wam");
		assert_eq!(merged.username, "u@contoso.com");

		let claims = IdTokenClaims { oid: Some("oid".into()), ..Default::default() };
		let merged = merge_account(&cached, Some(&claims), Some(&broker_account));

		assert_eq!(merged.local_account_id, "oid");
		assert!(merged.id_token_claims.is_some());
	}
}
