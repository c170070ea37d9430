//! Fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde_json::{Value, json};
use time::{OffsetDateTime, macros::datetime};
// self
use oidc_token_cache::{
	auth::{AccountInfo, HomeAccountId, IdTokenClaims},
	broker::{BrokerEnvelope, BusInterceptor, BusMessage, InboundBody, InboundEnvelope, Interception, MessagePort},
	cache::{AccountEntity, CredentialStore},
	clock::{Clock, ManualClock},
	config::ClientConfig,
	store::CacheStorage,
};

pub const CLIENT_ID: &str = "client";
pub const ENVIRONMENT: &str = "login.microsoftonline.com";
pub const TENANT: &str = "utid";
pub const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

pub fn clock() -> ManualClock {
	ManualClock::new(NOW)
}

pub fn config() -> ClientConfig {
	ClientConfig::builder(CLIENT_ID).build().expect("Config fixture should build.")
}

pub fn account_info(uid: &str) -> AccountInfo {
	AccountInfo::new(
		HomeAccountId::new(format!("{uid}.{TENANT}")).expect("Home account fixture should be valid."),
		ENVIRONMENT,
		TENANT,
	)
	.with_local_account_id(uid)
	.with_username(format!("{uid}@contoso.com"))
}

pub fn account_entity(uid: &str) -> AccountEntity {
	AccountEntity::from_account_info(&account_info(uid))
}

pub fn credential_store(
	config: &ClientConfig,
	storage: Arc<dyn CacheStorage>,
	clock: Arc<dyn Clock>,
) -> CredentialStore {
	CredentialStore::new(config.client_id.clone(), storage, config.cache.clone(), clock)
}

/// Unsigned compact JWT carrying `claims`.
pub fn id_token(claims: &IdTokenClaims) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let payload =
		URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("Claims fixture should serialize."));

	format!("{header}.{payload}.signature")
}

/// Polls `check` up to `attempts` times, `interval_ms` apart.
pub async fn eventually(attempts: usize, interval_ms: u64, check: impl Fn() -> bool) -> bool {
	for _ in 0..attempts {
		if check() {
			return true;
		}

		tokio::time::sleep(std::time::Duration::from_millis(interval_ms)).await;
	}

	check()
}

type Responder = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Scriptable broker intercepting handshakes on a message bus.
pub struct TestBroker {
	id: String,
	answers_handshake: bool,
	batch: usize,
	respond: Responder,
	received: Arc<Mutex<Vec<Value>>>,
	captured: Arc<Mutex<Vec<MessagePort>>>,
}
impl TestBroker {
	/// Broker answering every request with a successful `result`.
	pub fn succeeding(id: &str, result: Value) -> Self {
		Self::new(id, Arc::new(move |_| json!({ "status": "Success", "result": result.clone() })))
	}

	/// Broker answering each request through `respond`, which returns the `response` object.
	pub fn new(id: &str, respond: Responder) -> Self {
		Self {
			id: id.into(),
			answers_handshake: true,
			batch: 1,
			respond,
			received: Default::default(),
			captured: Default::default(),
		}
	}

	/// Broker that swallows handshakes without answering and keeps the transferred ports.
	pub fn mute(id: &str) -> Self {
		Self { answers_handshake: false, ..Self::succeeding(id, Value::Null) }
	}

	/// Collects `batch` requests before answering them in reverse order.
	pub fn reversed(mut self, batch: usize) -> Self {
		self.batch = batch;

		self
	}

	pub fn received(&self) -> Arc<Mutex<Vec<Value>>> {
		self.received.clone()
	}

	pub fn captured(&self) -> Arc<Mutex<Vec<MessagePort>>> {
		self.captured.clone()
	}
}
impl BusInterceptor for TestBroker {
	fn intercept(&self, message: BusMessage) -> Interception {
		let Ok(envelope) = InboundEnvelope::parse(&message.data) else {
			return Interception::Pass(message);
		};
		let addressed = envelope.extension_id.as_deref().is_none_or(|id| id == self.id);

		if !envelope.is_tagged()
			|| !addressed
			|| !matches!(envelope.body, InboundBody::HandshakeRequest)
		{
			return Interception::Pass(message);
		}

		let Some(port) = message.port else {
			return Interception::Handled;
		};

		if !self.answers_handshake {
			self.captured.lock().push(port);

			return Interception::Handled;
		}

		let id = self.id.clone();
		let batch = self.batch;
		let respond = self.respond.clone();
		let received = self.received.clone();
		let handshake_id = envelope.response_id;

		tokio::spawn(async move {
			port.post(
				BrokerEnvelope::new(Some(id.clone()), handshake_id, json!({ "method": "HandshakeResponse" }))
					.to_value(),
			);

			let mut buffered = Vec::new();

			while let Some(request) = port.recv().await {
				received.lock().push(request.clone());
				buffered.push(request);

				if buffered.len() < batch {
					continue;
				}

				for request in buffered.drain(..).rev() {
					let response_id = request["responseId"].as_u64().unwrap_or_default();
					let response = respond(&request["body"]);

					port.post(
						BrokerEnvelope::new(
							Some(id.clone()),
							response_id,
							json!({ "method": "Response", "response": response }),
						)
						.to_value(),
					);
				}
			}
		});

		Interception::Handled
	}
}
