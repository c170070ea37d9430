//! Handshake and correlated messaging over a dedicated port.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::{
	sync::{broadcast, mpsc, oneshot},
	task::JoinHandle,
};
// self
use crate::{
	_prelude::*,
	broker::{
		BrokerError, BrokerEnvelope, InboundBody, InboundEnvelope, MessageBus, MessageChannel,
		MessagePort,
	},
	config::BrokerOptions,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

type PendingMap = HashMap<u64, oneshot::Sender<Result<Value, BrokerError>>>;

/// Connected broker channel.
///
/// Every [`BrokerChannel::send_message`] call gets its own response id and completes when
/// the broker answers that id, independent of other in-flight calls. Dropping the channel
/// closes the port and fails whatever is still pending with
/// [`BrokerError::Disconnected`].
pub struct BrokerChannel {
	extension_id: Option<String>,
	port: Arc<MessagePort>,
	shared: Arc<Shared>,
	faults: AsyncMutex<mpsc::UnboundedReceiver<BrokerError>>,
	dispatch: JoinHandle<()>,
	max_pending: usize,
}
impl BrokerChannel {
	/// Connects to the preferred broker, falling back once to any installed broker.
	pub async fn connect(bus: &MessageBus, options: &BrokerOptions) -> Result<Self, BrokerError> {
		let mut candidates = Vec::with_capacity(2);

		if let Some(preferred) = &options.preferred_extension_id {
			candidates.push(Some(preferred.clone()));
		}

		candidates.push(None);

		let mut last_error = BrokerError::HandshakeTimeout;

		for candidate in candidates {
			match Self::handshake(bus, candidate.clone(), options).await {
				Ok(channel) => return Ok(channel),
				Err(e) => {
					obs::debug_event(
						FlowKind::BrokerHandshake,
						"connect",
						&format!("Handshake with {} failed: {e}", candidate.as_deref().unwrap_or("any broker")),
					);

					last_error = e;
				},
			}
		}

		Err(last_error)
	}

	/// Runs one handshake addressed to `extension_id`, or to any broker when `None`.
	pub async fn handshake(
		bus: &MessageBus,
		extension_id: Option<String>,
		options: &BrokerOptions,
	) -> Result<Self, BrokerError> {
		const KIND: FlowKind = FlowKind::BrokerHandshake;

		let span = FlowSpan::new(KIND, "handshake");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(Self::handshake_inner(bus, extension_id, options)).await;

		match &result {
			Ok(channel) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
				obs::debug_event(
					KIND,
					"handshake",
					&format!(
						"Connected to broker {}.",
						channel.extension_id.as_deref().unwrap_or("without an id")
					),
				);
			},
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn handshake_inner(
		bus: &MessageBus,
		extension_id: Option<String>,
		options: &BrokerOptions,
	) -> Result<Self, BrokerError> {
		let MessageChannel { port1, port2 } = MessageChannel::new();
		let shared = Arc::new(Shared::default());
		let response_id = shared.next_response_id();
		let mut attempt =
			HandshakeAttempt { port: Arc::new(port1), listener: bus.subscribe(), connected: false };

		bus.post(
			BrokerEnvelope::handshake_request(extension_id.clone(), response_id).to_value(),
			Some(port2),
		);

		let timeout = tokio::time::sleep(options.handshake_timeout());

		tokio::pin!(timeout);

		let responder = loop {
			tokio::select! {
				message = attempt.port.recv() => {
					let Some(message) = message else {
						return Err(BrokerError::Disconnected);
					};

					match InboundEnvelope::parse(&message) {
						Ok(InboundEnvelope { body: InboundBody::HandshakeResponse, extension_id: responder, .. }) =>
							break responder,
						Ok(_) => {},
						Err(e) if InboundEnvelope::recover_response_id(&message) == Some(response_id) =>
							return Err(e),
						Err(e) => obs::absorbed_fault(
							FlowKind::BrokerHandshake,
							"handshake",
							&format!("Ignoring malformed message during handshake: {e}"),
						),
					}
				},
				echoed = attempt.listener.recv() => match echoed {
					Ok(echoed) if is_own_handshake(&echoed, extension_id.as_deref()) =>
						return Err(BrokerError::ExtensionNotInstalled { extension_id }),
					Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {},
					Err(broadcast::error::RecvError::Closed) => return Err(BrokerError::Disconnected),
				},
				_ = &mut timeout => return Err(BrokerError::HandshakeTimeout),
			}
		};

		attempt.connected = true;

		let port = attempt.port.clone();
		let (fault_tx, fault_rx) = mpsc::unbounded_channel();
		let dispatch = tokio::spawn(dispatch_loop(port.clone(), shared.clone(), fault_tx));

		Ok(Self {
			extension_id: responder.or(extension_id),
			port,
			shared,
			faults: AsyncMutex::new(fault_rx),
			dispatch,
			max_pending: options.max_pending_requests,
		})
	}

	/// Identifier of the broker that answered the handshake.
	pub fn extension_id(&self) -> Option<&str> {
		self.extension_id.as_deref()
	}

	/// Number of requests awaiting a response.
	pub fn pending_requests(&self) -> usize {
		self.shared.pending.lock().len()
	}

	/// Returns true once the port was closed by either side.
	pub fn is_closed(&self) -> bool {
		self.port.is_closed()
	}

	/// Sends `body` and waits for the correlated response.
	///
	/// Fails with the broker-reported error when the response carries one, and with
	/// [`BrokerError::TooManyPendingRequests`] when the pending bound is reached even
	/// after sweeping requests whose callers went away.
	pub async fn send_message(&self, body: Value) -> Result<Value, BrokerError> {
		const KIND: FlowKind = FlowKind::BrokerRequest;

		let span = FlowSpan::new(KIND, "send_message");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_inner(body)).await;

		obs::record_flow_outcome(KIND, FlowOutcome::of(&result));
		obs::record_pending_requests(self.pending_requests());

		result
	}

	async fn send_inner(&self, body: Value) -> Result<Value, BrokerError> {
		if self.port.is_closed() {
			return Err(BrokerError::Disconnected);
		}

		let (tx, rx) = oneshot::channel();
		let response_id = self.shared.next_response_id();

		{
			let mut pending = self.shared.pending.lock();

			if pending.len() >= self.max_pending {
				pending.retain(|_, waiter| !waiter.is_closed());
			}
			if pending.len() >= self.max_pending {
				return Err(BrokerError::TooManyPendingRequests { limit: self.max_pending });
			}

			pending.insert(response_id, tx);
			obs::record_pending_requests(pending.len());
		}

		self.port.post(BrokerEnvelope::new(self.extension_id.clone(), response_id, body).to_value());

		match rx.await {
			Ok(outcome) => outcome,
			Err(_) => Err(BrokerError::Disconnected),
		}
	}

	/// Waits for the next dispatch failure that could not be tied to a request.
	///
	/// Returns `None` once the channel is closed and every fault was drained.
	pub async fn next_fault(&self) -> Option<BrokerError> {
		self.faults.lock().await.recv().await
	}

	/// Closes the port; pending requests fail with [`BrokerError::Disconnected`].
	pub fn close(&self) {
		self.port.close();
	}
}
impl Drop for BrokerChannel {
	fn drop(&mut self) {
		self.port.close();
		self.dispatch.abort();
		self.shared.fail_pending();
	}
}
impl Debug for BrokerChannel {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BrokerChannel")
			.field("extension_id", &self.extension_id)
			.field("closed", &self.port.is_closed())
			.field("pending", &self.pending_requests())
			.field("max_pending", &self.max_pending)
			.finish()
	}
}

#[derive(Default)]
struct Shared {
	pending: Mutex<PendingMap>,
	next_response_id: AtomicU64,
}
impl Shared {
	fn next_response_id(&self) -> u64 {
		self.next_response_id.fetch_add(1, Ordering::Relaxed)
	}

	fn resolve(&self, response_id: u64, outcome: Result<Value, BrokerError>) {
		let waiter = self.pending.lock().remove(&response_id);

		match waiter {
			// The caller may have dropped its future.
			Some(waiter) => {
				let _ = waiter.send(outcome);
			},
			None => obs::debug_event(
				FlowKind::BrokerRequest,
				"dispatch",
				&format!("Dropping response {response_id} without a pending request."),
			),
		}
	}

	fn fail_pending(&self) {
		let drained = std::mem::take(&mut *self.pending.lock());

		for (_, waiter) in drained {
			let _ = waiter.send(Err(BrokerError::Disconnected));
		}
	}

	/// Routes one inbound message; returns a fault when no request can own the failure.
	fn dispatch(&self, message: Value) -> Option<BrokerError> {
		match InboundEnvelope::parse(&message) {
			Ok(InboundEnvelope { response_id, body: InboundBody::Response { response }, .. }) =>
				self.resolve(response_id, response.into_outcome()),
			Ok(_) => {},
			Err(e) => match InboundEnvelope::recover_response_id(&message) {
				Some(response_id) if self.pending.lock().contains_key(&response_id) =>
					self.resolve(response_id, Err(e)),
				_ => return Some(e),
			},
		}

		None
	}
}

// Closes the ports and removes the bus listener unless the handshake connected.
struct HandshakeAttempt {
	port: Arc<MessagePort>,
	listener: broadcast::Receiver<Value>,
	connected: bool,
}
impl Drop for HandshakeAttempt {
	fn drop(&mut self) {
		if !self.connected {
			self.port.close();
		}
	}
}

fn is_own_handshake(message: &Value, extension_id: Option<&str>) -> bool {
	let Ok(envelope) = InboundEnvelope::parse(message) else {
		return false;
	};

	if !envelope.is_tagged() {
		return false;
	}
	if let Some(target) = envelope.extension_id.as_deref() {
		if Some(target) != extension_id {
			return false;
		}
	}

	matches!(envelope.body, InboundBody::HandshakeRequest)
}

async fn dispatch_loop(
	port: Arc<MessagePort>,
	shared: Arc<Shared>,
	faults: mpsc::UnboundedSender<BrokerError>,
) {
	while let Some(message) = port.recv().await {
		if let Some(fault) = shared.dispatch(message) {
			obs::absorbed_fault(
				FlowKind::BrokerRequest,
				"dispatch",
				&format!("Unroutable broker message: {fault}"),
			);

			let _ = faults.send(fault);
		}
	}

	shared.fail_pending();
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::broker::CHANNEL_ID;

	fn response(response_id: u64, response: Value) -> Value {
		json!({
			"channel": CHANNEL_ID,
			"responseId": response_id,
			"body": { "method": "Response", "response": response },
		})
	}

	fn register(shared: &Shared) -> (u64, oneshot::Receiver<Result<Value, BrokerError>>) {
		let (tx, rx) = oneshot::channel();
		let id = shared.next_response_id();

		shared.pending.lock().insert(id, tx);

		(id, rx)
	}

	#[tokio::test]
	async fn dispatch_resolves_by_id_in_any_order() {
		let shared = Shared::default();
		let (first, first_rx) = register(&shared);
		let (second, second_rx) = register(&shared);

		assert!(
			shared
				.dispatch(response(second, json!({ "status": "Success", "result": { "n": 2 } })))
				.is_none()
		);
		assert!(
			shared
				.dispatch(response(first, json!({ "status": "Success", "result": { "n": 1 } })))
				.is_none()
		);

		let first = first_rx.await.expect("First waiter should be resolved.");
		let second = second_rx.await.expect("Second waiter should be resolved.");

		assert_eq!(first.expect("First request should succeed.")["n"], 1);
		assert_eq!(second.expect("Second request should succeed.")["n"], 2);
		assert!(shared.pending.lock().is_empty());
	}

	#[tokio::test]
	async fn malformed_messages_reject_their_request_or_fault() {
		let shared = Shared::default();
		let (id, rx) = register(&shared);

		assert!(shared.dispatch(json!({ "responseId": id, "body": { "method": "Response" } })).is_none());
		assert!(matches!(
			rx.await.expect("Waiter should be resolved."),
			Err(BrokerError::MalformedMessage(_))
		));

		let fault = shared.dispatch(json!({ "body": "garbage" }));

		assert!(matches!(fault, Some(BrokerError::MalformedMessage(_))));
	}

	#[tokio::test]
	async fn other_methods_are_ignored() {
		let shared = Shared::default();
		let (id, mut rx) = register(&shared);

		assert!(
			shared
				.dispatch(json!({ "channel": CHANNEL_ID, "responseId": id, "body": { "method": "Ping" } }))
				.is_none()
		);
		assert!(rx.try_recv().is_err());

		shared.fail_pending();

		assert!(matches!(rx.await.expect("Waiter should be resolved."), Err(BrokerError::Disconnected)));
	}

	#[test]
	fn own_handshake_detection_honors_target() {
		let anonymous = BrokerEnvelope::handshake_request(None, 0).to_value();
		let addressed = BrokerEnvelope::handshake_request(Some("a".into()), 0).to_value();

		assert!(is_own_handshake(&anonymous, None));
		assert!(is_own_handshake(&anonymous, Some("a")));
		assert!(is_own_handshake(&addressed, Some("a")));
		assert!(!is_own_handshake(&addressed, Some("b")));
		assert!(!is_own_handshake(&json!({ "channel": "other", "responseId": 0, "body": { "method": "HandshakeRequest" } }), None));
	}
}
