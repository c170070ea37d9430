//! Broker discovery handshake and correlated request/response protocol.
//!
//! A [`MessageBus`] stands in for the shared page-level message surface and
//! [`MessageChannel`] for a dedicated two-port pipe. [`BrokerChannel::connect`] posts a
//! `HandshakeRequest` on the bus while handing one port to whichever broker picks it
//! up, then talks to that broker exclusively over the other port. Responses are matched
//! to callers by response id, so delivery order does not matter.

pub mod availability;
pub mod bus;
pub mod channel;
pub mod message;
pub mod source;

pub use availability::is_broker_available;
pub use bus::{BusInterceptor, BusMessage, Interception, MessageBus, MessageChannel, MessagePort};
pub use channel::BrokerChannel;
pub use message::{BrokerEnvelope, BrokerMethod, InboundBody, InboundEnvelope, ResponsePayload};
pub use source::BrokerTokenSource;

// self
use crate::_prelude::*;

/// Tag carried by every envelope of the broker protocol.
pub const CHANNEL_ID: &str = "53ee284d-920a-4b59-9d30-a60315b26836";
/// Broker endpoint tried before falling back to any installed broker.
pub const PREFERRED_EXTENSION_ID: &str = "ppnbnpeolgkicgegkbkbjmhlideopiji";

/// Broker connection and protocol failures.
#[derive(Debug, ThisError)]
pub enum BrokerError {
	/// Nobody answered the handshake in time.
	#[error("Broker handshake timed out.")]
	HandshakeTimeout,
	/// The handshake request came back unhandled.
	#[error("Broker extension is not installed.")]
	ExtensionNotInstalled {
		/// Endpoint that was addressed, if any.
		extension_id: Option<String>,
	},
	/// The broker answered with a structured error.
	#[error("Broker reported {code}: {description}.")]
	Reported {
		/// Broker error code.
		code: String,
		/// Human-readable description.
		description: String,
		/// Extra error data.
		ext: Option<Value>,
	},
	/// The broker answered with a well-formed but unusable message.
	#[error("Broker returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// Summary of what was missing.
		message: String,
	},
	/// A broker message did not match the protocol shape.
	#[error("Broker message is malformed.")]
	MalformedMessage(#[from] serde_path_to_error::Error<serde_json::Error>),
	/// The dedicated port closed before a response arrived.
	#[error("Broker channel is disconnected.")]
	Disconnected,
	/// Too many requests are awaiting a response.
	#[error("Broker channel has {limit} pending requests already.")]
	TooManyPendingRequests {
		/// Configured bound.
		limit: usize,
	},
}
impl BrokerError {
	/// Returns true for failures to establish a connection, which callers recover from by
	/// taking a non-broker path.
	pub fn is_connection_failure(&self) -> bool {
		matches!(self, Self::HandshakeTimeout | Self::ExtensionNotInstalled { .. })
	}
}

#[cfg(test)]
pub(crate) mod test_broker {
	// self
	use super::*;

	/// Broker stand-in that answers handshakes addressed to it (or to anyone) and replies
	/// to every `GetToken` with `result`.
	pub(crate) struct FakeBroker {
		id: String,
		result: Value,
	}
	impl FakeBroker {
		pub(crate) fn new(id: &str, result: Value) -> Arc<Self> {
			Arc::new(Self { id: id.into(), result })
		}
	}
	impl BusInterceptor for FakeBroker {
		fn intercept(&self, message: BusMessage) -> Interception {
			let Ok(envelope) = InboundEnvelope::parse(&message.data) else {
				return Interception::Pass(message);
			};
			let addressed = envelope.extension_id.as_deref().is_none_or(|id| id == self.id);

			if !envelope.is_tagged() || !addressed || !matches!(envelope.body, InboundBody::HandshakeRequest) {
				return Interception::Pass(message);
			}

			let Some(port) = message.port else {
				return Interception::Handled;
			};
			let id = self.id.clone();
			let result = self.result.clone();

			tokio::spawn(async move {
				port.post(
					BrokerEnvelope::new(
						Some(id.clone()),
						envelope.response_id,
						serde_json::json!({ "method": "HandshakeResponse" }),
					)
					.to_value(),
				);

				while let Some(request) = port.recv().await {
					let response_id = InboundEnvelope::recover_response_id(&request).unwrap_or_default();

					port.post(
						BrokerEnvelope::new(
							Some(id.clone()),
							response_id,
							serde_json::json!({
								"method": "Response",
								"response": { "status": "Success", "result": result },
							}),
						)
						.to_value(),
					);
				}
			});

			Interception::Handled
		}
	}
}
