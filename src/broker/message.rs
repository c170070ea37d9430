//! Wire envelopes of the broker protocol.

// self
use crate::{_prelude::*, broker::{BrokerError, CHANNEL_ID}};

/// Broker status that marks a successful response.
pub const STATUS_SUCCESS: &str = "Success";

/// Methods understood by the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerMethod {
	/// Discovery request posted on the shared bus.
	HandshakeRequest,
	/// Broker acknowledgment sent on the dedicated port.
	HandshakeResponse,
	/// Token request.
	GetToken,
	/// Answer to a steady-state request.
	Response,
}
impl BrokerMethod {
	/// Wire name of the method.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::HandshakeRequest => "HandshakeRequest",
			Self::HandshakeResponse => "HandshakeResponse",
			Self::GetToken => "GetToken",
			Self::Response => "Response",
		}
	}
}

/// Outbound envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerEnvelope {
	/// Protocol tag.
	pub channel: String,
	/// Target endpoint; absent to address any broker.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub extension_id: Option<String>,
	/// Correlation id echoed by the broker.
	pub response_id: u64,
	/// Method-tagged payload.
	pub body: Value,
}
impl BrokerEnvelope {
	/// Creates an envelope tagged with [`CHANNEL_ID`].
	pub fn new(extension_id: Option<String>, response_id: u64, body: Value) -> Self {
		Self { channel: CHANNEL_ID.into(), extension_id, response_id, body }
	}

	/// Creates a handshake request.
	pub fn handshake_request(extension_id: Option<String>, response_id: u64) -> Self {
		Self::new(
			extension_id,
			response_id,
			serde_json::json!({ "method": BrokerMethod::HandshakeRequest.as_str() }),
		)
	}

	/// JSON form posted on the wire.
	pub fn to_value(&self) -> Value {
		let mut value = serde_json::json!({
			"channel": self.channel,
			"responseId": self.response_id,
			"body": self.body,
		});

		if let (Some(id), Some(object)) = (&self.extension_id, value.as_object_mut()) {
			object.insert("extensionId".into(), Value::String(id.clone()));
		}

		value
	}
}

/// Inbound envelope as read from the bus or the dedicated port.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
	/// Protocol tag.
	#[serde(default)]
	pub channel: Option<String>,
	/// Endpoint the message came from or was addressed to.
	#[serde(default)]
	pub extension_id: Option<String>,
	/// Correlation id.
	pub response_id: u64,
	/// Method-tagged payload.
	pub body: InboundBody,
}
impl InboundEnvelope {
	/// Validates `value` against the envelope shape.
	pub fn parse(value: &Value) -> Result<Self, BrokerError> {
		Ok(serde_path_to_error::deserialize(value.clone())?)
	}

	/// Best-effort response id of a message that failed [`InboundEnvelope::parse`].
	pub fn recover_response_id(value: &Value) -> Option<u64> {
		value.get("responseId").and_then(Value::as_u64)
	}

	/// Returns true if the envelope carries the protocol tag.
	pub fn is_tagged(&self) -> bool {
		self.channel.as_deref() == Some(CHANNEL_ID)
	}
}

/// Method-tagged body; unknown methods are kept as [`InboundBody::Unknown`] and ignored.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "method")]
pub enum InboundBody {
	/// Discovery request.
	HandshakeRequest,
	/// Broker acknowledgment.
	HandshakeResponse,
	/// Answer to a steady-state request.
	Response {
		/// Status and result.
		response: ResponsePayload,
	},
	/// Any other method.
	#[serde(other)]
	Unknown,
}

/// Status and result of a [`InboundBody::Response`].
#[derive(Clone, Debug, Deserialize)]
pub struct ResponsePayload {
	/// `Success` or a failure status.
	pub status: String,
	/// Error code on failure.
	#[serde(default)]
	pub code: Option<String>,
	/// Error description on failure.
	#[serde(default)]
	pub description: Option<String>,
	/// Extra error data on failure.
	#[serde(default)]
	pub ext: Option<Value>,
	/// Result on success.
	#[serde(default)]
	pub result: Option<Value>,
}
impl ResponsePayload {
	/// Resolves the payload into the result or the error it encodes.
	///
	/// A successful status whose result embeds both `code` and `description` is still a
	/// failure.
	pub fn into_outcome(self) -> Result<Value, BrokerError> {
		if self.status != STATUS_SUCCESS {
			return Err(BrokerError::Reported {
				code: self.code.unwrap_or_default(),
				description: self.description.unwrap_or_default(),
				ext: self.ext,
			});
		}

		let Some(result) = self.result else {
			return Err(BrokerError::UnexpectedResponse {
				message: "response does not contain a result".into(),
			});
		};

		match (result.get("code").and_then(Value::as_str), result.get("description").and_then(Value::as_str)) {
			(Some(code), Some(description)) if !code.is_empty() && !description.is_empty() =>
				Err(BrokerError::Reported {
					code: code.to_owned(),
					description: description.to_owned(),
					ext: result.get("ext").cloned(),
				}),
			_ => Ok(result),
		}
	}
}
