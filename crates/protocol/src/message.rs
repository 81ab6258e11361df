//! Data-channel frame schema.
//!
//! Every frame is a small JSON object. Outgoing requests carry
//! `{method, data}` with the correlation id embedded as `data.request_id`;
//! inbound frames carry a `type` tag plus the echoed `requestId`. Frames
//! whose `type` the client does not know deserialize as
//! [`MessageKind::Unknown`] rather than failing, so a newer wallet never
//! breaks an older client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field inside `data` that carries the correlation id of a request.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// Tag of an inbound frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
	/// Wallet account address (response to `connectWallet`/`getAddress`).
	Address,
	/// Transaction accepted; carries the hash.
	Tx,
	/// The wallet explicitly reported a failure.
	Error,
	/// Anything this client version does not understand.
	#[default]
	#[serde(other)]
	Unknown,
}

/// A request frame sent to the wallet.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundRequest {
	pub method: String,
	pub data: Map<String, Value>,
}

impl OutboundRequest {
	/// Frames `method` + `data` with `request_id` merged into the payload.
	///
	/// Non-object payloads are wrapped under a `value` key so the id always
	/// has an object to live in; `null` becomes just the id.
	pub fn new(method: impl Into<String>, data: Value, request_id: &str) -> Self {
		let mut data = match data {
			Value::Object(map) => map,
			Value::Null => Map::new(),
			other => {
				let mut map = Map::new();
				map.insert("value".to_string(), other);
				map
			}
		};
		data.insert(
			REQUEST_ID_FIELD.to_string(),
			Value::String(request_id.to_string()),
		);
		Self {
			method: method.into(),
			data,
		}
	}
}

/// A frame received from the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
	#[serde(rename = "type", default)]
	pub kind: MessageKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub request_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hash: Option<String>,
	/// Account public key, attached to address responses by the wallet.
	#[serde(default, alias = "pub_key", skip_serializing_if = "Option::is_none")]
	pub pub_key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

impl InboundMessage {
	/// Error text of an `error` frame, with a fallback for sloppy wallets.
	pub fn error_text(&self) -> String {
		self.message
			.clone()
			.unwrap_or_else(|| "unspecified wallet error".to_string())
	}
}
