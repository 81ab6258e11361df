//! Client identity resolution.
//!
//! Runs once at initialization. The embedding host (a Telegram mini app)
//! may hand us its init data, a URL-encoded query string whose `user` field
//! is JSON carrying the user id; that id addresses the wallet peer. The
//! resolver must never block initialization, so every decode failure falls
//! back to an anonymous identity instead of erroring.

use jetpack_protocol::deep_link;
use jetpack_runtime::token;

/// Suffix length for the local peer id; keeps concurrent sessions of the
/// same user from colliding on the transport.
const SUFFIX_LEN: usize = 8;

/// The pair of identifiers used to address and be addressed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
	/// Name this client announces itself under on the peer transport.
	pub local_peer_id: String,
	/// User id extracted from the host context, when one was supplied.
	pub remote_user_id: Option<String>,
}

impl ClientIdentity {
	/// Resolves the identity from an optional host init-data string.
	pub fn resolve(host_context: Option<&str>) -> Self {
		let remote_user_id = host_context.and_then(parse_user_id);
		let local_peer_id =
			deep_link::local_peer_id(remote_user_id.as_deref(), &token::base36(SUFFIX_LEN));
		Self {
			local_peer_id,
			remote_user_id,
		}
	}

	/// Peer-transport name the wallet listens under for this user.
	pub fn remote_peer_id(&self) -> String {
		deep_link::remote_peer_id(self.remote_user_id.as_deref())
	}
}

fn parse_user_id(init_data: &str) -> Option<String> {
	let user = url::form_urlencoded::parse(init_data.as_bytes())
		.find(|(key, _)| key == "user")
		.map(|(_, value)| value.into_owned())?;

	let user: serde_json::Value = match serde_json::from_str(&user) {
		Ok(value) => value,
		Err(err) => {
			tracing::debug!(%err, "host context user field is not JSON, staying anonymous");
			return None;
		}
	};

	match &user["id"] {
		serde_json::Value::String(id) => Some(id.clone()),
		serde_json::Value::Number(id) => Some(id.to_string()),
		_ => {
			tracing::debug!("host context user has no usable id, staying anonymous");
			None
		}
	}
}
