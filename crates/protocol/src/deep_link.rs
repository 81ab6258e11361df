//! Telegram deep-link construction and peer addressing.
//!
//! The wallet runs as a Telegram mini app, so the only way to hand it the
//! very first request is a bot deep link of the form
//! `https://t.me/<bot>/<app>?startapp=<base64(JSON{method,data})>`.
//! Once both sides are up they meet on the peer transport under names built
//! by [`remote_peer_id`] and [`local_peer_id`]; the naming scheme must match
//! the wallet side byte for byte.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Host serving bot deep links.
pub const BOT_HOST: &str = "https://t.me";

/// Username of the wallet bot.
pub const BOT_USERNAME: &str = "cosmos_wallet_bot";

/// Mini-app name registered under the bot.
pub const APP_NAME: &str = "dev_JetWallet";

/// Namespace prefix for peer addresses, shared with the wallet side.
pub const PEER_NAMESPACE: &str = "jetpack";

/// Placeholder user segment when the embedding host supplied no user id.
pub const UNKNOWN_USER: &str = "unknown-user";

/// Decoded form of the `startapp` parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartParam {
	pub method: String,
	pub data: Value,
}

/// Encodes `{method, data}` as the base64 `startapp` value.
pub fn start_param(method: &str, data: &Value) -> String {
	let envelope = json!({ "method": method, "data": data });
	STANDARD.encode(envelope.to_string())
}

/// Decodes a `startapp` value produced by [`start_param`].
///
/// Returns `None` when the parameter is not base64 or not the expected JSON
/// envelope. Used by the wallet side and by tests; the client only encodes.
pub fn decode_start_param(param: &str) -> Option<StartParam> {
	let bytes = STANDARD.decode(param).ok()?;
	serde_json::from_slice(&bytes).ok()
}

/// Full deep-link URI carrying `method` and `data` to the wallet.
pub fn deep_link(method: &str, data: &Value) -> String {
	format!(
		"{BOT_HOST}/{BOT_USERNAME}/{APP_NAME}?startapp={}",
		start_param(method, data)
	)
}

/// Peer-transport name the wallet listens under for a given user.
pub fn remote_peer_id(remote_user_id: Option<&str>) -> String {
	format!(
		"{PEER_NAMESPACE}-{BOT_USERNAME}-{}",
		remote_user_id.unwrap_or(UNKNOWN_USER)
	)
}

/// Peer-transport name this client announces itself under.
///
/// `suffix` keeps concurrent sessions of the same user apart.
pub fn local_peer_id(remote_user_id: Option<&str>, suffix: &str) -> String {
	format!("{}-{suffix}", remote_user_id.unwrap_or(UNKNOWN_USER))
}
