//! Out-of-band handshake through the Telegram deep link.
//!
//! The wallet cannot be dialed until the user has opened it, so the very
//! first request travels as a bot deep link: the method and payload are
//! base64-encoded into the `startapp` parameter and the link is handed to a
//! [`UrlOpener`]. Everything after that flows over the data channel.

use serde_json::Value;

use jetpack_protocol::deep_link;
use jetpack_runtime::{Error, Result};

/// Capability to open an external URL.
///
/// Environments without one (headless hosts, sandboxed embedders) must fail
/// loudly; a swallowed failure here means the wallet never learns of the
/// request.
pub trait UrlOpener: Send + Sync {
	fn open_url(&self, url: &str) -> Result<()>;
}

/// Opens links through the platform handler (`xdg-open`, `open`,
/// `cmd /C start`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl UrlOpener for SystemOpener {
	fn open_url(&self, url: &str) -> Result<()> {
		let (program, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
			("open", &[])
		} else if cfg!(windows) {
			("cmd", &["/C", "start", ""])
		} else {
			("xdg-open", &[])
		};

		std::process::Command::new(program)
			.args(args)
			.arg(url)
			.stdout(std::process::Stdio::null())
			.stderr(std::process::Stdio::null())
			.spawn()
			.map(drop)
			.map_err(|err| {
				Error::UnsupportedEnvironment(format!("cannot launch {program}: {err}"))
			})
	}
}

/// Builds the deep link for `method` + `data` and opens it.
///
/// # Errors
///
/// Propagates [`Error::UnsupportedEnvironment`] from the opener.
pub fn initiate(opener: &dyn UrlOpener, method: &str, data: &Value) -> Result<()> {
	let url = deep_link::deep_link(method, data);
	tracing::debug!(method, "opening handshake deep link");
	opener.open_url(&url)
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use parking_lot::Mutex;
	use serde_json::json;

	use super::*;

	#[derive(Clone, Default)]
	struct RecordingOpener {
		opened: Arc<Mutex<Vec<String>>>,
	}

	impl UrlOpener for RecordingOpener {
		fn open_url(&self, url: &str) -> Result<()> {
			self.opened.lock().push(url.to_string());
			Ok(())
		}
	}

	#[test]
	fn initiate_opens_the_wallet_deep_link() {
		let opener = RecordingOpener::default();
		let data = json!({ "peer_id": "u1-abcd", "chain_id": "cosmoshub", "request_id": "r1" });

		initiate(&opener, "connectWallet", &data).unwrap();

		let opened = opener.opened.lock();
		assert_eq!(opened.len(), 1);
		let url = &opened[0];
		assert!(url.starts_with("https://t.me/cosmos_wallet_bot/dev_JetWallet?startapp="));

		let param = url.split_once("startapp=").unwrap().1;
		let decoded = deep_link::decode_start_param(param).unwrap();
		assert_eq!(decoded.method, "connectWallet");
		assert_eq!(decoded.data, data);
	}

	#[test]
	fn opener_failure_propagates() {
		struct NoOpener;
		impl UrlOpener for NoOpener {
			fn open_url(&self, _url: &str) -> Result<()> {
				Err(Error::UnsupportedEnvironment("no browser here".to_string()))
			}
		}

		let result = initiate(&NoOpener, "getAddress", &json!(null));
		assert!(matches!(result, Err(Error::UnsupportedEnvironment(_))));
	}
}
