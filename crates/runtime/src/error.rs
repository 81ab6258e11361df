use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// No way to reach the wallet from this environment, e.g. nothing can
	/// open the handshake deep link.
	#[error("unsupported environment: {0}")]
	UnsupportedEnvironment(String),

	/// A call was made with no live connection and no handshake in flight.
	#[error("not connected to the wallet")]
	NotConnected,

	/// The peer/data-channel layer failed.
	#[error("transport error: {0}")]
	Transport(String),

	/// The wallet explicitly reported an error payload.
	#[error("wallet error: {message}")]
	Remote { message: String },

	/// Inbound data did not match the wire schema.
	#[error("malformed message: {0}")]
	MalformedMessage(String),

	/// The polling connection loop exhausted its attempt budget.
	#[error("wallet unreachable after {attempts} connection attempts")]
	ConnectionTimeout { attempts: u32 },

	/// The link dropped while requests were still in flight.
	#[error("connection lost")]
	ConnectionLost,

	/// No response arrived for a pending request within its lifetime bound.
	#[error("no response within {0:?}")]
	ResponseTimeout(Duration),

	#[error("channel closed")]
	ChannelClosed,

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn is_not_connected(&self) -> bool {
		matches!(self, Error::NotConnected)
	}

	pub fn is_timeout(&self) -> bool {
		matches!(
			self,
			Error::ConnectionTimeout { .. } | Error::ResponseTimeout(_)
		)
	}
}
