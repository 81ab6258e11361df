//! Peer transport contract.
//!
//! The point-to-point data channel that carries wallet traffic is provided
//! by the embedding application; its internals (framing, NAT traversal,
//! encryption) are none of our business. The runtime drives it through
//! [`PeerTransport`]: dial a remote peer by name, then exchange JSON frames
//! over the returned [`PeerLink`] until it reports closed.

pub mod memory;


use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Something the transport reported on an open link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
	/// A data frame from the remote peer.
	Message(Value),
	/// The remote peer closed the link (or went away cleanly).
	Closed,
	/// The link failed; no more frames will arrive.
	Error(String),
}

/// One open data channel to the remote peer.
///
/// Dropping the sink closes the link from our side.
pub struct PeerLink {
	/// Outgoing frames.
	pub sink: mpsc::Sender<Value>,
	/// Incoming frames and lifecycle notifications.
	pub events: mpsc::Receiver<LinkEvent>,
}

/// External point-to-point transport capability.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
	/// Attempts to reach `remote_peer_id`, announcing ourselves as
	/// `local_peer_id`.
	///
	/// Fails with [`Error::Transport`] while the peer is not yet listening;
	/// each call is an independent attempt, so callers are expected to poll.
	///
	/// [`Error::Transport`]: crate::error::Error::Transport
	async fn dial(&self, local_peer_id: &str, remote_peer_id: &str) -> Result<PeerLink>;
}
