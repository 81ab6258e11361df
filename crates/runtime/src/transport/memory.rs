//! In-process transport for tests and examples.
//!
//! A [`MemoryTransport`] is a shared registry of listening peers. The wallet
//! side calls [`listen`](MemoryTransport::listen) and receives one
//! [`WalletSession`] per accepted dial; the client side dials through the
//! [`PeerTransport`] impl. Links are a pair of pumped channels, so dropping
//! either sink surfaces as [`LinkEvent::Closed`] on the other side - the
//! same shape a real data channel gives us.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{LinkEvent, PeerLink, PeerTransport};
use crate::error::{Error, Result};

const LINK_BUFFER: usize = 64;

/// Registry of reachable in-process peers. Clones share the registry.
#[derive(Clone, Default)]
pub struct MemoryTransport {
	peers: Arc<DashMap<String, mpsc::Sender<WalletSession>>>,
}

/// Accepted side of a dialed link.
pub struct WalletSession {
	/// Peer id the dialer announced.
	pub remote_peer_id: String,
	pub link: PeerLink,
}

impl MemoryTransport {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes `peer_id` reachable and returns the stream of accepted
	/// sessions. Listening again under the same id replaces the previous
	/// listener.
	pub fn listen(&self, peer_id: &str) -> mpsc::Receiver<WalletSession> {
		let (tx, rx) = mpsc::channel(4);
		self.peers.insert(peer_id.to_string(), tx);
		rx
	}

	/// Withdraws a peer; subsequent dials fail until it listens again.
	pub fn drop_peer(&self, peer_id: &str) {
		self.peers.remove(peer_id);
	}
}

#[async_trait]
impl PeerTransport for MemoryTransport {
	async fn dial(&self, local_peer_id: &str, remote_peer_id: &str) -> Result<PeerLink> {
		let accept_tx = self
			.peers
			.get(remote_peer_id)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| Error::Transport(format!("peer {remote_peer_id} is not reachable")))?;

		let (dialer, listener) = link_pair();
		accept_tx
			.send(WalletSession {
				remote_peer_id: local_peer_id.to_string(),
				link: listener,
			})
			.await
			.map_err(|_| Error::Transport(format!("peer {remote_peer_id} stopped listening")))?;

		Ok(dialer)
	}
}

/// Two [`PeerLink`] halves joined by pump tasks.
///
/// Must run inside a tokio runtime. When one side's sink is dropped the
/// other side receives [`LinkEvent::Closed`] after any buffered frames.
pub fn link_pair() -> (PeerLink, PeerLink) {
	let (a_sink, a_outgoing) = mpsc::channel(LINK_BUFFER);
	let (b_sink, b_outgoing) = mpsc::channel(LINK_BUFFER);
	let (a_events_tx, a_events) = mpsc::channel(LINK_BUFFER);
	let (b_events_tx, b_events) = mpsc::channel(LINK_BUFFER);

	tokio::spawn(pump(a_outgoing, b_events_tx));
	tokio::spawn(pump(b_outgoing, a_events_tx));

	(
		PeerLink {
			sink: a_sink,
			events: a_events,
		},
		PeerLink {
			sink: b_sink,
			events: b_events,
		},
	)
}

async fn pump(mut outgoing: mpsc::Receiver<Value>, events: mpsc::Sender<LinkEvent>) {
	while let Some(frame) = outgoing.recv().await {
		if events.send(LinkEvent::Message(frame)).await.is_err() {
			return;
		}
	}
	let _ = events.send(LinkEvent::Closed).await;
}
