//! Wallet connection: lifecycle management and request multiplexing.
//!
//! [`Connection`] owns the single active [`PeerLink`] to the wallet. It
//! establishes the link by polling [`PeerTransport::dial`] until the wallet
//! side comes up (the wallet only starts listening once the user follows the
//! handshake deep link), then multiplexes every logical request over that
//! one link by request id. Inbound frames that match a pending request
//! resolve exactly that caller; everything else is routed to the
//! [`EventBus`].
//!
//! Invariants:
//!
//! - at most one pending entry per request id, removed on response, on
//!   response timeout, and en masse when the link drops
//! - at most one active link; a reconnect replaces the previous reader
//!   rather than stacking a second one
//! - a lost link never leaves callers suspended: in-flight requests are
//!   rejected with [`Error::ConnectionLost`]


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use jetpack_protocol::{InboundMessage, MessageKind, OutboundRequest};

use crate::error::{Error, Result};
use crate::events::{EventBus, WalletEvent};
use crate::token;
use crate::transport::{LinkEvent, PeerLink, PeerTransport};

/// Where the connection currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

/// Tunables for connection establishment and request lifetimes.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
	/// Delay between dial attempts while the wallet is not yet reachable.
	pub poll_interval: Duration,
	/// Dial attempts before giving up with [`Error::ConnectionTimeout`].
	pub max_attempts: u32,
	/// Lifetime bound of a pending request; the entry is evicted when it
	/// elapses.
	pub response_timeout: Duration,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_millis(300),
			max_attempts: 50,
			response_timeout: Duration::from_secs(60),
		}
	}
}

type PendingSender = oneshot::Sender<Result<InboundMessage>>;

/// The connection manager and request/response multiplexer.
///
/// Cheap to clone; clones share the same link, pending map, and event bus.
/// When the last clone is dropped the reader task is aborted, so an
/// abandoned client never leaks its background work.
#[derive(Clone)]
pub struct Connection {
	inner: Arc<Inner>,
}

struct Inner {
	transport: Arc<dyn PeerTransport>,
	config: ConnectionConfig,
	state_tx: watch::Sender<ConnectionState>,
	pending: AsyncMutex<HashMap<String, PendingSender>>,
	sink: Mutex<Option<mpsc::Sender<Value>>>,
	reader: Mutex<Option<JoinHandle<()>>>,
	bus: EventBus,
}

impl Connection {
	pub fn new(transport: Arc<dyn PeerTransport>, config: ConnectionConfig) -> Self {
		let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
		Self {
			inner: Arc::new(Inner {
				transport,
				config,
				state_tx,
				pending: AsyncMutex::new(HashMap::new()),
				sink: Mutex::new(None),
				reader: Mutex::new(None),
				bus: EventBus::default(),
			}),
		}
	}

	pub fn events(&self) -> &EventBus {
		&self.inner.bus
	}

	pub fn state(&self) -> ConnectionState {
		*self.inner.state_tx.borrow()
	}

	pub fn is_connected(&self) -> bool {
		self.state() == ConnectionState::Connected
	}

	/// Watch channel mirroring [`state`](Self::state) transitions.
	pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
		self.inner.state_tx.subscribe()
	}

	/// Establishes the link to `remote_peer_id`, polling until it is
	/// reachable.
	///
	/// Already connected is a no-op. If another `connect` is in flight this
	/// call does not start a second poll loop; it waits for that one's
	/// outcome. On success the reader task is running, the state is
	/// [`Connected`](ConnectionState::Connected), and a
	/// [`WalletEvent::Connected`] has been emitted.
	///
	/// # Errors
	///
	/// [`Error::ConnectionTimeout`] once the attempt budget is spent;
	/// [`Error::ConnectionLost`] when [`disconnect`](Self::disconnect)
	/// interrupts the poll loop.
	pub async fn connect(&self, local_peer_id: &str, remote_peer_id: &str) -> Result<()> {
		let inner = &self.inner;
		let mut claimed = false;
		inner.state_tx.send_if_modified(|state| {
			if *state == ConnectionState::Disconnected {
				*state = ConnectionState::Connecting;
				claimed = true;
				true
			} else {
				false
			}
		});
		if !claimed {
			return match self.state() {
				ConnectionState::Connected => Ok(()),
				_ => inner.wait_for_outcome().await,
			};
		}

		for attempt in 1..=inner.config.max_attempts {
			if *inner.state_tx.borrow() != ConnectionState::Connecting {
				// disconnect() raced the poll loop
				return Err(Error::ConnectionLost);
			}
			match inner.transport.dial(local_peer_id, remote_peer_id).await {
				Ok(link) => {
					tracing::debug!(attempt, remote = remote_peer_id, "wallet link open");
					self.install(link);
					return Ok(());
				}
				Err(err) => {
					tracing::debug!(attempt, %err, "wallet peer not reachable yet");
				}
			}
			if attempt < inner.config.max_attempts {
				tokio::time::sleep(inner.config.poll_interval).await;
			}
		}

		inner.state_tx.send_replace(ConnectionState::Disconnected);
		Err(Error::ConnectionTimeout {
			attempts: inner.config.max_attempts,
		})
	}

	/// Closes the active link, rejects everything in flight, and emits
	/// [`WalletEvent::Disconnected`] if a link was actually up. Polling is
	/// not restarted; recovery takes a fresh [`connect`](Self::connect).
	pub async fn disconnect(&self) {
		let had_link = self.inner.sink.lock().is_some();
		if let Some(reader) = self.inner.reader.lock().take() {
			reader.abort();
		}
		self.inner.drop_link().await;
		if had_link {
			self.inner.bus.emit(WalletEvent::Disconnected);
		}
	}

	/// Registers interest in `request_id` before anything is sent.
	///
	/// Used by the handshake path, where the request travels out of band
	/// through the deep link and only the response comes back over the data
	/// channel. Pair with [`await_response`](Self::await_response) or
	/// [`unregister`](Self::unregister).
	pub async fn register(&self, request_id: &str) -> oneshot::Receiver<Result<InboundMessage>> {
		let (tx, rx) = oneshot::channel();
		self.inner
			.pending
			.lock()
			.await
			.insert(request_id.to_string(), tx);
		rx
	}

	/// Withdraws interest in `request_id`, if still pending.
	pub async fn unregister(&self, request_id: &str) {
		self.inner.pending.lock().await.remove(request_id);
	}

	/// Sends `method` + `data` over the live link and awaits the matching
	/// response.
	///
	/// Fails with [`Error::NotConnected`] before touching the transport when
	/// no link is up. The pending entry lives at most
	/// [`ConnectionConfig::response_timeout`]; on expiry it is evicted and
	/// the call fails with [`Error::ResponseTimeout`].
	pub async fn send_request(&self, method: &str, data: Value) -> Result<InboundMessage> {
		let request_id = token::request_id();
		let rx = self.register(&request_id).await;
		if let Err(err) = self.send_raw(method, data, &request_id).await {
			self.unregister(&request_id).await;
			return Err(err);
		}
		self.await_response(&request_id, rx).await
	}

	/// Sends a frame carrying `request_id` without registering a pending
	/// entry.
	pub async fn send_raw(&self, method: &str, data: Value, request_id: &str) -> Result<()> {
		let sink = self.inner.sink.lock().clone().ok_or(Error::NotConnected)?;
		let frame = serde_json::to_value(OutboundRequest::new(method, data, request_id))?;
		sink.send(frame).await.map_err(|_| Error::ConnectionLost)
	}

	/// Awaits the response for an already-registered `request_id`.
	pub async fn await_response(
		&self,
		request_id: &str,
		rx: oneshot::Receiver<Result<InboundMessage>>,
	) -> Result<InboundMessage> {
		let timeout = self.inner.config.response_timeout;
		match tokio::time::timeout(timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.unregister(request_id).await;
				Err(Error::ResponseTimeout(timeout))
			}
		}
	}

	fn install(&self, link: PeerLink) {
		let PeerLink { sink, events } = link;
		*self.inner.sink.lock() = Some(sink);
		let reader = spawn_reader(&self.inner, events);
		if let Some(old) = self.inner.reader.lock().replace(reader) {
			old.abort();
		}
		self.inner.state_tx.send_replace(ConnectionState::Connected);
		self.inner.bus.emit(WalletEvent::Connected);
	}

	#[cfg(test)]
	async fn pending_is_empty(&self) -> bool {
		self.inner.pending.lock().await.is_empty()
	}
}

impl Inner {
	async fn wait_for_outcome(&self) -> Result<()> {
		let mut state_rx = self.state_tx.subscribe();
		let state = state_rx
			.wait_for(|state| *state != ConnectionState::Connecting)
			.await
			.map_err(|_| Error::ChannelClosed)?;
		match *state {
			ConnectionState::Connected => Ok(()),
			_ => Err(Error::ConnectionTimeout {
				attempts: self.config.max_attempts,
			}),
		}
	}

	async fn drop_link(&self) {
		*self.sink.lock() = None;
		self.state_tx.send_replace(ConnectionState::Disconnected);
		let in_flight: Vec<(String, PendingSender)> =
			self.pending.lock().await.drain().collect();
		for (request_id, tx) in in_flight {
			tracing::debug!(%request_id, "rejecting in-flight request, connection lost");
			let _ = tx.send(Err(Error::ConnectionLost));
		}
	}

	/// Routes one inbound frame.
	///
	/// A frame whose `requestId` matches a pending entry resolves (or, for
	/// `error` frames, rejects) exactly that caller and emits no event.
	/// Everything else goes to the event bus by type.
	async fn dispatch(&self, frame: Value) {
		let message: InboundMessage = match serde_json::from_value(frame) {
			Ok(message) => message,
			Err(err) => {
				tracing::warn!(%err, "undecodable frame from wallet");
				self.bus.emit(WalletEvent::Error {
					message: format!("malformed message: {err}"),
				});
				return;
			}
		};

		if let Some(request_id) = message.request_id.clone() {
			if let Some(tx) = self.pending.lock().await.remove(&request_id) {
				let result = match message.kind {
					MessageKind::Error => Err(Error::Remote {
						message: message.error_text(),
					}),
					_ => Ok(message),
				};
				let _ = tx.send(result);
				return;
			}
		}

		self.route_unmatched(message);
	}

	fn route_unmatched(&self, message: InboundMessage) {
		match message.kind {
			MessageKind::Address => match message.address {
				Some(address) => self.bus.emit(WalletEvent::AddressReceived { address }),
				None => self.emit_malformed("address frame without an address"),
			},
			MessageKind::Tx => match message.hash {
				Some(hash) => self.bus.emit(WalletEvent::TxReceived { hash }),
				None => self.emit_malformed("tx frame without a hash"),
			},
			MessageKind::Error => self.bus.emit(WalletEvent::Error {
				message: message.error_text(),
			}),
			MessageKind::Unknown => {
				tracing::debug!("ignoring frame of unknown type");
			}
		}
	}

	fn emit_malformed(&self, what: &str) {
		tracing::warn!(what, "malformed frame from wallet");
		self.bus.emit(WalletEvent::Error {
			message: format!("malformed message: {what}"),
		});
	}
}

/// Reader task for one link. Holds the connection weakly so dropping the
/// last [`Connection`] clone ends the task instead of keeping it alive.
fn spawn_reader(inner: &Arc<Inner>, mut events: mpsc::Receiver<LinkEvent>) -> JoinHandle<()> {
	let conn = Arc::downgrade(inner);
	tokio::spawn(async move {
		while let Some(event) = events.recv().await {
			let Some(conn) = conn.upgrade() else {
				return;
			};
			match event {
				LinkEvent::Message(frame) => conn.dispatch(frame).await,
				LinkEvent::Closed => {
					tracing::debug!("wallet closed the link");
					conn.drop_link().await;
					conn.bus.emit(WalletEvent::Disconnected);
					return;
				}
				LinkEvent::Error(message) => {
					tracing::warn!(%message, "transport error, dropping the link");
					conn.drop_link().await;
					conn.bus.emit(WalletEvent::Error { message });
					conn.bus.emit(WalletEvent::Disconnected);
					return;
				}
			}
		}
	})
}

impl Drop for Inner {
	// Best-effort teardown so a dropped client never leaves the reader task
	// running.
	fn drop(&mut self) {
		if let Some(reader) = self.reader.get_mut().take() {
			reader.abort();
		}
	}
}
