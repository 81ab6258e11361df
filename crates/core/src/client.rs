//! The `JetPack` client facade.
//!
//! Ties the pieces together: identity resolution at build time, the
//! handshake deep link on first contact, and the multiplexed connection for
//! everything after. One instance drives one wallet session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use jetpack_protocol::InboundMessage;
use jetpack_runtime::{
	Connection, ConnectionConfig, Error, EventKind, EventStream, PeerTransport, Result, WalletEvent,
	token,
};

use crate::handshake::{self, SystemOpener, UrlOpener};
use crate::identity::ClientIdentity;

#[derive(Default)]
struct WalletState {
	address: Option<String>,
	pub_key: Option<String>,
}

/// Configures and builds a [`JetPack`] client.
pub struct JetPackBuilder {
	transport: Option<Arc<dyn PeerTransport>>,
	opener: Option<Arc<dyn UrlOpener>>,
	host_context: Option<String>,
	config: ConnectionConfig,
}

impl JetPackBuilder {
	fn new() -> Self {
		Self {
			transport: None,
			opener: None,
			host_context: None,
			config: ConnectionConfig::default(),
		}
	}

	/// Peer transport capability; required.
	pub fn transport(mut self, transport: Arc<dyn PeerTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// URL opener for the handshake deep link. Defaults to [`SystemOpener`].
	pub fn url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
		self.opener = Some(opener);
		self
	}

	/// Host init data (URL-encoded query string with a JSON `user` field).
	pub fn host_context(mut self, context: impl Into<String>) -> Self {
		self.host_context = Some(context.into());
		self
	}

	/// Polling and timeout tunables.
	pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
		self.config = config;
		self
	}

	/// Resolves the identity and builds the client.
	///
	/// # Errors
	///
	/// [`Error::UnsupportedEnvironment`] when no transport was configured.
	pub fn build(self) -> Result<JetPack> {
		let transport = self.transport.ok_or_else(|| {
			Error::UnsupportedEnvironment("no peer transport configured".to_string())
		})?;
		let identity = ClientIdentity::resolve(self.host_context.as_deref());
		tracing::debug!(local_peer_id = %identity.local_peer_id, "client identity resolved");

		let connection = Connection::new(transport, self.config);
		let wallet = Arc::new(Mutex::new(WalletState::default()));

		// Unsolicited address pushes refresh the cache too.
		let cache = Arc::clone(&wallet);
		connection
			.events()
			.on(EventKind::AddressReceived, move |event| {
				if let WalletEvent::AddressReceived { address } = event {
					cache.lock().address = Some(address.clone());
				}
			});

		Ok(JetPack {
			identity,
			connection,
			opener: self
				.opener
				.unwrap_or_else(|| Arc::new(SystemOpener)),
			wallet,
		})
	}
}

/// Client handle for one wallet session.
pub struct JetPack {
	identity: ClientIdentity,
	connection: Connection,
	opener: Arc<dyn UrlOpener>,
	wallet: Arc<Mutex<WalletState>>,
}

impl JetPack {
	pub fn builder() -> JetPackBuilder {
		JetPackBuilder::new()
	}

	pub fn identity(&self) -> &ClientIdentity {
		&self.identity
	}

	pub fn is_connected(&self) -> bool {
		self.connection.is_connected()
	}

	/// Last address received from the wallet, if any.
	pub fn address(&self) -> Option<String> {
		self.wallet.lock().address.clone()
	}

	/// Public key attached to the last address response, if any.
	pub fn pub_key(&self) -> Option<String> {
		self.wallet.lock().pub_key.clone()
	}

	/// Registers a handler for connection-level events.
	///
	/// Handlers run synchronously on emission, in registration order, and
	/// are never removed.
	pub fn on<F>(&self, kind: EventKind, handler: F)
	where
		F: Fn(&WalletEvent) + Send + Sync + 'static,
	{
		self.connection.events().on(kind, handler);
	}

	/// Stream of connection-level events.
	pub fn events(&self) -> EventStream {
		self.connection.events().stream()
	}

	/// Waits for the next event of `kind`.
	pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<WalletEvent> {
		self.connection.events().wait_for(kind, timeout).await
	}

	/// Connects to the wallet and returns the account address for
	/// `chain_id`.
	///
	/// When no link is up this is the full first-contact flow: register
	/// interest in a fresh request id, open the handshake deep link carrying
	/// `{peer_id, chain_id, request_id}`, poll the transport until the
	/// wallet comes up, then await the address response. When already
	/// connected the request simply goes over the live channel.
	///
	/// # Errors
	///
	/// [`Error::UnsupportedEnvironment`] when the deep link cannot be
	/// opened, [`Error::ConnectionTimeout`] when the wallet never becomes
	/// reachable, [`Error::Remote`] when the wallet refuses.
	pub async fn connect_wallet(&self, chain_id: &str) -> Result<String> {
		if self.connection.is_connected() {
			let data = json!({
				"peer_id": self.identity.local_peer_id,
				"chain_id": chain_id,
			});
			let response = self.connection.send_request("connectWallet", data).await?;
			return self.accept_address(response);
		}

		let request_id = token::request_id();
		let rx = self.connection.register(&request_id).await;
		let data = json!({
			"peer_id": self.identity.local_peer_id,
			"chain_id": chain_id,
			"request_id": request_id,
		});

		if let Err(err) = handshake::initiate(self.opener.as_ref(), "connectWallet", &data) {
			self.connection.unregister(&request_id).await;
			return Err(err);
		}

		if let Err(err) = self
			.connection
			.connect(&self.identity.local_peer_id, &self.identity.remote_peer_id())
			.await
		{
			self.connection.unregister(&request_id).await;
			return Err(err);
		}

		let response = self.connection.await_response(&request_id, rx).await?;
		self.accept_address(response)
	}

	/// Submits transaction messages and returns the transaction hash.
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] when no connection is live; establishing one
	/// is `connect_wallet`'s job.
	pub async fn send_tx(&self, messages: Vec<Value>) -> Result<String> {
		if !self.connection.is_connected() {
			return Err(Error::NotConnected);
		}
		let response = self
			.connection
			.send_request("sendTx", json!({ "messages": messages }))
			.await?;
		response
			.hash
			.ok_or_else(|| Error::MalformedMessage("tx response without a hash".to_string()))
	}

	/// Tears the connection down; in-flight requests are rejected.
	pub async fn disconnect(&self) {
		self.connection.disconnect().await;
	}

	fn accept_address(&self, response: InboundMessage) -> Result<String> {
		let address = response.address.ok_or_else(|| {
			Error::MalformedMessage("address response without an address".to_string())
		})?;
		let mut wallet = self.wallet.lock();
		wallet.address = Some(address.clone());
		if response.pub_key.is_some() {
			wallet.pub_key = response.pub_key;
		}
		Ok(address)
	}
}
