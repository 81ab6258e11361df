//! End-to-end flows against an in-process wallet.
//!
//! The fake wallet mirrors the real one's behavior: it learns of the first
//! request through the handshake deep link (here, intercepted from the URL
//! opener), starts listening on the peer transport, answers the handshake
//! request unprompted once the channel opens, and then serves requests over
//! the channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use jetpack::protocol::deep_link;
use jetpack::{
	ConnectionConfig, Error, EventKind, JetPack, LinkEvent, MemoryTransport, UrlOpener, WalletEvent,
};

const HOST_CONTEXT: &str = "query_id=AAF3&user=%7B%22id%22%3A%22u1%22%7D&auth_date=1700000000";
const WALLET_PEER: &str = "jetpack-cosmos_wallet_bot-u1";

fn fast_config() -> ConnectionConfig {
	ConnectionConfig {
		poll_interval: Duration::from_millis(10),
		max_attempts: 20,
		response_timeout: Duration::from_millis(500),
	}
}

/// Captures opened deep links and forwards the embedded request id to the
/// wallet task, the way Telegram forwards `startapp` to the mini app.
#[derive(Clone)]
struct DeepLinkOpener {
	urls: Arc<Mutex<Vec<String>>>,
	rid_tx: mpsc::UnboundedSender<String>,
}

impl DeepLinkOpener {
	fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
		let (rid_tx, rid_rx) = mpsc::unbounded_channel();
		(
			Self {
				urls: Arc::new(Mutex::new(Vec::new())),
				rid_tx,
			},
			rid_rx,
		)
	}
}

impl UrlOpener for DeepLinkOpener {
	fn open_url(&self, url: &str) -> jetpack::Result<()> {
		self.urls.lock().push(url.to_string());
		let param = url.split_once("startapp=").expect("deep link format").1;
		let start = deep_link::decode_start_param(param).expect("decodable startapp");
		if let Some(rid) = start.data["request_id"].as_str() {
			let _ = self.rid_tx.send(rid.to_string());
		}
		Ok(())
	}
}

struct FailingOpener;

impl UrlOpener for FailingOpener {
	fn open_url(&self, _url: &str) -> jetpack::Result<()> {
		Err(Error::UnsupportedEnvironment(
			"no way to open a URL here".to_string(),
		))
	}
}

/// Wallet behavior after the handshake: how to answer the initial request
/// and subsequent channel requests.
enum WalletMood {
	Cooperative,
	Denying,
}

fn spawn_wallet(
	transport: &MemoryTransport,
	mut rid_rx: mpsc::UnboundedReceiver<String>,
	mood: WalletMood,
) {
	let mut sessions = transport.listen(WALLET_PEER);
	tokio::spawn(async move {
		let Some(rid) = rid_rx.recv().await else {
			return;
		};
		let Some(mut session) = sessions.recv().await else {
			return;
		};

		let first = match mood {
			WalletMood::Cooperative => json!({
				"type": "address",
				"requestId": rid,
				"address": "cosmos1demoaddr",
				"pubKey": "02demo",
			}),
			WalletMood::Denying => json!({
				"type": "error",
				"requestId": rid,
				"message": "user rejected the connection",
			}),
		};
		if session.link.sink.send(first).await.is_err() {
			return;
		}

		while let Some(event) = session.link.events.recv().await {
			let LinkEvent::Message(frame) = event else {
				return;
			};
			let reply = match frame["method"].as_str() {
				Some("sendTx") => json!({
					"type": "tx",
					"requestId": frame["data"]["request_id"],
					"hash": "9FC7A2B1",
				}),
				Some("connectWallet") => json!({
					"type": "address",
					"requestId": frame["data"]["request_id"],
					"address": "cosmos1demoaddr",
				}),
				_ => continue,
			};
			if session.link.sink.send(reply).await.is_err() {
				return;
			}
		}
	});
}

fn build_client(transport: &MemoryTransport, opener: impl UrlOpener + 'static) -> JetPack {
	JetPack::builder()
		.transport(Arc::new(transport.clone()))
		.url_opener(Arc::new(opener))
		.host_context(HOST_CONTEXT)
		.connection_config(fast_config())
		.build()
		.expect("client builds")
}

#[tokio::test]
async fn connect_wallet_runs_the_full_first_contact_flow() -> anyhow::Result<()> {
	let transport = MemoryTransport::new();
	let (opener, rid_rx) = DeepLinkOpener::new();
	spawn_wallet(&transport, rid_rx, WalletMood::Cooperative);
	let client = build_client(&transport, opener.clone());
	let mut events = client.events();
	let connects = Arc::new(Mutex::new(0u32));
	let counter = Arc::clone(&connects);
	client.on(EventKind::Connect, move |_| *counter.lock() += 1);

	let address = client.connect_wallet("cosmoshub").await?;

	assert_eq!(address, "cosmos1demoaddr");
	assert_eq!(client.address().as_deref(), Some("cosmos1demoaddr"));
	assert_eq!(client.pub_key().as_deref(), Some("02demo"));
	assert!(client.is_connected());
	assert_eq!(events.recv().await, Some(WalletEvent::Connected));
	assert_eq!(*connects.lock(), 1);

	// The deep link carried our peer id, the chain, and the request id.
	let urls = opener.urls.lock();
	assert_eq!(urls.len(), 1);
	let param = urls[0].split_once("startapp=").unwrap().1;
	let start = deep_link::decode_start_param(param).unwrap();
	assert_eq!(start.method, "connectWallet");
	assert_eq!(
		start.data["peer_id"].as_str(),
		Some(client.identity().local_peer_id.as_str())
	);
	assert_eq!(start.data["chain_id"].as_str(), Some("cosmoshub"));
	assert!(!start.data["request_id"].as_str().unwrap().is_empty());
	Ok(())
}

#[tokio::test]
async fn send_tx_before_any_connection_fails_not_connected() {
	let transport = MemoryTransport::new();
	let (opener, _rid_rx) = DeepLinkOpener::new();
	let client = build_client(&transport, opener);

	let result = client.send_tx(vec![json!({ "amount": "1" })]).await;
	assert!(matches!(result, Err(Error::NotConnected)));
}

#[tokio::test]
async fn send_tx_over_a_live_connection_returns_the_hash() -> anyhow::Result<()> {
	let transport = MemoryTransport::new();
	let (opener, rid_rx) = DeepLinkOpener::new();
	spawn_wallet(&transport, rid_rx, WalletMood::Cooperative);
	let client = build_client(&transport, opener);

	client.connect_wallet("cosmoshub").await?;
	let hash = client.send_tx(vec![json!({ "amount": "1" })]).await?;

	assert_eq!(hash, "9FC7A2B1");
	Ok(())
}

#[tokio::test]
async fn wallet_denial_surfaces_as_remote_error() {
	let transport = MemoryTransport::new();
	let (opener, rid_rx) = DeepLinkOpener::new();
	spawn_wallet(&transport, rid_rx, WalletMood::Denying);
	let client = build_client(&transport, opener);

	let result = client.connect_wallet("cosmoshub").await;
	match result {
		Err(Error::Remote { message }) => assert_eq!(message, "user rejected the connection"),
		other => panic!("expected remote error, got {other:?}"),
	}
}

#[tokio::test]
async fn missing_url_capability_fails_loudly_before_connecting() {
	let transport = MemoryTransport::new();
	let client = build_client(&transport, FailingOpener);

	let result = client.connect_wallet("cosmoshub").await;
	assert!(matches!(result, Err(Error::UnsupportedEnvironment(_))));
	assert!(!client.is_connected());
}

#[tokio::test]
async fn unreachable_wallet_times_out() {
	let transport = MemoryTransport::new();
	let (opener, _rid_rx) = DeepLinkOpener::new();
	// Nobody ever listens on the wallet peer id.
	let client = build_client(&transport, opener);

	let result = client.connect_wallet("cosmoshub").await;
	assert!(matches!(result, Err(Error::ConnectionTimeout { .. })));
	assert!(!client.is_connected());
}

#[tokio::test]
async fn unsolicited_address_push_refreshes_the_cache() -> anyhow::Result<()> {
	let transport = MemoryTransport::new();
	let mut sessions = transport.listen(WALLET_PEER);
	let (opener, mut rid_rx) = DeepLinkOpener::new();
	let client = build_client(&transport, opener);

	let wallet = tokio::spawn(async move {
		let rid = rid_rx.recv().await.unwrap();
		let session = sessions.recv().await.unwrap();
		session
			.link
			.sink
			.send(json!({
				"type": "address",
				"requestId": rid,
				"address": "cosmos1first",
			}))
			.await
			.unwrap();
		// Later, the user switches accounts in the wallet.
		session
			.link
			.sink
			.send(json!({ "type": "address", "address": "cosmos1second" }))
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_secs(1)).await;
	});

	let mut events = client.events();
	let address = client.connect_wallet("cosmoshub").await?;
	assert_eq!(address, "cosmos1first");

	// Connected first, then the push; the subscription predates both.
	let pushed = loop {
		match events.recv().await {
			Some(WalletEvent::AddressReceived { address }) => break address,
			Some(_) => continue,
			None => panic!("event stream closed before the push arrived"),
		}
	};
	assert_eq!(pushed, "cosmos1second");
	assert_eq!(client.address().as_deref(), Some("cosmos1second"));

	wallet.abort();
	Ok(())
}

#[tokio::test]
async fn disconnect_tears_down_the_session() -> anyhow::Result<()> {
	let transport = MemoryTransport::new();
	let (opener, rid_rx) = DeepLinkOpener::new();
	spawn_wallet(&transport, rid_rx, WalletMood::Cooperative);
	let client = build_client(&transport, opener.clone());

	client.connect_wallet("cosmoshub").await?;
	client.disconnect().await;
	assert!(!client.is_connected());

	let result = client.send_tx(vec![json!({ "amount": "1" })]).await;
	assert!(matches!(result, Err(Error::NotConnected)));
	Ok(())
}
