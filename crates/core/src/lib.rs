//! jetpack: connect an application to the JetWallet Telegram wallet.
//!
//! The wallet runs as a Telegram mini app, so reaching it takes two
//! channels: a bot deep link for the very first request (the user has to
//! open the wallet before it can talk back) and a peer-to-peer data channel
//! for everything else. This crate hides both behind one facade.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jetpack::JetPack;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = JetPack::builder()
//!         .transport(my_transport)               // Arc<dyn PeerTransport>
//!         .host_context(telegram_init_data)      // optional
//!         .build()?;
//!
//!     let address = client.connect_wallet("cosmoshub-4").await?;
//!     println!("connected as {address}");
//!
//!     let hash = client.send_tx(vec![transfer_msg]).await?;
//!     println!("submitted {hash}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod handshake;
pub mod identity;

pub use client::{JetPack, JetPackBuilder};
pub use handshake::{SystemOpener, UrlOpener};
pub use identity::ClientIdentity;

// Re-export the protocol and runtime layers for embedders that implement
// their own transport or wallet side.
pub use jetpack_protocol as protocol;
pub use jetpack_runtime::transport::memory::MemoryTransport;
pub use jetpack_runtime::{
	Connection, ConnectionConfig, ConnectionState, Error, EventKind, EventStream, LinkEvent,
	PeerLink, PeerTransport, Result, WalletEvent,
};
