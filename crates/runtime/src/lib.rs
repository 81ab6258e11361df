//! Connection runtime for the JetWallet bridge.
//!
//! Owns everything between the public client facade and the peer transport:
//!
//! - [`connection`] - the single active link, polling connection
//!   establishment, and request/response correlation by request id
//! - [`events`] - typed publish/subscribe for connection-level occurrences
//! - [`transport`] - the [`PeerTransport`] contract plus an in-memory
//!   implementation used by tests
//! - [`error`] - the crate-wide error taxonomy
//!
//! The transport itself (WebRTC, relay, whatever the embedder provides) is
//! deliberately out of scope; the runtime only dials peers by name and
//! exchanges JSON frames.

pub mod connection;
pub mod error;
pub mod events;
pub mod token;
pub mod transport;

pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::{Error, Result};
pub use events::{EventBus, EventKind, EventStream, WalletEvent};
pub use transport::{LinkEvent, PeerLink, PeerTransport};
