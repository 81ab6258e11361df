//! Wire types for the JetWallet bridge protocol.
//!
//! Two channels carry wallet traffic and both are defined here:
//!
//! - the **deep link** opened through the Telegram bot, which smuggles the
//!   initial request to the wallet as a base64 `startapp` parameter
//!   ([`deep_link`]);
//! - the **data channel** between the client and the wallet, a stream of
//!   small JSON frames correlated by request id ([`message`]).
//!
//! The crate is serialization only; connection lifecycle lives in
//! `jetpack-runtime`.

pub mod deep_link;
pub mod message;

pub use deep_link::StartParam;
pub use message::{InboundMessage, MessageKind, OutboundRequest, REQUEST_ID_FIELD};
