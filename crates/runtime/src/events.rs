//! Typed event system for connection-level occurrences.
//!
//! Inbound frames that resolve a pending request go straight to their
//! caller; everything else - connect/disconnect transitions, unsolicited
//! pushes, unmatched errors - is published here. Three delivery mechanisms,
//! always in this order per [`EventBus::emit`]:
//!
//! 1. registered handlers, synchronously, in registration order, each
//!    isolated so one panicking handler cannot block the rest
//! 2. one-shot predicate waiters, for `wait_for`-style calls
//! 3. broadcast fan-out for [`EventStream`] subscribers

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};

use crate::error::{Error, Result};

/// Something that happened on the wallet connection outside any pending
/// request.
#[derive(Debug, Clone, PartialEq)]
pub enum WalletEvent {
	Connected,
	Disconnected,
	/// The wallet pushed an account address without an originating request.
	AddressReceived { address: String },
	/// The wallet pushed a transaction result without an originating request.
	TxReceived { hash: String },
	/// An error not attributable to any pending request.
	Error { message: String },
}

/// Discriminant of [`WalletEvent`], used to register interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	Connect,
	Disconnect,
	AddressReceived,
	TxReceived,
	Error,
}

impl WalletEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			WalletEvent::Connected => EventKind::Connect,
			WalletEvent::Disconnected => EventKind::Disconnect,
			WalletEvent::AddressReceived { .. } => EventKind::AddressReceived,
			WalletEvent::TxReceived { .. } => EventKind::TxReceived,
			WalletEvent::Error { .. } => EventKind::Error,
		}
	}
}

type Handler = Arc<dyn Fn(&WalletEvent) + Send + Sync>;

struct WaiterEntry {
	predicate: Box<dyn Fn(&WalletEvent) -> bool + Send + Sync>,
	complete_tx: oneshot::Sender<WalletEvent>,
}

/// Publish/subscribe registry for [`WalletEvent`].
///
/// Handlers are never removed automatically; they live as long as the bus.
pub struct EventBus {
	handlers: Mutex<Vec<(EventKind, Handler)>>,
	waiters: Mutex<Vec<WaiterEntry>>,
	tx: broadcast::Sender<WalletEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity);
		Self {
			handlers: Mutex::new(Vec::new()),
			waiters: Mutex::new(Vec::new()),
			tx,
		}
	}

	/// Registers a handler for one event kind.
	pub fn on<F>(&self, kind: EventKind, handler: F)
	where
		F: Fn(&WalletEvent) + Send + Sync + 'static,
	{
		self.handlers.lock().push((kind, Arc::new(handler)));
	}

	/// Delivers an event to handlers, waiters, and stream subscribers.
	///
	/// Handlers run synchronously in registration order. A panicking handler
	/// is logged and skipped; delivery continues with the next one. Handlers
	/// are snapshotted before invocation, so a handler may register further
	/// handlers without deadlocking (they take effect from the next emit).
	pub fn emit(&self, event: WalletEvent) {
		let handlers: Vec<Handler> = self
			.handlers
			.lock()
			.iter()
			.filter(|(kind, _)| *kind == event.kind())
			.map(|(_, handler)| Arc::clone(handler))
			.collect();
		for handler in handlers {
			if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
				tracing::warn!(kind = ?event.kind(), "event handler panicked");
			}
		}

		{
			let mut waiters = self.waiters.lock();
			let mut i = 0;
			while i < waiters.len() {
				if (waiters[i].predicate)(&event) {
					let entry = waiters.swap_remove(i);
					let _ = entry.complete_tx.send(event.clone());
				} else {
					i += 1;
				}
			}
		}

		let _ = self.tx.send(event);
	}

	/// Subscribes to the raw broadcast stream.
	///
	/// Events emitted before subscription are not received.
	pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
		self.tx.subscribe()
	}

	/// Subscribes with lag handling; see [`EventStream`].
	pub fn stream(&self) -> EventStream {
		EventStream::new(self.tx.subscribe())
	}

	/// Registers a one-shot waiter completed by the first matching event.
	pub fn register_waiter<F>(&self, predicate: F) -> oneshot::Receiver<WalletEvent>
	where
		F: Fn(&WalletEvent) -> bool + Send + Sync + 'static,
	{
		let (complete_tx, complete_rx) = oneshot::channel();
		self.waiters.lock().push(WaiterEntry {
			predicate: Box::new(predicate),
			complete_tx,
		});
		complete_rx
	}

	/// Waits for the next event of `kind`, bounded by `timeout`.
	///
	/// # Errors
	///
	/// [`Error::ResponseTimeout`] when nothing matching arrives in time.
	pub async fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<WalletEvent> {
		let rx = self.register_waiter(move |event| event.kind() == kind);
		tokio::time::timeout(timeout, rx)
			.await
			.map_err(|_| Error::ResponseTimeout(timeout))?
			.map_err(|_| Error::ChannelClosed)
	}

	#[cfg(test)]
	pub fn waiter_count(&self) -> usize {
		self.waiters.lock().len()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

/// Wrapper around [`broadcast::Receiver`] that logs lag instead of failing.
///
/// [`broadcast::Receiver`]: tokio::sync::broadcast::Receiver
pub struct EventStream {
	rx: broadcast::Receiver<WalletEvent>,
}

impl EventStream {
	pub(crate) fn new(rx: broadcast::Receiver<WalletEvent>) -> Self {
		Self { rx }
	}

	/// Next event, or `None` once the bus is gone.
	pub async fn recv(&mut self) -> Option<WalletEvent> {
		loop {
			match self.rx.recv().await {
				Ok(event) => return Some(event),
				Err(broadcast::error::RecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "event stream lagged, dropped events");
				}
				Err(broadcast::error::RecvError::Closed) => return None,
			}
		}
	}

	/// Non-blocking variant of [`recv`](Self::recv).
	pub fn try_recv(&mut self) -> Option<WalletEvent> {
		loop {
			match self.rx.try_recv() {
				Ok(event) => return Some(event),
				Err(broadcast::error::TryRecvError::Lagged(n)) => {
					tracing::warn!(dropped = n, "event stream lagged, dropped events");
				}
				Err(
					broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
				) => return None,
			}
		}
	}
}
