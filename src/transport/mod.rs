pub mod trusted;
pub mod untrusted;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::messages::{BridgeCommand, BridgeMessage, BridgeResponse, CorrelationKey, TransportError};
use crate::window::{Listener, ListenerId, MessageEvent, Origin, OriginError, Window, WindowHandle};

/// Handler invoked when a message carrying its correlation key arrives.
/// Returning `Some` posts the result back to the event's source window.
pub type CommandHandler =
	Arc<dyn Fn(BridgeMessage) -> BoxFuture<'static, Option<BridgeMessage>> + Send + Sync>;

// -- Transport --

/// Bi-directional messaging over a window pair.
///
/// One table holds both long-lived command handlers and the one-shot
/// resolvers registered by [`send_command`](MessagingTransport::send_command);
/// both are keyed by correlation key, which is why a second request of a
/// kind already in flight is refused instead of queued.  The transport
/// listens on its own window only while the table is non-empty: the shared
/// listener is attached with the first entry and detached with the last.
#[derive(Clone)]
pub struct MessagingTransport {
	shared: Arc<TransportShared>,
}

struct TransportShared {
	window: Window,
	target: WindowHandle,
	target_origin: Origin,
	deadline: Duration,
	handlers: Mutex<HandlerTable>,
}

struct HandlerTable {
	entries: HashMap<CorrelationKey, CommandHandler>,
	listener: Option<ListenerId>,
}

impl MessagingTransport {
	/// `target_url` is normalized to an origin here, once, so posts and the
	/// inbound origin filter always compare against the same value.
	pub fn new(
		window: Window,
		target: WindowHandle,
		target_url: &str,
		deadline: Duration,
	) -> Result<Self, OriginError> {
		let target_origin = Origin::parse(target_url)?;
		Ok(MessagingTransport {
			shared: Arc::new(TransportShared {
				window,
				target,
				target_origin,
				deadline,
				handlers: Mutex::new(HandlerTable { entries: HashMap::new(), listener: None }),
			}),
		})
	}

	/// Send a command and wait for the matching response.
	///
	/// Fails fast with `CommandInProgress` when a request with the same
	/// correlation key is pending, with `BridgeNotReady` when the target
	/// window cannot be reached (or the transport is closed mid-flight),
	/// and with `Timeout` when no response arrives before the deadline.
	/// A timed-out request leaves its key occupied until the late reply
	/// arrives and is discarded, so a reply can only ever resolve the
	/// request that asked for it; same-kind retries inside that window
	/// are refused as `CommandInProgress`.
	pub async fn send_command(&self, command: BridgeCommand) -> Result<BridgeResponse, TransportError> {
		let key = command.id();
		let (resolve, resolved) = oneshot::channel();
		let pending = resolver(resolve);
		// Identity of this request's entry.  Weak, so the table keeps the
		// only strong reference and `close` dropping it still fails the
		// wait below.
		let registration = Arc::downgrade(&pending);
		if !self.shared.add_handler(key, pending) {
			return Err(TransportError::CommandInProgress);
		}
		let posted = self.shared.target.post_message(
			command.into(),
			&self.shared.target_origin,
			&self.shared.window,
		);
		if !posted {
			self.shared.remove_handler(key);
			return Err(TransportError::BridgeNotReady);
		}
		match tokio::time::timeout(self.shared.deadline, resolved).await {
			Ok(Ok(response)) => Ok(response),
			Ok(Err(_)) => Err(TransportError::BridgeNotReady),
			Err(_) => {
				// The frame may still answer.  A sink keeps the key occupied
				// until that reply lands and is discarded, so it can never
				// resolve a later request.  Swap only while the entry is
				// still ours: the response may have won the race, and the
				// key may already belong to a newer request.
				if let Some(current) = registration.upgrade() {
					self.shared.swap_handler(key, &current, stale_reply_sink());
				}
				tracing::warn!(command = %key, "no response before deadline");
				Err(TransportError::Timeout)
			}
		}
	}

	/// Post a message without registering for a response.
	pub fn post(&self, message: impl Into<BridgeMessage>) -> bool {
		self.shared.target.post_message(
			message.into(),
			&self.shared.target_origin,
			&self.shared.window,
		)
	}

	/// Install a handler for a correlation key.  Returns false, changing
	/// nothing, when the key is already taken.
	pub fn add_command_handler(&self, key: CorrelationKey, handler: CommandHandler) -> bool {
		self.shared.add_handler(key, handler)
	}

	/// Remove the handler for a key.  Returns false when no such handler
	/// exists.
	pub fn remove_command_handler(&self, key: CorrelationKey) -> bool {
		self.shared.remove_handler(key)
	}

	/// Drop every handler, resolving in-flight requests as `BridgeNotReady`,
	/// and detach from the window.
	pub fn close(&self) {
		let mut table = self.shared.handlers.lock().expect("handler table lock");
		table.entries.clear();
		if let Some(id) = table.listener.take() {
			self.shared.window.remove_message_listener(id);
		}
	}

	pub fn handler_count(&self) -> usize {
		self.shared.handlers.lock().expect("handler table lock").entries.len()
	}

	pub fn window(&self) -> &Window {
		&self.shared.window
	}

	pub fn target_origin(&self) -> &Origin {
		&self.shared.target_origin
	}
}

impl std::fmt::Debug for MessagingTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MessagingTransport")
			.field("window", self.shared.window.origin())
			.field("target", &self.shared.target_origin)
			.finish()
	}
}

impl TransportShared {
	fn add_handler(self: &Arc<Self>, key: CorrelationKey, handler: CommandHandler) -> bool {
		let mut table = self.handlers.lock().expect("handler table lock");
		if table.entries.contains_key(&key) {
			return false;
		}
		if table.entries.is_empty() && table.listener.is_none() {
			let listener = self.window.add_message_listener(shared_listener(self));
			table.listener = Some(listener);
		}
		table.entries.insert(key, handler);
		true
	}

	fn remove_handler(&self, key: CorrelationKey) -> bool {
		let mut table = self.handlers.lock().expect("handler table lock");
		if table.entries.remove(&key).is_none() {
			return false;
		}
		if table.entries.is_empty() {
			if let Some(id) = table.listener.take() {
				self.window.remove_message_listener(id);
			}
		}
		true
	}

	/// Swap `key`'s entry for `replacement` only while it still holds
	/// `expected`.  Returns false without touching the table when the entry
	/// was already consumed or a newer request owns the key.
	fn swap_handler(
		&self,
		key: CorrelationKey,
		expected: &CommandHandler,
		replacement: CommandHandler,
	) -> bool {
		let mut table = self.handlers.lock().expect("handler table lock");
		let is_expected = table
			.entries
			.get(&key)
			.map_or(false, |current| Arc::ptr_eq(current, expected));
		if is_expected {
			table.entries.insert(key, replacement);
		}
		is_expected
	}

	async fn on_message(&self, event: MessageEvent) {
		if event.origin != self.target_origin {
			tracing::debug!(
				from = %event.origin,
				expected = %self.target_origin,
				"ignoring message from unexpected origin"
			);
			return;
		}
		let key = event.data.kind();
		let handler = {
			let table = self.handlers.lock().expect("handler table lock");
			table.entries.get(&key).cloned()
		};
		let Some(handler) = handler else {
			tracing::debug!(command = %key, "no handler for command, dropping message");
			return;
		};

		// A message whose stamped origin differs from its body's origin,
		// or that has no source to reply to, is a response to something we
		// sent.  Its entry is consumed before the handler wakes the sender,
		// so the key is free again by the time the sender can send more.
		let is_response = event.origin != *event.data.origin() || event.source.is_none();
		if is_response {
			self.remove_handler(event.data.id());
			handler(event.data).await;
			return;
		}
		let Some(reply) = handler(event.data).await else {
			return;
		};
		if let Some(source) = event.source {
			let reply_origin = reply.origin().clone();
			source.post_message(reply, &reply_origin, &self.window);
		}
	}
}

// The transport must not keep itself alive through its own listener, so the
// closure holds a weak reference and goes inert once the transport drops.
fn shared_listener(shared: &Arc<TransportShared>) -> Listener {
	let weak: Weak<TransportShared> = Arc::downgrade(shared);
	Arc::new(move |event| {
		let weak = weak.clone();
		Box::pin(async move {
			if let Some(shared) = weak.upgrade() {
				shared.on_message(event).await;
			}
		})
	})
}

// Stand-in for a resolver whose request timed out.  It holds the key so a
// retry cannot adopt the late reply; when that reply arrives it is dropped
// here, and consuming it frees the key.
fn stale_reply_sink() -> CommandHandler {
	Arc::new(|message| {
		Box::pin(async move {
			tracing::debug!(command = %message.kind(), "discarding reply that missed its deadline");
			None
		})
	})
}

// One-shot resolver wrapped in the common handler shape.  Only a response
// message resolves it; a stray command with the same key is ignored.
fn resolver(resolve: oneshot::Sender<BridgeResponse>) -> CommandHandler {
	let slot = Arc::new(Mutex::new(Some(resolve)));
	Arc::new(move |message| {
		let slot = Arc::clone(&slot);
		Box::pin(async move {
			if let BridgeMessage::Response(response) = message {
				if let Some(resolve) = slot.lock().expect("resolver slot lock").take() {
					let _ = resolve.send(response);
				}
			}
			None
		})
	})
}

impl Drop for TransportShared {
	fn drop(&mut self) {
		let mut table = self.handlers.lock().expect("handler table lock");
		if let Some(id) = table.listener.take() {
			self.window.remove_message_listener(id);
		}
	}
}
