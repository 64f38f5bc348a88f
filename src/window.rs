use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::future::BoxFuture;
use serde::{de, Deserialize, Deserializer, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::messages::BridgeMessage;

// -- Origins --

/// A normalized web origin: `scheme://authority`, lowercased, with any
/// path, query, or trailing slash stripped.  Normalization is done by hand
/// because the bridge runs on browser-internal schemes (`chrome://`,
/// `chrome-untrusted://`) that generic URL parsers treat as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Origin(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
	#[error("origin `{0}` has no scheme")]
	MissingScheme(String),
	#[error("origin `{0}` has an invalid scheme")]
	InvalidScheme(String),
	#[error("origin `{0}` has no host")]
	MissingHost(String),
}

impl Origin {
	pub fn parse(input: &str) -> Result<Self, OriginError> {
		let trimmed = input.trim();
		let (scheme, rest) = trimmed
			.split_once("://")
			.ok_or_else(|| OriginError::MissingScheme(trimmed.to_string()))?;
		let valid_scheme = scheme
			.chars()
			.next()
			.map_or(false, |c| c.is_ascii_alphabetic())
			&& scheme
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
		if !valid_scheme {
			return Err(OriginError::InvalidScheme(trimmed.to_string()));
		}
		let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
		let authority = &rest[..end];
		if authority.is_empty() {
			return Err(OriginError::MissingHost(trimmed.to_string()));
		}
		Ok(Origin(format!(
			"{}://{}",
			scheme.to_ascii_lowercase(),
			authority.to_ascii_lowercase()
		)))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for Origin {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

// Origins read off the wire go through the same normalization as locally
// built ones, so equality checks never hinge on a stray trailing slash.
impl<'de> Deserialize<'de> for Origin {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		Origin::parse(&raw).map_err(de::Error::custom)
	}
}

// -- Events --

/// What a message listener receives.  `origin` is stamped by the posting
/// context itself, not taken from the message body, so receivers can trust
/// it the way browser code trusts `event.origin`.  `source` is a handle to
/// the posting window when one exists; replies go back through it.
#[derive(Debug, Clone)]
pub struct MessageEvent {
	pub data: BridgeMessage,
	pub origin: Origin,
	pub source: Option<WindowHandle>,
}

// -- Window handles --

/// A clonable reference to another window's inbound queue.  Posting through
/// a handle enforces the target-origin restriction: the message is dropped
/// unless the handle's window lives at exactly the origin the sender named.
#[derive(Clone)]
pub struct WindowHandle {
	origin: Origin,
	sender: mpsc::UnboundedSender<MessageEvent>,
	closed: Arc<AtomicBool>,
}

impl WindowHandle {
	pub fn origin(&self) -> &Origin {
		&self.origin
	}

	/// Queue a fully formed event for the target window.  Returns false when
	/// the target-origin restriction fails or the window is gone.
	pub fn deliver(&self, event: MessageEvent, target_origin: &Origin) -> bool {
		if self.origin != *target_origin {
			tracing::warn!(
				window = %self.origin,
				restricted_to = %target_origin,
				"dropping message restricted to another origin"
			);
			return false;
		}
		if self.closed.load(Ordering::SeqCst) || self.sender.send(event).is_err() {
			tracing::warn!(window = %self.origin, "dropping message for a closed window");
			return false;
		}
		true
	}

	/// Post a message from `source`, stamping the event with the sender's
	/// origin and a reply handle.
	pub fn post_message(&self, data: BridgeMessage, target_origin: &Origin, source: &Window) -> bool {
		let event = MessageEvent {
			data,
			origin: source.origin().clone(),
			source: Some(source.handle()),
		};
		self.deliver(event, target_origin)
	}
}

impl std::fmt::Debug for WindowHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WindowHandle").field("origin", &self.origin).finish()
	}
}

// -- Windows --

/// A listener is invoked once per delivered event.  Listeners for one event
/// run in registration order; slow listeners do not hold up later events.
pub type Listener = Arc<dyn Fn(MessageEvent) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An in-process stand-in for a browser window: one inbound message queue
/// drained by a dispatcher task.  Each event is handed to the registered
/// listeners in registration order, but an event's listeners run on their
/// own task, so a listener parked on a slow device operation never blocks
/// the events behind it.  Cloning shares the window; when the last clone
/// drops, the dispatcher stops and later posts fail.
#[derive(Clone)]
pub struct Window {
	inner: Arc<WindowInner>,
}

struct WindowInner {
	origin: Origin,
	sender: mpsc::UnboundedSender<MessageEvent>,
	closed: Arc<AtomicBool>,
	listeners: Mutex<BTreeMap<u64, Listener>>,
	next_listener: AtomicU64,
	pump: Mutex<Option<JoinHandle<()>>>,
}

impl Window {
	pub fn new(origin: Origin) -> Self {
		let (sender, mut receiver) = mpsc::unbounded_channel::<MessageEvent>();
		let inner = Arc::new(WindowInner {
			origin,
			sender,
			closed: Arc::new(AtomicBool::new(false)),
			listeners: Mutex::new(BTreeMap::new()),
			next_listener: AtomicU64::new(0),
			pump: Mutex::new(None),
		});

		let weak = Arc::downgrade(&inner);
		let pump = tokio::spawn(async move {
			while let Some(event) = receiver.recv().await {
				let listeners = match snapshot(&weak) {
					Some(listeners) => listeners,
					None => break,
				};
				tokio::spawn(async move {
					for listener in listeners {
						listener(event.clone()).await;
					}
				});
			}
		});
		*inner.pump.lock().expect("pump slot lock") = Some(pump);

		Window { inner }
	}

	pub fn origin(&self) -> &Origin {
		&self.inner.origin
	}

	/// A handle other windows can post to.
	pub fn handle(&self) -> WindowHandle {
		WindowHandle {
			origin: self.inner.origin.clone(),
			sender: self.inner.sender.clone(),
			closed: Arc::clone(&self.inner.closed),
		}
	}

	pub fn add_message_listener(&self, listener: Listener) -> ListenerId {
		let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
		let mut listeners = self.inner.listeners.lock().expect("listener table lock");
		listeners.insert(id, listener);
		tracing::debug!(window = %self.inner.origin, count = listeners.len(), "message listener added");
		ListenerId(id)
	}

	pub fn remove_message_listener(&self, id: ListenerId) -> bool {
		let mut listeners = self.inner.listeners.lock().expect("listener table lock");
		let removed = listeners.remove(&id.0).is_some();
		if removed {
			tracing::debug!(window = %self.inner.origin, count = listeners.len(), "message listener removed");
		}
		removed
	}

	pub fn listener_count(&self) -> usize {
		self.inner.listeners.lock().expect("listener table lock").len()
	}
}

impl std::fmt::Debug for Window {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Window").field("origin", &self.inner.origin).finish()
	}
}

// The dispatcher holds only a weak reference so a window actually dies when
// its last external clone is dropped.
fn snapshot(weak: &Weak<WindowInner>) -> Option<Vec<Listener>> {
	let inner = weak.upgrade()?;
	let listeners = inner.listeners.lock().expect("listener table lock");
	Some(listeners.values().cloned().collect())
}

impl Drop for WindowInner {
	fn drop(&mut self) {
		self.closed.store(true, Ordering::SeqCst);
		if let Some(pump) = self.pump.lock().expect("pump slot lock").take() {
			pump.abort();
		}
	}
}
