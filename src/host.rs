use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::device::HardwareTransport;
use crate::transport::untrusted::UntrustedTransport;
use crate::window::{Origin, Window, WindowHandle};

// -- Host seam --

/// Creates and caches the isolated frames a keyring sends its commands to.
///
/// This is the seam between the wallet side and whatever embeds the bridge
/// page: attaching the same frame id twice returns the cached frame, and a
/// handle is only returned once the frame is wired up and able to answer.
#[async_trait::async_trait]
pub trait BridgeHost: Send + Sync {
	/// Create the frame for `frame_id` at `url`, or return the cached one.
	/// `parent` is the window the frame replies to.
	async fn attach_frame(&self, frame_id: &str, url: &str, parent: &Window) -> Result<WindowHandle>;

	/// Handle to an already attached frame.
	async fn frame(&self, frame_id: &str) -> Option<WindowHandle>;

	/// Tear the frame down.  Replies still in flight are lost and later
	/// posts to the frame fail.
	async fn remove_frame(&self, frame_id: &str);
}

// -- In-process host --

/// Host that runs each frame as an in-process window wired to a device
/// transport, standing in for an embedder that loads the real bridge page.
pub struct InProcessBridgeHost {
	trusted_url: String,
	device: Arc<dyn HardwareTransport>,
	frames: Mutex<HashMap<String, FrameRuntime>>,
}

struct FrameRuntime {
	window: Window,
	transport: UntrustedTransport,
}

impl InProcessBridgeHost {
	pub fn new(trusted_url: impl Into<String>, device: Arc<dyn HardwareTransport>) -> Self {
		InProcessBridgeHost {
			trusted_url: trusted_url.into(),
			device,
			frames: Mutex::new(HashMap::new()),
		}
	}

	/// Frame-side transport for an attached frame, for driving the
	/// authorize flow the way the bridge page itself would.
	pub async fn untrusted(&self, frame_id: &str) -> Option<UntrustedTransport> {
		let frames = self.frames.lock().await;
		frames.get(frame_id).map(|runtime| runtime.transport.clone())
	}

	pub async fn frame_count(&self) -> usize {
		self.frames.lock().await.len()
	}
}

#[async_trait::async_trait]
impl BridgeHost for InProcessBridgeHost {
	async fn attach_frame(&self, frame_id: &str, url: &str, parent: &Window) -> Result<WindowHandle> {
		let mut frames = self.frames.lock().await;
		if let Some(runtime) = frames.get(frame_id) {
			return Ok(runtime.window.handle());
		}

		let origin = Origin::parse(url)
			.with_context(|| format!("frame url `{url}` is not a valid origin"))?;
		let window = Window::new(origin);
		// Handlers are registered before the handle is returned, so by the
		// time the caller can post, the frame is ready to answer.
		let transport = UntrustedTransport::new(
			window.clone(),
			parent.handle(),
			&self.trusted_url,
			Arc::clone(&self.device),
		)
		.with_context(|| format!("trusted url `{}` is not a valid origin", self.trusted_url))?;

		let handle = window.handle();
		frames.insert(frame_id.to_string(), FrameRuntime { window, transport });
		tracing::debug!(frame_id, url, "bridge frame attached");
		Ok(handle)
	}

	async fn frame(&self, frame_id: &str) -> Option<WindowHandle> {
		let frames = self.frames.lock().await;
		frames.get(frame_id).map(|runtime| runtime.window.handle())
	}

	async fn remove_frame(&self, frame_id: &str) {
		let mut frames = self.frames.lock().await;
		if frames.remove(frame_id).is_some() {
			tracing::debug!(frame_id, "bridge frame removed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::sim::SimulatedLedger;
	use crate::messages::{BridgeCommand, BridgeMessage};

	const WALLET_URL: &str = "chrome://wallet";
	const FRAME_URL: &str = "chrome-untrusted://ledger-bridge";

	fn host(sim: &SimulatedLedger) -> InProcessBridgeHost {
		InProcessBridgeHost::new(WALLET_URL, Arc::new(sim.clone()))
	}

	#[tokio::test]
	async fn attach_is_idempotent_per_frame_id() {
		let sim = SimulatedLedger::new(1);
		let host = host(&sim);
		let parent = Window::new(Origin::parse(WALLET_URL).unwrap());

		let first = host.attach_frame("frame-a", FRAME_URL, &parent).await.unwrap();
		let second = host.attach_frame("frame-a", FRAME_URL, &parent).await.unwrap();
		assert_eq!(first.origin(), second.origin());
		assert_eq!(host.frame_count().await, 1);

		host.attach_frame("frame-b", FRAME_URL, &parent).await.unwrap();
		assert_eq!(host.frame_count().await, 2);
	}

	#[tokio::test]
	async fn removed_frames_stop_accepting_posts() {
		let sim = SimulatedLedger::new(1);
		let host = host(&sim);
		let parent = Window::new(Origin::parse(WALLET_URL).unwrap());

		let handle = host.attach_frame("frame-a", FRAME_URL, &parent).await.unwrap();
		let frame_origin = handle.origin().clone();
		host.remove_frame("frame-a").await;

		assert!(host.frame("frame-a").await.is_none());
		let data = BridgeMessage::from(BridgeCommand::unlock(parent.origin().clone()));
		assert!(!handle.post_message(data, &frame_origin, &parent));
	}

	#[tokio::test]
	async fn attach_rejects_an_invalid_frame_url() {
		let sim = SimulatedLedger::new(1);
		let host = host(&sim);
		let parent = Window::new(Origin::parse(WALLET_URL).unwrap());

		assert!(host.attach_frame("frame-a", "not a url", &parent).await.is_err());
		assert_eq!(host.frame_count().await, 0);
	}
}
