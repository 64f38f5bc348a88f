use std::sync::Arc;
use std::time::Duration;

use crate::messages::{BridgeCommand, BridgeMessage, BridgeResponse, CommandKind, TransportError};
use crate::window::{OriginError, Window, WindowHandle};

use super::{CommandHandler, MessagingTransport};

/// Callback run when the frame reports a completed device authorization.
/// The argument is whether the wallet should be showing its authorize-device
/// prompt; success always clears it.
pub type AuthorizationListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Wallet-side endpoint of the bridge channel.
///
/// Lives in the trusted context and sends device commands to the isolated
/// frame.  A long-lived handler for the frame's authorization-success
/// notification is installed at construction, which also keeps the shared
/// window listener attached for the life of the transport.
#[derive(Clone)]
pub struct TrustedTransport {
	transport: MessagingTransport,
}

impl TrustedTransport {
	pub fn new(
		window: Window,
		target: WindowHandle,
		target_url: &str,
		deadline: Duration,
		on_authorized: Option<AuthorizationListener>,
	) -> Result<Self, OriginError> {
		let transport = MessagingTransport::new(window, target, target_url, deadline)?;
		let handler: CommandHandler = Arc::new(move |message| {
			let on_authorized = on_authorized.clone();
			Box::pin(async move {
				if let BridgeMessage::Command(BridgeCommand::AuthorizationSuccess(_)) = message {
					tracing::debug!("frame reported device authorization");
					if let Some(listener) = on_authorized {
						listener(false);
					}
				}
				None
			})
		});
		transport.add_command_handler(CommandKind::AuthorizationSuccess, handler);
		Ok(TrustedTransport { transport })
	}

	pub async fn send_command(&self, command: BridgeCommand) -> Result<BridgeResponse, TransportError> {
		self.transport.send_command(command).await
	}

	/// Tear down: in-flight requests resolve as `BridgeNotReady` and the
	/// window listener is detached.
	pub fn close(&self) {
		self.transport.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::window::Origin;
	use std::sync::Mutex;

	const WALLET_URL: &str = "chrome://wallet";
	const FRAME_URL: &str = "chrome-untrusted://ledger-bridge";

	fn origin(s: &str) -> Origin {
		Origin::parse(s).unwrap()
	}

	#[tokio::test]
	async fn authorization_success_clears_the_prompt() {
		let wallet = Window::new(origin(WALLET_URL));
		let frame = Window::new(origin(FRAME_URL));
		let prompt: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
		let listener: AuthorizationListener = {
			let prompt = Arc::clone(&prompt);
			Arc::new(move |show| {
				*prompt.lock().unwrap() = Some(show);
			})
		};
		let trusted = TrustedTransport::new(
			wallet.clone(),
			frame.handle(),
			FRAME_URL,
			Duration::from_secs(5),
			Some(listener),
		)
		.unwrap();

		let on_frame = MessagingTransport::new(
			frame.clone(),
			wallet.handle(),
			WALLET_URL,
			Duration::from_secs(5),
		)
		.unwrap();
		assert!(on_frame.post(BridgeCommand::authorization_success(frame.origin().clone())));
		tokio::time::sleep(Duration::from_millis(20)).await;

		assert_eq!(*prompt.lock().unwrap(), Some(false));
		// The notification handler is long-lived, not consumed.
		assert_eq!(trusted.transport.handler_count(), 1);
		assert_eq!(wallet.listener_count(), 1);
	}

	#[tokio::test]
	async fn notification_handler_survives_repeated_reports() {
		let wallet = Window::new(origin(WALLET_URL));
		let frame = Window::new(origin(FRAME_URL));
		let trusted = TrustedTransport::new(
			wallet.clone(),
			frame.handle(),
			FRAME_URL,
			Duration::from_secs(5),
			None,
		)
		.unwrap();
		let on_frame = MessagingTransport::new(
			frame.clone(),
			wallet.handle(),
			WALLET_URL,
			Duration::from_secs(5),
		)
		.unwrap();

		for _ in 0..3 {
			assert!(on_frame.post(BridgeCommand::authorization_success(frame.origin().clone())));
		}
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(trusted.transport.handler_count(), 1);
	}
}
