use std::sync::Arc;
use std::time::Duration;

use crate::device::{DeviceError, DeviceSession, HardwareTransport};
use crate::messages::{
	BridgeCommand, BridgeMessage, BridgeResponse, CommandKind, ErrorPayload, GetAccountCommand,
	SignTransactionCommand, UnlockCommand,
};
use crate::window::{OriginError, Window, WindowHandle};

use super::{CommandHandler, MessagingTransport};

// The frame only ever posts one-way, so its transport deadline is never
// exercised.
const FRAME_DEADLINE: Duration = Duration::from_secs(60);

/// Frame-side endpoint of the bridge channel.
///
/// Lives in the isolated context next to the device libraries and answers
/// the parent's device commands.  Each command runs against a fresh device
/// session that is closed in every exit path; no session outlives the
/// command that opened it.
#[derive(Clone)]
pub struct UntrustedTransport {
	transport: MessagingTransport,
	device: Arc<dyn HardwareTransport>,
}

impl UntrustedTransport {
	pub fn new(
		window: Window,
		parent: WindowHandle,
		target_url: &str,
		device: Arc<dyn HardwareTransport>,
	) -> Result<Self, OriginError> {
		let transport = MessagingTransport::new(window, parent, target_url, FRAME_DEADLINE)?;

		let unlock: CommandHandler = {
			let device = Arc::clone(&device);
			Arc::new(move |message| {
				let device = Arc::clone(&device);
				Box::pin(async move {
					match message {
						BridgeMessage::Command(BridgeCommand::Unlock(cmd)) => {
							Some(handle_unlock(device, cmd).await.into())
						}
						_ => None,
					}
				})
			})
		};
		transport.add_command_handler(CommandKind::Unlock, unlock);

		let get_account: CommandHandler = {
			let device = Arc::clone(&device);
			Arc::new(move |message| {
				let device = Arc::clone(&device);
				Box::pin(async move {
					match message {
						BridgeMessage::Command(BridgeCommand::GetAccount(cmd)) => {
							Some(handle_get_account(device, cmd).await.into())
						}
						_ => None,
					}
				})
			})
		};
		transport.add_command_handler(CommandKind::GetAccount, get_account);

		let sign: CommandHandler = {
			let device = Arc::clone(&device);
			Arc::new(move |message| {
				let device = Arc::clone(&device);
				Box::pin(async move {
					match message {
						BridgeMessage::Command(BridgeCommand::SignTransaction(cmd)) => {
							Some(handle_sign_transaction(device, cmd).await.into())
						}
						_ => None,
					}
				})
			})
		};
		transport.add_command_handler(CommandKind::SignTransaction, sign);

		Ok(UntrustedTransport { transport, device })
	}

	/// Raise the platform pairing prompt when no device is authorized yet.
	/// Opening a session is what triggers the prompt; the session is closed
	/// immediately and nothing is read from it.
	pub async fn prompt_authorization(&self) -> Result<(), DeviceError> {
		if self.device.enumerate().await?.is_empty() {
			let mut session = self.device.open().await?;
			close_session(&mut session).await;
		}
		Ok(())
	}

	/// Run the authorize flow end to end: prompt, then notify the parent
	/// context.  The notification is one-way; nothing waits for a reply.
	pub async fn authorize(&self) -> Result<(), DeviceError> {
		self.prompt_authorization().await?;
		let origin = self.transport.window().origin().clone();
		self.transport.post(BridgeCommand::authorization_success(origin));
		Ok(())
	}

	/// Tell the parent context that a device command cannot proceed until
	/// the user walks through authorization.
	pub fn notify_authorization_required(&self) -> bool {
		let origin = self.transport.window().origin().clone();
		self.transport.post(BridgeCommand::authorization_required(origin))
	}
}

impl std::fmt::Debug for UntrustedTransport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UntrustedTransport")
			.field("window", self.transport.window().origin())
			.finish()
	}
}

// -- Command handlers --

// Unlock only enumerates; it must never open a session or prompt.
async fn handle_unlock(device: Arc<dyn HardwareTransport>, cmd: UnlockCommand) -> BridgeResponse {
	match device.enumerate().await {
		Ok(devices) if devices.is_empty() => {
			BridgeResponse::unlock_err(&cmd, ErrorPayload::unauthorized())
		}
		Ok(_) => BridgeResponse::unlock_ok(&cmd),
		Err(error) => BridgeResponse::unlock_err(&cmd, error.to_payload()),
	}
}

async fn handle_get_account(
	device: Arc<dyn HardwareTransport>,
	cmd: GetAccountCommand,
) -> BridgeResponse {
	let mut session = match device.open().await {
		Ok(session) => session,
		Err(error) => return BridgeResponse::account_err(&cmd, error.to_payload()),
	};
	let result = session.get_address(&cmd.path).await;
	close_session(&mut session).await;
	match result {
		Ok(address) => BridgeResponse::account_ok(&cmd, address),
		Err(error) => BridgeResponse::account_err(&cmd, error.to_payload()),
	}
}

async fn handle_sign_transaction(
	device: Arc<dyn HardwareTransport>,
	cmd: SignTransactionCommand,
) -> BridgeResponse {
	let mut session = match device.open().await {
		Ok(session) => session,
		Err(error) => return BridgeResponse::signature_err(&cmd, error.to_payload()),
	};
	let result = session.sign_transaction(&cmd.path, &cmd.raw_tx_bytes).await;
	close_session(&mut session).await;
	match result {
		Ok(signature) => BridgeResponse::signature_ok(&cmd, signature),
		Err(error) => BridgeResponse::signature_err(&cmd, error.to_payload()),
	}
}

// Close failures must not mask the operation's own result.
async fn close_session(session: &mut Box<dyn DeviceSession>) {
	if let Err(error) = session.close().await {
		tracing::warn!(%error, "device session close failed");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::device::sim::SimulatedLedger;
	use crate::messages::ResponsePayload;
	use crate::window::Origin;
	use std::sync::atomic::{AtomicUsize, Ordering};

	const WALLET_URL: &str = "chrome://wallet";
	const FRAME_URL: &str = "chrome-untrusted://ledger-bridge";

	fn origin(s: &str) -> Origin {
		Origin::parse(s).unwrap()
	}

	fn rig(sim: &SimulatedLedger) -> (MessagingTransport, UntrustedTransport, Window) {
		let wallet = Window::new(origin(WALLET_URL));
		let frame = Window::new(origin(FRAME_URL));
		let on_wallet = MessagingTransport::new(
			wallet.clone(),
			frame.handle(),
			FRAME_URL,
			Duration::from_secs(5),
		)
		.unwrap();
		let untrusted =
			UntrustedTransport::new(frame, wallet.handle(), WALLET_URL, Arc::new(sim.clone()))
				.unwrap();
		(on_wallet, untrusted, wallet)
	}

	fn unlock_failure(response: BridgeResponse) -> ErrorPayload {
		match response {
			BridgeResponse::Unlock(r) => match r.payload {
				ResponsePayload::Failure(error) => error,
				other => panic!("expected failure, got {other:?}"),
			},
			other => panic!("unexpected response {other:?}"),
		}
	}

	#[tokio::test]
	async fn unlock_without_devices_is_unauthorized_and_opens_nothing() {
		let sim = SimulatedLedger::new(0);
		let (on_wallet, _untrusted, wallet) = rig(&sim);

		let response = on_wallet
			.send_command(BridgeCommand::unlock(wallet.origin().clone()))
			.await
			.unwrap();
		let error = unlock_failure(response);
		assert_eq!(error.id.as_deref(), Some("unauthorized"));
		assert_eq!(DeviceError::from_payload(&error), DeviceError::Unauthorized);
		assert_eq!(sim.open_count(), 0);
	}

	#[tokio::test]
	async fn unlock_succeeds_when_a_device_is_present() {
		let sim = SimulatedLedger::new(1);
		let (on_wallet, _untrusted, wallet) = rig(&sim);

		let response = on_wallet
			.send_command(BridgeCommand::unlock(wallet.origin().clone()))
			.await
			.unwrap();
		assert!(matches!(response, BridgeResponse::Unlock(r) if r.payload.is_success()));
		assert_eq!(sim.open_count(), 0);
	}

	#[tokio::test]
	async fn get_account_opens_and_closes_exactly_once() {
		let sim = SimulatedLedger::new(1);
		let (on_wallet, _untrusted, wallet) = rig(&sim);
		let path = "44'/501'/3'/0'";

		let response = on_wallet
			.send_command(BridgeCommand::get_account(wallet.origin().clone(), path))
			.await
			.unwrap();
		let address = match response {
			BridgeResponse::GetAccount(r) => r.payload.into_result().unwrap().address,
			other => panic!("unexpected response {other:?}"),
		};
		assert_eq!(address, SimulatedLedger::address_for(path));
		assert_eq!((sim.open_count(), sim.close_count()), (1, 1));
	}

	#[tokio::test]
	async fn get_account_failure_still_closes_the_session() {
		let sim = SimulatedLedger::new(1);
		sim.fail_next(DeviceError::UserRejected);
		let (on_wallet, _untrusted, wallet) = rig(&sim);

		let response = on_wallet
			.send_command(BridgeCommand::get_account(wallet.origin().clone(), "44'/501'/0'/0'"))
			.await
			.unwrap();
		let error = match response {
			BridgeResponse::GetAccount(r) => r.payload.into_result().unwrap_err(),
			other => panic!("unexpected response {other:?}"),
		};
		assert_eq!(DeviceError::from_payload(&error), DeviceError::UserRejected);
		assert_eq!((sim.open_count(), sim.close_count()), (1, 1));
	}

	#[tokio::test]
	async fn sign_relays_path_and_bytes_unchanged() {
		let sim = SimulatedLedger::new(1);
		let (on_wallet, _untrusted, wallet) = rig(&sim);
		let path = "44'/501'/0'/0'";
		let raw_tx = vec![0xde, 0xad, 0xbe, 0xef];

		let response = on_wallet
			.send_command(BridgeCommand::sign_transaction(
				wallet.origin().clone(),
				path,
				raw_tx.clone(),
			))
			.await
			.unwrap();
		let signature = match response {
			BridgeResponse::SignTransaction(r) => r.payload.into_result().unwrap().signature,
			other => panic!("unexpected response {other:?}"),
		};
		assert_eq!(signature, SimulatedLedger::signature_for(path, &raw_tx));
		assert_eq!(sim.signed_requests(), vec![(path.to_string(), raw_tx)]);
		assert_eq!((sim.open_count(), sim.close_count()), (1, 1));
	}

	#[tokio::test]
	async fn prompt_authorization_opens_only_when_unauthorized() {
		let sim = SimulatedLedger::unauthorized();
		let (_on_wallet, untrusted, _wallet) = rig(&sim);

		untrusted.prompt_authorization().await.unwrap();
		assert_eq!((sim.open_count(), sim.close_count()), (1, 1));
		assert_eq!(sim.device_count(), 1);

		untrusted.prompt_authorization().await.unwrap();
		assert_eq!((sim.open_count(), sim.close_count()), (1, 1));
	}

	#[tokio::test]
	async fn authorize_notifies_the_parent_context() {
		let sim = SimulatedLedger::unauthorized();
		let (on_wallet, untrusted, _wallet) = rig(&sim);
		let hits = Arc::new(AtomicUsize::new(0));
		let counting: CommandHandler = {
			let hits = Arc::clone(&hits);
			Arc::new(move |message| {
				let hits = Arc::clone(&hits);
				Box::pin(async move {
					if let BridgeMessage::Command(BridgeCommand::AuthorizationSuccess(_)) = message {
						hits.fetch_add(1, Ordering::SeqCst);
					}
					None
				})
			})
		};
		on_wallet.add_command_handler(CommandKind::AuthorizationSuccess, counting);

		untrusted.authorize().await.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(hits.load(Ordering::SeqCst), 1);
		// Request-shaped notification: the parent's handler is not consumed.
		assert_eq!(on_wallet.handler_count(), 1);
	}

	#[tokio::test]
	async fn authorization_required_is_dropped_when_nobody_listens() {
		let sim = SimulatedLedger::new(0);
		let (on_wallet, untrusted, _wallet) = rig(&sim);

		assert!(untrusted.notify_authorization_required());
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(on_wallet.handler_count(), 0);
	}
}
