use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::device::DeviceError;
use crate::host::BridgeHost;
use crate::messages::{BridgeCommand, BridgeResponse, CommandKind, TransportError};
use crate::transport::trusted::{AuthorizationListener, TrustedTransport};
use crate::window::Window;

use super::{CoinType, HardwareAccount, HardwareKeyring, HardwareVendor, KeyringError};

/// Derivation path for a Solana account index (SLIP-44 coin 501).
pub fn derivation_path(index: i32) -> String {
	format!("44'/501'/{index}'/0'")
}

/// Ledger keyring for Solana accounts.
///
/// Talks to its isolated frame over the trusted transport.  The frame is
/// attached lazily on the first command and cached under a random frame id
/// for the life of the keyring; canceling tears the transport and frame
/// down, and the next command starts over from scratch.
pub struct SolanaLedgerKeyring {
	window: Window,
	host: Arc<dyn BridgeHost>,
	bridge_url: String,
	frame_id: String,
	deadline: Duration,
	on_authorized: Option<AuthorizationListener>,
	transport: Mutex<Option<TrustedTransport>>,
}

impl SolanaLedgerKeyring {
	pub fn new(
		window: Window,
		host: Arc<dyn BridgeHost>,
		bridge_url: impl Into<String>,
		deadline: Duration,
		on_authorized: Option<AuthorizationListener>,
	) -> Self {
		SolanaLedgerKeyring {
			window,
			host,
			bridge_url: bridge_url.into(),
			frame_id: new_frame_id(),
			deadline,
			on_authorized,
			transport: Mutex::new(None),
		}
	}

	pub fn frame_id(&self) -> &str {
		&self.frame_id
	}

	/// Attach the frame and build the trusted transport over it, once; a
	/// frame that cannot be attached surfaces as the not-ready error.
	async fn bridge(&self) -> Result<TrustedTransport, KeyringError> {
		let mut slot = self.transport.lock().await;
		if let Some(bridge) = slot.as_ref() {
			return Ok(bridge.clone());
		}
		let frame = self
			.host
			.attach_frame(&self.frame_id, &self.bridge_url, &self.window)
			.await
			.map_err(|error| {
				tracing::warn!(%error, "bridge frame could not be attached");
				KeyringError::from_transport(TransportError::BridgeNotReady)
			})?;
		let bridge = TrustedTransport::new(
			self.window.clone(),
			frame,
			&self.bridge_url,
			self.deadline,
			self.on_authorized.clone(),
		)
		.map_err(|error| {
			tracing::warn!(%error, "bridge url is not a valid origin");
			KeyringError::from_transport(TransportError::BridgeNotReady)
		})?;
		*slot = Some(bridge.clone());
		Ok(bridge)
	}

	async fn send(&self, command: BridgeCommand) -> Result<BridgeResponse, KeyringError> {
		let bridge = self.bridge().await?;
		bridge.send_command(command).await.map_err(KeyringError::from_transport)
	}

	async fn account_from_device(&self, path: &str) -> Result<Vec<u8>, KeyringError> {
		let command = BridgeCommand::get_account(self.window.origin().clone(), path);
		match self.send(command).await? {
			BridgeResponse::GetAccount(response) => response
				.payload
				.into_result()
				.map(|payload| payload.address)
				.map_err(|error| KeyringError::Device(DeviceError::from_payload(&error))),
			other => Err(mismatched_response(CommandKind::GetAccount, other.kind())),
		}
	}
}

#[async_trait::async_trait]
impl HardwareKeyring for SolanaLedgerKeyring {
	fn vendor(&self) -> HardwareVendor {
		HardwareVendor::Ledger
	}

	fn coin(&self) -> CoinType {
		CoinType::Solana
	}

	async fn unlock(&self) -> Result<(), KeyringError> {
		let command = BridgeCommand::unlock(self.window.origin().clone());
		match self.send(command).await? {
			BridgeResponse::Unlock(response) => response
				.payload
				.into_result()
				.map(|_| ())
				.map_err(|error| KeyringError::Device(DeviceError::from_payload(&error))),
			other => Err(mismatched_response(CommandKind::Unlock, other.kind())),
		}
	}

	async fn get_accounts(&self, from: i32, to: i32) -> Result<Vec<HardwareAccount>, KeyringError> {
		self.unlock().await?;

		let from = from.max(0);
		let add_zero_path = from > 0 || to < 0;
		let zero_path = derivation_path(0);
		let mut paths = Vec::new();
		if add_zero_path {
			// The zero index is queried even when the range excludes it:
			// its address is what the device id is derived from.
			paths.push(zero_path.clone());
		}
		for index in from..=to {
			paths.push(derivation_path(index));
		}

		let mut accounts = Vec::new();
		let mut device_id: Option<String> = None;
		for path in paths {
			let address = self.account_from_device(&path).await?;
			if path == zero_path {
				device_id = Some(device_id_from_address(&address));
				if add_zero_path {
					continue;
				}
			}
			let device_id = device_id.clone().expect("zero index is queried before any other");
			accounts.push(HardwareAccount {
				address_bytes: address,
				derivation_path: path,
				device_id,
				vendor: self.vendor(),
				coin: self.coin(),
			});
		}
		Ok(accounts)
	}

	async fn sign_transaction(&self, path: &str, raw_tx: &[u8]) -> Result<Vec<u8>, KeyringError> {
		self.unlock().await?;

		let command =
			BridgeCommand::sign_transaction(self.window.origin().clone(), path, raw_tx.to_vec());
		match self.send(command).await? {
			BridgeResponse::SignTransaction(response) => response
				.payload
				.into_result()
				.map(|payload| payload.signature)
				.map_err(|error| KeyringError::Device(DeviceError::from_payload(&error))),
			other => Err(mismatched_response(CommandKind::SignTransaction, other.kind())),
		}
	}

	async fn cancel_operation(&self) {
		let mut slot = self.transport.lock().await;
		if let Some(bridge) = slot.take() {
			bridge.close();
		}
		drop(slot);
		self.host.remove_frame(&self.frame_id).await;
		tracing::debug!(frame_id = %self.frame_id, "bridge torn down on cancel");
	}
}

// Correlation by kind means a resolver only ever sees its own kind; a
// mismatch here would mean the transport table was corrupted.
fn mismatched_response(expected: CommandKind, got: CommandKind) -> KeyringError {
	tracing::warn!(%expected, %got, "response kind does not match the pending command");
	KeyringError::from_transport(TransportError::BridgeNotReady)
}

/// Stable identifier for the physical device: the hex digest of the
/// address at derivation index zero.
fn device_id_from_address(address: &[u8]) -> String {
	hex::encode(Sha256::digest(address))
}

fn new_frame_id() -> String {
	let mut bytes = [0u8; 16];
	rand::thread_rng().fill_bytes(&mut bytes);
	hex::encode(bytes)
}
