pub mod sol;

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::DeviceError;
use crate::locale::get_locale;
use crate::messages::TransportError;

// -- Identity --

/// Coin families a hardware keyring can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoinType {
	Solana,
}

impl CoinType {
	pub fn as_str(&self) -> &'static str {
		match self {
			CoinType::Solana => "solana",
		}
	}
}

impl std::fmt::Display for CoinType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Hardware vendors the wallet knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareVendor {
	Ledger,
	Trezor,
}

impl HardwareVendor {
	pub fn as_str(&self) -> &'static str {
		match self {
			HardwareVendor::Ledger => "ledger",
			HardwareVendor::Trezor => "trezor",
		}
	}
}

impl std::fmt::Display for HardwareVendor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One account discovered on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareAccount {
	pub address_bytes: Vec<u8>,
	pub derivation_path: String,
	/// Hex digest identifying the physical device the account came from.
	pub device_id: String,
	pub vendor: HardwareVendor,
	pub coin: CoinType,
}

// -- Errors --

/// What a keyring operation can fail with: either the messaging layer gave
/// up before the frame answered, or the device itself refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KeyringError {
	#[error("{message}")]
	Bridge { message: String, code: u8 },
	#[error(transparent)]
	Device(#[from] DeviceError),
}

impl KeyringError {
	/// Wrap a transport failure with its user-facing description.
	pub fn from_transport(error: TransportError) -> Self {
		let key = match error {
			TransportError::BridgeNotReady => "bridgeNotReady",
			TransportError::CommandInProgress => "bridgeCommandInProgress",
			TransportError::Timeout => "bridgeResponseTimeout",
		};
		KeyringError::Bridge { message: get_locale(key).to_string(), code: error.code() }
	}
}

// -- Capability trait --

/// What the wallet needs from one (vendor, coin) hardware keyring.  Every
/// implementation owns its full bridge plumbing behind this surface.
#[async_trait::async_trait]
pub trait HardwareKeyring: Send + Sync {
	fn vendor(&self) -> HardwareVendor;

	fn coin(&self) -> CoinType;

	/// Check that a paired device is reachable.  Never opens a device
	/// session and never prompts.
	async fn unlock(&self) -> Result<(), KeyringError>;

	/// Accounts for derivation indexes `from..=to`.  Queries run against
	/// the device one at a time and the first failure abandons the batch.
	async fn get_accounts(&self, from: i32, to: i32) -> Result<Vec<HardwareAccount>, KeyringError>;

	/// Signature over an already serialized transaction, by the key at
	/// `path`, byte-for-byte as the device produced it.
	async fn sign_transaction(&self, path: &str, raw_tx: &[u8]) -> Result<Vec<u8>, KeyringError>;

	/// Abandon whatever is in flight and tear the bridge down.  The next
	/// command rebuilds it from scratch.
	async fn cancel_operation(&self);
}

// -- Registry --

/// Explicitly constructed registry of keyrings, keyed by vendor and coin.
/// Whoever owns the registry decides what is available; nothing springs
/// into existence behind a global on first use.
#[derive(Default)]
pub struct KeyringRegistry {
	entries: HashMap<(HardwareVendor, CoinType), Arc<dyn HardwareKeyring>>,
}

impl KeyringRegistry {
	pub fn new() -> Self {
		KeyringRegistry::default()
	}

	/// Register a keyring under its own (vendor, coin) identity, returning
	/// whatever it displaced.
	pub fn register(&mut self, keyring: Arc<dyn HardwareKeyring>) -> Option<Arc<dyn HardwareKeyring>> {
		self.entries.insert((keyring.vendor(), keyring.coin()), keyring)
	}

	pub fn get(&self, vendor: HardwareVendor, coin: CoinType) -> Option<Arc<dyn HardwareKeyring>> {
		self.entries.get(&(vendor, coin)).cloned()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
