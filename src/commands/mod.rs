pub mod accounts;
pub mod authorize;
pub mod config;
pub mod sign;
pub mod unlock;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cli::Cli;
use crate::config::Config;
use crate::device::sim::SimulatedLedger;
use crate::host::{BridgeHost, InProcessBridgeHost};
use crate::keyring::sol::SolanaLedgerKeyring;
use crate::keyring::{CoinType, HardwareKeyring, HardwareVendor, KeyringRegistry};
use crate::transport::trusted::AuthorizationListener;
use crate::window::{Origin, Window};

/// Everything a command needs to drive the bridge end to end.
pub struct BridgeRig {
	pub sim: SimulatedLedger,
	pub host: Arc<InProcessBridgeHost>,
	pub keyring: Arc<SolanaLedgerKeyring>,
	pub registry: KeyringRegistry,
}

/// Build the wallet window, device simulator, frame host, and keyring
/// registry from CLI flags and config.
pub fn resolve_bridge(
	cli: &Cli,
	config: &Config,
	on_authorized: Option<AuthorizationListener>,
) -> Result<BridgeRig> {
	let devices = cli.devices.unwrap_or(config.simulator.devices);
	let op_delay = cli.op_delay_ms.unwrap_or(config.simulator.op_delay_ms);
	let deadline = cli
		.deadline_ms
		.map(Duration::from_millis)
		.unwrap_or_else(|| config.deadline());

	let sim = SimulatedLedger::new(devices).with_op_delay(Duration::from_millis(op_delay));
	let wallet = Window::new(Origin::parse(&config.bridge.trusted_url)?);
	let host = Arc::new(InProcessBridgeHost::new(
		&config.bridge.trusted_url,
		Arc::new(sim.clone()),
	));
	let keyring = Arc::new(SolanaLedgerKeyring::new(
		wallet,
		Arc::clone(&host) as Arc<dyn BridgeHost>,
		&config.bridge.bridge_url,
		deadline,
		on_authorized,
	));

	let mut registry = KeyringRegistry::new();
	registry.register(keyring.clone());

	Ok(BridgeRig {
		sim,
		host,
		keyring,
		registry,
	})
}

/// Look up the Solana Ledger keyring in the rig's registry.
pub fn solana_keyring(rig: &BridgeRig) -> Result<Arc<dyn HardwareKeyring>> {
	rig.registry
		.get(HardwareVendor::Ledger, CoinType::Solana)
		.ok_or_else(|| anyhow::anyhow!("no Ledger keyring registered for Solana"))
}
