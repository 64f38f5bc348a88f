use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
	name = "ledger-bridge",
	about = "Drive the hardware-wallet bridge against a simulated Ledger.",
	version
)]
pub struct Cli {
	/// Number of simulated devices already authorized.
	#[arg(long, global = true)]
	pub devices: Option<usize>,

	/// Artificial latency per device operation, in milliseconds.
	#[arg(long, global = true)]
	pub op_delay_ms: Option<u64>,

	/// Override the per-command response deadline, in milliseconds.
	#[arg(long, global = true)]
	pub deadline_ms: Option<u64>,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
	/// Check that an authorized device is reachable.
	Unlock,

	/// Discover accounts over a range of derivation indexes.
	Accounts {
		/// First derivation index.
		#[arg(long, default_value = "0")]
		from: i32,

		/// Last derivation index (inclusive).
		#[arg(long, default_value = "4")]
		to: i32,
	},

	/// Sign a serialized transaction with the key at a derivation index.
	Sign {
		/// Transaction bytes as hex.
		tx_hex: String,

		/// Derivation index of the signing key.
		#[arg(long, default_value = "0")]
		index: i32,
	},

	/// Walk the device-authorization flow and report the wallet reaction.
	Authorize,

	/// Manage bridge configuration.
	Config {
		#[command(subcommand)]
		command: ConfigCommand,
	},
}

// -- Config subcommands --

#[derive(Subcommand)]
pub enum ConfigCommand {
	/// Show the active configuration.
	Show,

	/// Write the default configuration file.
	Init,
}
