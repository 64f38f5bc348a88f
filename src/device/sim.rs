use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};

use super::{DeviceError, DeviceInfo, DeviceSession, HardwareTransport};

// -- Simulator --

/// Deterministic in-process double for the vendor device stack.
///
/// Addresses and signatures are derived by hashing the inputs, so tests can
/// predict them without fixtures, and every open and close is counted so
/// session discipline is observable from the outside.
#[derive(Clone)]
pub struct SimulatedLedger {
	state: Arc<Mutex<SimState>>,
}

struct SimState {
	devices: usize,
	grant_on_prompt: bool,
	op_delay: Duration,
	op_count: usize,
	scheduled_failure: Option<(usize, DeviceError)>,
	open_count: usize,
	close_count: usize,
	queried_paths: Vec<String>,
	signed: Vec<(String, Vec<u8>)>,
}

impl SimulatedLedger {
	pub fn new(devices: usize) -> Self {
		SimulatedLedger {
			state: Arc::new(Mutex::new(SimState {
				devices,
				grant_on_prompt: false,
				op_delay: Duration::ZERO,
				op_count: 0,
				scheduled_failure: None,
				open_count: 0,
				close_count: 0,
				queried_paths: Vec::new(),
				signed: Vec::new(),
			})),
		}
	}

	/// A simulator with no authorized device that will authorize one when
	/// the pairing prompt is raised.
	pub fn unauthorized() -> Self {
		let sim = SimulatedLedger::new(0);
		sim.lock().grant_on_prompt = true;
		sim
	}

	/// Delay applied to every device operation.  Long enough delays keep an
	/// operation observably in flight while a test sends a second command.
	pub fn with_op_delay(self, delay: Duration) -> Self {
		self.lock().op_delay = delay;
		self
	}

	pub fn set_grant_on_prompt(&self, grant: bool) {
		self.lock().grant_on_prompt = grant;
	}

	/// Change the per-operation delay.  Takes effect from the next
	/// operation, sessions already open included.
	pub fn set_op_delay(&self, delay: Duration) {
		self.lock().op_delay = delay;
	}

	/// Make the `nth` device operation (zero-based, counting all address
	/// and signing calls so far) fail with `error`.
	pub fn fail_on_op(&self, nth: usize, error: DeviceError) {
		self.lock().scheduled_failure = Some((nth, error));
	}

	/// Make the next device operation fail with `error`.
	pub fn fail_next(&self, error: DeviceError) {
		let mut state = self.lock();
		let next = state.op_count;
		state.scheduled_failure = Some((next, error));
	}

	// -- Counters --

	pub fn device_count(&self) -> usize {
		self.lock().devices
	}

	pub fn open_count(&self) -> usize {
		self.lock().open_count
	}

	pub fn close_count(&self) -> usize {
		self.lock().close_count
	}

	pub fn queried_paths(&self) -> Vec<String> {
		self.lock().queried_paths.clone()
	}

	pub fn signed_requests(&self) -> Vec<(String, Vec<u8>)> {
		self.lock().signed.clone()
	}

	// -- Derivations --

	/// The address the simulator reports for a derivation path (32 bytes).
	pub fn address_for(path: &str) -> Vec<u8> {
		let mut hasher = Sha256::new();
		hasher.update(b"sim-address");
		hasher.update(path.as_bytes());
		hasher.finalize().to_vec()
	}

	/// The signature the simulator produces (64 bytes, split across two
	/// domain-separated hashes).
	pub fn signature_for(path: &str, raw_tx: &[u8]) -> Vec<u8> {
		let mut out = Vec::with_capacity(64);
		for half in [b"sim-signature-0".as_slice(), b"sim-signature-1".as_slice()] {
			let mut hasher = Sha256::new();
			hasher.update(half);
			hasher.update(path.as_bytes());
			hasher.update(raw_tx);
			out.extend_from_slice(&hasher.finalize());
		}
		out
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
		self.state.lock().expect("simulator state lock")
	}

	fn take_scheduled_failure(&self) -> Option<DeviceError> {
		let mut state = self.lock();
		let current = state.op_count;
		state.op_count += 1;
		match state.scheduled_failure.as_ref() {
			Some((nth, _)) if *nth == current => state.scheduled_failure.take().map(|(_, e)| e),
			_ => None,
		}
	}
}

#[async_trait::async_trait]
impl HardwareTransport for SimulatedLedger {
	async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
		let state = self.lock();
		Ok((0..state.devices)
			.map(|i| DeviceInfo { product_name: format!("simulated-ledger-{i}") })
			.collect())
	}

	async fn open(&self) -> Result<Box<dyn DeviceSession>, DeviceError> {
		let mut state = self.lock();
		if state.devices == 0 {
			if !state.grant_on_prompt {
				return Err(DeviceError::Unauthorized);
			}
			state.devices = 1;
		}
		state.open_count += 1;
		drop(state);
		Ok(Box::new(SimSession { ledger: self.clone(), closed: false }))
	}
}

struct SimSession {
	ledger: SimulatedLedger,
	closed: bool,
}

impl SimSession {
	async fn run_op(&mut self) -> Result<(), DeviceError> {
		if self.closed {
			return Err(DeviceError::Unknown("session already closed".into()));
		}
		let delay = self.ledger.lock().op_delay;
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		if let Some(error) = self.ledger.take_scheduled_failure() {
			return Err(error);
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl DeviceSession for SimSession {
	async fn get_address(&mut self, path: &str) -> Result<Vec<u8>, DeviceError> {
		self.run_op().await?;
		self.ledger.lock().queried_paths.push(path.to_string());
		Ok(SimulatedLedger::address_for(path))
	}

	async fn sign_transaction(&mut self, path: &str, raw_tx: &[u8]) -> Result<Vec<u8>, DeviceError> {
		self.run_op().await?;
		self.ledger.lock().signed.push((path.to_string(), raw_tx.to_vec()));
		Ok(SimulatedLedger::signature_for(path, raw_tx))
	}

	async fn close(&mut self) -> Result<(), DeviceError> {
		self.closed = true;
		self.ledger.lock().close_count += 1;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn addresses_are_deterministic_per_path() {
		let sim = SimulatedLedger::new(1);
		let mut session = sim.open().await.unwrap();
		let a = session.get_address("44'/501'/0'/0'").await.unwrap();
		let b = session.get_address("44'/501'/0'/0'").await.unwrap();
		let c = session.get_address("44'/501'/1'/0'").await.unwrap();
		session.close().await.unwrap();
		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(a.len(), 32);
		assert_eq!(a, SimulatedLedger::address_for("44'/501'/0'/0'"));
	}

	#[tokio::test]
	async fn signatures_depend_on_path_and_payload() {
		let sim = SimulatedLedger::new(1);
		let mut session = sim.open().await.unwrap();
		let a = session.sign_transaction("44'/501'/0'/0'", &[1, 2, 3]).await.unwrap();
		let b = session.sign_transaction("44'/501'/0'/0'", &[1, 2, 4]).await.unwrap();
		session.close().await.unwrap();
		assert_eq!(a.len(), 64);
		assert_ne!(a, b);
		assert_eq!(sim.signed_requests(), vec![
			("44'/501'/0'/0'".to_string(), vec![1, 2, 3]),
			("44'/501'/0'/0'".to_string(), vec![1, 2, 4]),
		]);
	}

	#[tokio::test]
	async fn prompt_grants_a_device_when_configured() {
		let sim = SimulatedLedger::unauthorized();
		assert!(sim.enumerate().await.unwrap().is_empty());
		let mut session = sim.open().await.unwrap();
		session.close().await.unwrap();
		assert_eq!(sim.device_count(), 1);
		assert_eq!(sim.enumerate().await.unwrap().len(), 1);
		assert_eq!((sim.open_count(), sim.close_count()), (1, 1));
	}

	#[tokio::test]
	async fn open_fails_without_grant() {
		let sim = SimulatedLedger::new(0);
		assert!(matches!(sim.open().await, Err(DeviceError::Unauthorized)));
	}

	#[tokio::test]
	async fn scheduled_failure_fires_once() {
		let sim = SimulatedLedger::new(1);
		sim.fail_next(DeviceError::UserRejected);
		let mut session = sim.open().await.unwrap();
		assert!(matches!(
			session.sign_transaction("p", &[0]).await,
			Err(DeviceError::UserRejected)
		));
		assert!(session.sign_transaction("p", &[0]).await.is_ok());
		session.close().await.unwrap();
	}

	#[tokio::test]
	async fn nth_op_failure_targets_later_calls() {
		let sim = SimulatedLedger::new(1);
		sim.fail_on_op(1, DeviceError::DeviceUnavailable);
		let mut session = sim.open().await.unwrap();
		assert!(session.get_address("a").await.is_ok());
		assert!(matches!(session.get_address("b").await, Err(DeviceError::DeviceUnavailable)));
		session.close().await.unwrap();
	}

	#[tokio::test]
	async fn op_delay_changes_reach_open_sessions() {
		let sim = SimulatedLedger::new(1).with_op_delay(Duration::from_millis(300));
		let worker = sim.clone();
		let mut session = worker.open().await.unwrap();

		let slow = tokio::time::timeout(Duration::from_millis(100), session.get_address("a")).await;
		assert!(slow.is_err());

		// The delay lives in the shared state, so changing it on any clone
		// affects sessions that are already open.
		sim.set_op_delay(Duration::ZERO);
		let fast = tokio::time::timeout(Duration::from_millis(100), session.get_address("b")).await;
		assert!(fast.expect("prompt answer").is_ok());
		session.close().await.unwrap();
	}

	#[tokio::test]
	async fn ops_after_close_fail() {
		let sim = SimulatedLedger::new(1);
		let mut session = sim.open().await.unwrap();
		session.close().await.unwrap();
		assert!(session.get_address("a").await.is_err());
	}
}
