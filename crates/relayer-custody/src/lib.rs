//! Key custody for the relay service.
//!
//! The relay's own submissions are signed by a custodian behind an opaque
//! interface: the engine hands over a fully-formed transaction and receives
//! serialized bytes plus the transaction hash. Key material never crosses the
//! interface, so the local in-process signer can be swapped for a remote
//! signing service without touching the engine.

use alloy::primitives::Address;
use async_trait::async_trait;
use relayer_types::{ConfigSchema, RelayTransaction, SignedTransaction};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum CustodyError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// The custodian could not be reached. Callers treat this as transient
	/// and retry without consuming the request's attempt budget.
	#[error("Custodian unavailable: {0}")]
	Unavailable(String),
	#[error("Provider error: {0}")]
	Provider(String),
}

#[async_trait]
pub trait CustodyInterface: Send + Sync {
	/// Returns the configuration schema for this custodian implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// The relay account address whose key this custodian holds.
	async fn address(&self) -> Result<Address, CustodyError>;

	/// Signs a relay transaction, returning the serialized signed form and
	/// its hash.
	async fn sign_transaction(
		&self,
		tx: &RelayTransaction,
	) -> Result<SignedTransaction, CustodyError>;
}

pub struct CustodyService {
	custodian: Box<dyn CustodyInterface>,
}

impl CustodyService {
	pub fn new(custodian: Box<dyn CustodyInterface>) -> Self {
		Self { custodian }
	}

	pub async fn address(&self) -> Result<Address, CustodyError> {
		self.custodian.address().await
	}

	pub async fn sign(&self, tx: &RelayTransaction) -> Result<SignedTransaction, CustodyError> {
		self.custodian.sign_transaction(tx).await
	}
}
