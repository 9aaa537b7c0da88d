//! Execution adapter for the relay service.
//!
//! Boundary between the orchestrator and the ledger. The adapter submits
//! forwarder executions and payment collections, waits out confirmation
//! windows, and serves the reads the orchestrator verifies against: the
//! forwarder nonce registry, the payment token allowance, and current fee
//! conditions. Signing goes through the key custodian; the adapter never
//! touches key material.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use relayer_custody::{CustodyError, CustodyService};
use relayer_types::{ExecutionParams, SignedRequest};
use std::sync::Arc;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod evm;
}

#[derive(Debug, Error)]
pub enum ExecutionError {
	/// Transport or node failure reaching the ledger.
	#[error("Network error: {0}")]
	Network(String),
	/// The custodian refused or failed to sign.
	#[error(transparent)]
	Custodian(#[from] CustodyError),
	/// Calldata or response bytes did not match the contract ABI.
	#[error("Encoding error: {0}")]
	Encoding(String),
}

/// Reference to a submitted, not yet resolved, transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionHandle {
	pub tx_hash: B256,
}

/// Proof of a confirmed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReceipt {
	pub tx_hash: B256,
	pub block_number: u64,
}

/// How a submitted transaction resolved.
///
/// `TimedOut` is deliberately distinct from `Reverted`: a timed-out
/// submission may still land later, so callers re-check ledger state before
/// treating it as not-executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
	Confirmed(ExecutionReceipt),
	Reverted { reason: String },
	TimedOut,
}

/// Trait defining the interface to the execution ledger.
#[async_trait]
pub trait ExecutionInterface: Send + Sync {
	/// Submits the forward execution for a verified request.
	async fn submit(
		&self,
		request: &SignedRequest,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError>;

	/// Submits the payment collection for a confirmed execution.
	async fn submit_payment(
		&self,
		from: Address,
		amount: U256,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError>;

	/// Waits until the transaction confirms, reverts, or the confirmation
	/// window elapses.
	async fn wait_for_outcome(
		&self,
		handle: &ExecutionHandle,
	) -> Result<ExecutionOutcome, ExecutionError>;

	/// Current forwarder nonce for an authorizing identity.
	async fn forwarder_nonce(&self, from: Address) -> Result<U256, ExecutionError>;

	/// Payment token allowance the identity has granted the forwarder.
	async fn payment_allowance(&self, owner: Address) -> Result<U256, ExecutionError>;

	/// Fee parameters for a fresh submission attempt.
	async fn fee_estimate(&self) -> Result<ExecutionParams, ExecutionError>;
}

/// Chain-level wiring shared by execution implementations, derived from the
/// top-level configuration rather than the implementation's own table.
#[derive(Clone)]
pub struct ExecutionContext {
	pub chain_id: u64,
	/// The forwarder contract; also the EIP-712 verifying contract.
	pub forwarder: Address,
	pub payment_token: Address,
	pub custody: Arc<CustodyService>,
}

/// High-level execution service wrapping a ledger implementation.
pub struct ExecutionService {
	adapter: Box<dyn ExecutionInterface>,
}

impl ExecutionService {
	pub fn new(adapter: Box<dyn ExecutionInterface>) -> Self {
		Self { adapter }
	}

	pub async fn submit(
		&self,
		request: &SignedRequest,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		self.adapter.submit(request, params).await
	}

	pub async fn submit_payment(
		&self,
		from: Address,
		amount: U256,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		self.adapter.submit_payment(from, amount, params).await
	}

	pub async fn wait_for_outcome(
		&self,
		handle: &ExecutionHandle,
	) -> Result<ExecutionOutcome, ExecutionError> {
		self.adapter.wait_for_outcome(handle).await
	}

	pub async fn forwarder_nonce(&self, from: Address) -> Result<U256, ExecutionError> {
		self.adapter.forwarder_nonce(from).await
	}

	pub async fn payment_allowance(&self, owner: Address) -> Result<U256, ExecutionError> {
		self.adapter.payment_allowance(owner).await
	}

	pub async fn fee_estimate(&self) -> Result<ExecutionParams, ExecutionError> {
		self.adapter.fee_estimate().await
	}
}
