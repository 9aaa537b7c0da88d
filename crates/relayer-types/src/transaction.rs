//! Ledger transaction payloads exchanged between the execution adapter and
//! the key custodian.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Fee parameters for one submission attempt. Refreshed between retries so a
/// timed-out attempt is resubmitted at current market rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
}

/// Fully specified unsigned transaction handed to the custodian. The adapter
/// fills every field; custodians sign complete payloads and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayTransaction {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	pub gas_limit: u64,
	pub nonce: u64,
	pub chain_id: u64,
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
}

/// Custodian-signed transaction ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
	/// EIP-2718 encoded envelope.
	pub raw: Bytes,
	/// Hash of the signed transaction.
	pub hash: B256,
}
