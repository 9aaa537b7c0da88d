//! Request lifecycle states and persisted outcome records.

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Position of a request in the relay state machine.
///
/// `Received → Verifying → {Rejected | Verified} → Executing →
/// {Reverted | Confirmed} → CollectingPayment → {PaymentFailed | Settled}`,
/// with `DeadLettered` for requests that exhausted their retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayStatus {
	Received,
	Verifying,
	Rejected,
	Verified,
	Executing,
	Reverted,
	Confirmed,
	CollectingPayment,
	PaymentFailed,
	Settled,
	DeadLettered,
}

impl RelayStatus {
	/// Terminal states release the queue message, one way or another.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			RelayStatus::Rejected
				| RelayStatus::Settled
				| RelayStatus::PaymentFailed
				| RelayStatus::DeadLettered
		)
	}
}

/// Why a request failed pre-execution validation. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
	InvalidSignature,
	NonceMismatch,
	PaymentBelowMinimum,
	InsufficientAuthorization,
}

impl std::fmt::Display for RejectionReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			RejectionReason::InvalidSignature => "invalid signature",
			RejectionReason::NonceMismatch => "nonce mismatch",
			RejectionReason::PaymentBelowMinimum => "payment below minimum",
			RejectionReason::InsufficientAuthorization => "insufficient authorization",
		};
		write!(f, "{}", name)
	}
}

/// Failure classification across the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
	InvalidSignature,
	NonceMismatch,
	PaymentBelowMinimum,
	InsufficientAuthorization,
	ExecutionReverted,
	ExecutionTimeout,
	PaymentCollectionFailed,
	CustodianUnavailable,
}

impl From<RejectionReason> for ErrorKind {
	fn from(reason: RejectionReason) -> Self {
		match reason {
			RejectionReason::InvalidSignature => ErrorKind::InvalidSignature,
			RejectionReason::NonceMismatch => ErrorKind::NonceMismatch,
			RejectionReason::PaymentBelowMinimum => ErrorKind::PaymentBelowMinimum,
			RejectionReason::InsufficientAuthorization => ErrorKind::InsufficientAuthorization,
		}
	}
}

/// Persisted progress record for one relayed request.
///
/// Survives redelivery: the attempt counter resumes rather than resets when
/// the same request is delivered again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayOutcome {
	pub request_id: String,
	pub from: Address,
	pub status: RelayStatus,
	/// Transaction hash of the confirmed forward execution.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub onchain_reference: Option<B256>,
	/// Transaction hash of the confirmed payment collection.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_reference: Option<B256>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Execution attempts consumed so far.
	pub attempts: u32,
	/// Unix timestamp of the last transition.
	pub updated_at: i64,
}

/// Operational follow-up record for a payment that could not be collected
/// after the underlying transfer executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRecord {
	pub request_id: String,
	pub from: Address,
	#[serde(with = "crate::serde_helpers::u256_decimal")]
	pub payment: U256,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub onchain_reference: Option<B256>,
	pub error: String,
	pub created_at: i64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn terminal_states() {
		for status in [
			RelayStatus::Rejected,
			RelayStatus::Settled,
			RelayStatus::PaymentFailed,
			RelayStatus::DeadLettered,
		] {
			assert!(status.is_terminal());
		}
		for status in [
			RelayStatus::Received,
			RelayStatus::Verifying,
			RelayStatus::Verified,
			RelayStatus::Executing,
			RelayStatus::Reverted,
			RelayStatus::Confirmed,
			RelayStatus::CollectingPayment,
		] {
			assert!(!status.is_terminal());
		}
	}
}
