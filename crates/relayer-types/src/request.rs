//! Wire-level request types and the forwarder contract surface.
//!
//! The `ForwardRequest` field order and the domain constants below are a
//! persisted contract shared with every request signed so far; changing
//! either breaks signature compatibility.

use alloy::primitives::{Bytes, U256};
use alloy::sol;
use serde::{Deserialize, Serialize};

/// EIP-712 domain name of the forwarder contract.
pub const FORWARDER_DOMAIN_NAME: &str = "TokenPaymentForwarder";

/// EIP-712 domain version of the forwarder contract.
pub const FORWARDER_DOMAIN_VERSION: &str = "0.0.1";

sol! {
	/// Typed transfer request relayed on behalf of `from`.
	#[derive(Debug, serde::Serialize, serde::Deserialize)]
	struct ForwardRequest {
		address from;
		address to;
		uint256 value;
		uint256 gas;
		uint256 nonce;
		bytes data;
	}

	/// Payment terms signed separately from the forward request, bound to the
	/// same nonce so a stale authorization cannot be replayed.
	#[derive(Debug, serde::Serialize, serde::Deserialize)]
	struct PaymentAuthorization {
		address from;
		uint256 payment;
		uint256 nonce;
	}

	/// Forwarder contract surface driven by the relay.
	interface IPaymentForwarder {
		function getNonce(address from) external view returns (uint256);
		function execute(ForwardRequest calldata req, bytes calldata signature)
			external
			payable
			returns (bool success, bytes memory returndata);
		function collectPayment(address from, uint256 amount) external;
	}

	/// Minimal ERC-20 surface of the payment token.
	interface IERC20 {
		function allowance(address owner, address spender) external view returns (uint256);
	}
}

/// Payment terms attached to a relayed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInfo {
	/// Token amount offered to the relayer, in base units.
	#[serde(with = "crate::serde_helpers::u256_decimal")]
	pub payment: U256,
	/// Present when payment is authorized independently of the forward
	/// request (see [`PaymentAuthorization`]).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub payment_signature: Option<Bytes>,
}

/// A forward request together with its signature and payment terms, exactly
/// as submitted on the wire and carried through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedRequest {
	pub request: ForwardRequest,
	/// 65-byte ECDSA signature over the typed digest of `request`.
	pub signature: Bytes,
	#[serde(flatten)]
	pub payment: PaymentInfo,
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{address, U256};

	fn sample() -> SignedRequest {
		SignedRequest {
			request: ForwardRequest {
				from: address!("1111111111111111111111111111111111111111"),
				to: address!("2222222222222222222222222222222222222222"),
				value: U256::ZERO,
				gas: U256::from(100_000u64),
				nonce: U256::ZERO,
				data: Bytes::new(),
			},
			signature: Bytes::from(vec![0u8; 65]),
			payment: PaymentInfo {
				payment: U256::from(1_000_000u64),
				payment_signature: None,
			},
		}
	}

	#[test]
	fn wire_format_field_names() {
		let json = serde_json::to_value(sample()).unwrap();
		let request = json.get("request").unwrap();
		for field in ["from", "to", "value", "gas", "nonce", "data"] {
			assert!(request.get(field).is_some(), "missing field {}", field);
		}
		assert!(json.get("signature").is_some());
		assert_eq!(json.get("payment").unwrap(), "1000000");
		assert!(json.get("payment_signature").is_none());
	}

	#[test]
	fn wire_format_round_trip() {
		let body = serde_json::to_string(&sample()).unwrap();
		let parsed: SignedRequest = serde_json::from_str(&body).unwrap();
		assert_eq!(parsed.request.from, sample().request.from);
		assert_eq!(parsed.request.nonce, U256::ZERO);
		assert_eq!(parsed.payment.payment, U256::from(1_000_000u64));
	}
}
