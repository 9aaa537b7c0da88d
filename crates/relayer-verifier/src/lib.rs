//! Signature and domain verification for forwarded requests.
//!
//! Reconstructs the EIP-712 digest a requester signed and recovers the signer
//! from the accompanying signature. Everything here is pure and deterministic:
//! malformed signatures and mismatched fields are expected traffic and simply
//! fail verification, they are never surfaced as faults.

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};
use relayer_types::{
	ForwardRequest, PaymentAuthorization, FORWARDER_DOMAIN_NAME, FORWARDER_DOMAIN_VERSION,
};
use std::borrow::Cow;

/// Verifies forwarded requests against a fixed EIP-712 domain.
///
/// The domain binds signatures to one forwarder deployment on one chain.
/// Name and version are a persisted contract shared with requesters; changing
/// either invalidates every previously signed request.
pub struct RequestVerifier {
	domain: Eip712Domain,
}

impl RequestVerifier {
	pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
		let domain = Eip712Domain {
			name: Some(Cow::Borrowed(FORWARDER_DOMAIN_NAME)),
			version: Some(Cow::Borrowed(FORWARDER_DOMAIN_VERSION)),
			chain_id: Some(U256::from(chain_id)),
			verifying_contract: Some(verifying_contract),
			salt: None,
		};

		Self { domain }
	}

	/// The typed-data digest the requester signed.
	pub fn request_digest(&self, request: &ForwardRequest) -> B256 {
		request.eip712_signing_hash(&self.domain)
	}

	/// Stable request identifier derived from the digest.
	///
	/// Two byte-identical requests map to the same id, so a redelivered queue
	/// message finds the outcome record of its earlier delivery.
	pub fn request_id(&self, request: &ForwardRequest) -> String {
		format!("0x{}", hex::encode(self.request_digest(request)))
	}

	/// Recovers the signing address, or `None` when the signature is
	/// malformed or does not match the digest.
	pub fn recover_signer(&self, request: &ForwardRequest, signature: &[u8]) -> Option<Address> {
		let signature = Signature::try_from(signature).ok()?;
		let digest = self.request_digest(request);
		signature.recover_address_from_prehash(&digest).ok()
	}

	/// Checks a signed request against the registry nonce.
	///
	/// True only when the recovered signer equals `request.from` and
	/// `request.nonce` equals `current_nonce`. Pure; callers re-read the
	/// registry and call again on redelivery.
	pub fn verify(&self, request: &ForwardRequest, signature: &[u8], current_nonce: U256) -> bool {
		if request.nonce != current_nonce {
			return false;
		}

		match self.recover_signer(request, signature) {
			Some(signer) => signer == request.from,
			None => false,
		}
	}

	/// Digest of a payment authorization bound to the same domain.
	pub fn payment_digest(&self, authorization: &PaymentAuthorization) -> B256 {
		authorization.eip712_signing_hash(&self.domain)
	}

	/// Checks a secondary payment signature when the requester authorized the
	/// payment independently of the forward request.
	pub fn verify_payment(&self, authorization: &PaymentAuthorization, signature: &[u8]) -> bool {
		let parsed = match Signature::try_from(signature) {
			Ok(parsed) => parsed,
			Err(_) => return false,
		};
		let digest = self.payment_digest(authorization);
		match parsed.recover_address_from_prehash(&digest) {
			Ok(signer) => signer == authorization.from,
			Err(_) => false,
		}
	}
}
