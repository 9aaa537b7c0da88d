//! Custodian implementations for the relay service.
//!
//! This module provides concrete implementations of the CustodyInterface
//! trait, currently supporting local private key signing using the Alloy
//! library.

use crate::{CustodyError, CustodyInterface};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSigner;
use alloy::primitives::{Address, TxKind};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use relayer_types::{
	ConfigSchema, Field, FieldType, RelayTransaction, Schema, SignedTransaction, ValidationError,
};

/// Local key custodian backed by Alloy's in-process signer.
///
/// Holds a private key in memory and signs EIP-1559 transactions with it.
/// Suitable for development and testing; production deployments are expected
/// to plug in a remote signing service instead.
pub struct LocalKeySigner {
	/// The underlying Alloy signer that handles cryptographic operations.
	signer: PrivateKeySigner,
}

impl LocalKeySigner {
	/// Creates a new LocalKeySigner from a hex-encoded private key.
	///
	/// The private key should be provided as a hex string (with or without 0x prefix).
	pub fn new(private_key_hex: &str) -> Result<Self, CustodyError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| CustodyError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}
}

/// Configuration schema for LocalKeySigner.
pub struct LocalKeySignerSchema;

impl ConfigSchema for LocalKeySignerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("private_key", FieldType::String).with_validator(|value| {
					let key = value.as_str().unwrap();
					let key_without_prefix = key.strip_prefix("0x").unwrap_or(key);

					if key_without_prefix.len() != 64 {
						return Err("Private key must be 64 hex characters (32 bytes)".to_string());
					}

					if hex::decode(key_without_prefix).is_err() {
						return Err("Private key must be valid hexadecimal".to_string());
					}

					Ok(())
				}),
			],
			// Optional fields
			vec![],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl CustodyInterface for LocalKeySigner {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalKeySignerSchema)
	}

	async fn address(&self) -> Result<Address, CustodyError> {
		Ok(self.signer.address())
	}

	async fn sign_transaction(
		&self,
		tx: &RelayTransaction,
	) -> Result<SignedTransaction, CustodyError> {
		let mut typed = TxEip1559 {
			chain_id: tx.chain_id,
			nonce: tx.nonce,
			gas_limit: tx.gas_limit,
			max_fee_per_gas: tx.max_fee_per_gas,
			max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
			to: TxKind::Call(tx.to),
			value: tx.value,
			access_list: Default::default(),
			input: tx.data.clone(),
		};

		let signature = self.signer.sign_transaction(&mut typed).await.map_err(|e| {
			CustodyError::SigningFailed(format!("Failed to sign transaction: {}", e))
		})?;

		let signed = typed.into_signed(signature);
		let hash = *signed.hash();
		let raw = TxEnvelope::Eip1559(signed).encoded_2718();

		Ok(SignedTransaction {
			raw: raw.into(),
			hash,
		})
	}
}

/// Factory function to create a custodian from configuration.
///
/// Currently only supports local keys with a private_key configuration
/// parameter.
pub fn create_custody(config: &toml::Value) -> Box<dyn CustodyInterface> {
	LocalKeySignerSchema
		.validate(config)
		.expect("Invalid custody configuration");

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.expect("private_key is required for local custody");

	Box::new(LocalKeySigner::new(private_key).expect("Failed to create local key signer"))
}
