//! Fixed-rate fee oracle.
//!
//! Serves a configured gas price and token exchange rate on every quote.
//! Useful for development and for deployments that pin pricing operationally
//! rather than following the market. Quote timestamps still advance
//! monotonically so the audit log stays ordered.

use crate::{FeeOracle, FeeQuote, OracleError};
use alloy::primitives::U256;
use async_trait::async_trait;
use relayer_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct FixedRateOracle {
	gas_price_wei: u128,
	token_per_native: U256,
	last_timestamp: AtomicU64,
}

impl FixedRateOracle {
	pub fn new(gas_price_wei: u128, token_per_native: U256) -> Self {
		Self {
			gas_price_wei,
			token_per_native,
			last_timestamp: AtomicU64::new(0),
		}
	}
}

#[async_trait]
impl FeeOracle for FixedRateOracle {
	async fn quote(&self) -> Result<FeeQuote, OracleError> {
		let now = chrono::Utc::now().timestamp().max(0) as u64;
		let previous = self.last_timestamp.fetch_max(now, Ordering::SeqCst);

		Ok(FeeQuote {
			gas_price_wei: self.gas_price_wei,
			token_per_native: self.token_per_native,
			timestamp: now.max(previous),
		})
	}
}

/// Configuration schema for FixedRateOracle.
pub struct FixedRateOracleSchema;

impl ConfigSchema for FixedRateOracleSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new(
					"gas_price_wei",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new("token_per_native", FieldType::String).with_validator(|value| {
					let raw = value.as_str().unwrap();
					U256::from_str_radix(raw, 10)
						.map(|_| ())
						.map_err(|_| "token_per_native must be a base-10 integer".to_string())
				}),
			],
			// Optional fields
			vec![],
		);

		schema.validate(config)
	}
}

/// Factory function to create a fee oracle from configuration.
///
/// Configuration parameters:
/// - `gas_price_wei`: native gas price served on every quote
/// - `token_per_native`: payment token base units per 1e18 wei, decimal string
pub fn create_oracle(config: &toml::Value) -> Box<dyn FeeOracle> {
	FixedRateOracleSchema
		.validate(config)
		.expect("Invalid oracle configuration");

	let gas_price_wei = config
		.get("gas_price_wei")
		.and_then(|v| v.as_integer())
		.expect("gas_price_wei is required") as u128;

	let token_per_native = config
		.get("token_per_native")
		.and_then(|v| v.as_str())
		.map(|raw| U256::from_str_radix(raw, 10).expect("Invalid token_per_native"))
		.expect("token_per_native is required");

	Box::new(FixedRateOracle::new(gas_price_wei, token_per_native))
}
