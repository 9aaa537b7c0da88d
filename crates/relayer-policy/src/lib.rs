//! Payment policy evaluation for the relay service.
//!
//! Decides whether the payment offered with a request clears the relay's
//! floor and whether the requester's token authorization covers it. The
//! evaluator gates execution and never moves value; the floor is computed
//! once per request, before execution, and is never retroactively changed
//! for a request already accepted.

use alloy::primitives::U256;
use async_trait::async_trait;
use relayer_types::RejectionReason;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod fixed;
}

/// Payment token base units per this many wei of native currency in a
/// [`FeeQuote`] rate.
const RATE_SCALE_WEI: u64 = 1_000_000_000_000_000_000;

const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Error)]
pub enum OracleError {
	#[error("Oracle unavailable: {0}")]
	Unavailable(String),
}

/// A fee and rate observation from the pricing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
	/// Native gas price in wei per gas unit.
	pub gas_price_wei: u128,
	/// Payment token base units per 1e18 wei of native currency.
	pub token_per_native: U256,
	/// Quote time, unix seconds. Non-decreasing per source, so quotes can be
	/// replayed against the audit log in order.
	pub timestamp: u64,
}

/// Pluggable fee and exchange-rate source for dynamic pricing.
#[async_trait]
pub trait FeeOracle: Send + Sync {
	async fn quote(&self) -> Result<FeeQuote, OracleError>;
}

/// Outcome of policy evaluation for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
	/// Payment clears the floor and the authorization covers it.
	Approved { required_payment: U256 },
	Rejected(RejectionReason),
}

/// Evaluates offered payments against a static floor and, when an oracle is
/// configured, a dynamic floor derived from current fee conditions.
pub struct PolicyEvaluator {
	min_payment: U256,
	markup_bps: U256,
	oracle: Option<Box<dyn FeeOracle>>,
}

impl PolicyEvaluator {
	/// Creates an evaluator. `markup` is a multiplier on the dynamic floor,
	/// at least 1.0; it is irrelevant when no oracle is configured.
	pub fn new(min_payment: U256, markup: Decimal, oracle: Option<Box<dyn FeeOracle>>) -> Self {
		// A markup too large for basis points saturates; the resulting floor
		// rejects everything rather than wrapping around.
		let markup_bps = (markup * Decimal::from(BPS_DENOMINATOR))
			.ceil()
			.to_u64()
			.unwrap_or(u64::MAX);

		Self {
			min_payment,
			markup_bps: U256::from(markup_bps),
			oracle,
		}
	}

	/// Computes the payment floor for a request.
	///
	/// With an oracle configured the floor is
	/// `ceil(gas_price × gas × rate × markup)` converted to payment token
	/// units, never below the static floor. Every quote used is logged for
	/// audit.
	pub async fn required_payment(&self, gas: U256) -> Result<U256, OracleError> {
		let Some(oracle) = &self.oracle else {
			return Ok(self.min_payment);
		};

		let quote = oracle.quote().await?;
		tracing::info!(
			gas_price_wei = quote.gas_price_wei,
			token_per_native = %quote.token_per_native,
			timestamp = quote.timestamp,
			"fee quote"
		);

		Ok(self.dynamic_floor(&quote, gas).max(self.min_payment))
	}

	/// Applies the floor and authorization checks to one request.
	///
	/// Pure: the floor was computed once up front and is passed in unchanged.
	pub fn evaluate(&self, payment: U256, allowance: U256, required_payment: U256) -> PolicyDecision {
		if payment < required_payment {
			return PolicyDecision::Rejected(RejectionReason::PaymentBelowMinimum);
		}

		if allowance < payment {
			return PolicyDecision::Rejected(RejectionReason::InsufficientAuthorization);
		}

		PolicyDecision::Approved { required_payment }
	}

	fn dynamic_floor(&self, quote: &FeeQuote, gas: U256) -> U256 {
		let numerator = U256::from(quote.gas_price_wei)
			.checked_mul(gas)
			.and_then(|cost| cost.checked_mul(quote.token_per_native))
			.and_then(|scaled| scaled.checked_mul(self.markup_bps));

		match numerator {
			Some(numerator) => ceil_div(
				numerator,
				U256::from(RATE_SCALE_WEI) * U256::from(BPS_DENOMINATOR),
			),
			// Absurd inputs saturate; no payment clears this floor.
			None => U256::MAX,
		}
	}
}

/// Integer division rounding toward positive infinity. The payment token has
/// no sub-unit precision, so a fractional floor always rounds up.
fn ceil_div(numerator: U256, denominator: U256) -> U256 {
	let (quotient, remainder) = numerator.div_rem(denominator);
	if remainder.is_zero() {
		quotient
	} else {
		quotient + U256::from(1u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct ScriptedOracle {
		quote: FeeQuote,
	}

	#[async_trait]
	impl FeeOracle for ScriptedOracle {
		async fn quote(&self) -> Result<FeeQuote, OracleError> {
			Ok(self.quote)
		}
	}

	fn static_evaluator(min_payment: u64) -> PolicyEvaluator {
		PolicyEvaluator::new(U256::from(min_payment), Decimal::ONE, None)
	}

	#[tokio::test]
	async fn static_floor_boundaries() {
		let evaluator = static_evaluator(1_000);
		let required = evaluator.required_payment(U256::from(100_000u64)).await.unwrap();
		assert_eq!(required, U256::from(1_000u64));

		let ample = U256::MAX;
		assert_eq!(
			evaluator.evaluate(U256::from(1_000u64), ample, required),
			PolicyDecision::Approved {
				required_payment: required
			}
		);
		assert_eq!(
			evaluator.evaluate(U256::from(999u64), ample, required),
			PolicyDecision::Rejected(RejectionReason::PaymentBelowMinimum)
		);
		assert_eq!(
			evaluator.evaluate(U256::ZERO, ample, required),
			PolicyDecision::Rejected(RejectionReason::PaymentBelowMinimum)
		);
	}

	#[tokio::test]
	async fn zero_floor_accepts_zero_payment() {
		let evaluator = static_evaluator(0);
		let required = evaluator.required_payment(U256::from(21_000u64)).await.unwrap();
		assert_eq!(
			evaluator.evaluate(U256::ZERO, U256::ZERO, required),
			PolicyDecision::Approved {
				required_payment: U256::ZERO
			}
		);
	}

	#[test]
	fn allowance_must_cover_the_payment() {
		let evaluator = static_evaluator(1_000);
		let payment = U256::from(5_000u64);

		assert_eq!(
			evaluator.evaluate(payment, U256::from(4_999u64), U256::from(1_000u64)),
			PolicyDecision::Rejected(RejectionReason::InsufficientAuthorization)
		);
		assert_eq!(
			evaluator.evaluate(payment, payment, U256::from(1_000u64)),
			PolicyDecision::Approved {
				required_payment: U256::from(1_000u64)
			}
		);
	}

	#[tokio::test]
	async fn dynamic_floor_converts_fee_cost_to_token_units() {
		// 2 gwei gas price, 100k gas, 3.0 tokens (6 decimals) per native:
		// 2e9 * 1e5 wei * 3e6 / 1e18 = 600 token units.
		let oracle = ScriptedOracle {
			quote: FeeQuote {
				gas_price_wei: 2_000_000_000,
				token_per_native: U256::from(3_000_000u64),
				timestamp: 1,
			},
		};
		let evaluator = PolicyEvaluator::new(U256::ZERO, Decimal::ONE, Some(Box::new(oracle)));

		let required = evaluator.required_payment(U256::from(100_000u64)).await.unwrap();
		assert_eq!(required, U256::from(600u64));
	}

	#[tokio::test]
	async fn dynamic_floor_rounds_up_and_applies_markup() {
		// 1.5 gwei * 100_001 gas * 3e6 / 1e18 = 450.0045, rounds up to 451.
		let oracle = ScriptedOracle {
			quote: FeeQuote {
				gas_price_wei: 1_500_000_000,
				token_per_native: U256::from(3_000_000u64),
				timestamp: 1,
			},
		};
		let evaluator = PolicyEvaluator::new(U256::ZERO, Decimal::ONE, Some(Box::new(oracle)));
		let required = evaluator.required_payment(U256::from(100_001u64)).await.unwrap();
		assert_eq!(required, U256::from(451u64));

		// 10% markup on an exact 600-unit cost.
		let oracle = ScriptedOracle {
			quote: FeeQuote {
				gas_price_wei: 2_000_000_000,
				token_per_native: U256::from(3_000_000u64),
				timestamp: 1,
			},
		};
		let evaluator = PolicyEvaluator::new(
			U256::ZERO,
			Decimal::new(11, 1),
			Some(Box::new(oracle)),
		);
		let required = evaluator.required_payment(U256::from(100_000u64)).await.unwrap();
		assert_eq!(required, U256::from(660u64));
	}

	#[tokio::test]
	async fn static_floor_caps_the_dynamic_floor_from_below() {
		let oracle = ScriptedOracle {
			quote: FeeQuote {
				gas_price_wei: 1,
				token_per_native: U256::from(1u64),
				timestamp: 1,
			},
		};
		let evaluator = PolicyEvaluator::new(
			U256::from(1_000u64),
			Decimal::ONE,
			Some(Box::new(oracle)),
		);

		let required = evaluator.required_payment(U256::from(21_000u64)).await.unwrap();
		assert_eq!(required, U256::from(1_000u64));
	}

	#[test]
	fn ceil_div_rounds_exact_and_fractional() {
		assert_eq!(
			ceil_div(U256::from(10u64), U256::from(5u64)),
			U256::from(2u64)
		);
		assert_eq!(
			ceil_div(U256::from(11u64), U256::from(5u64)),
			U256::from(3u64)
		);
		assert_eq!(ceil_div(U256::ZERO, U256::from(5u64)), U256::ZERO);
	}
}
