//! Alloy-based EVM execution adapter.
//!
//! Drives the `TokenPaymentForwarder` contract over JSON-RPC: `execute` for
//! forward requests, `collectPayment` for fee collection, `getNonce` and the
//! payment token's `allowance` as verification reads. Submissions are signed
//! by the custodian and sent as raw EIP-1559 envelopes; the relay account
//! nonce is cached locally and dropped back to the node's view whenever a
//! submission fails or times out, since either leaves the cache unreliable.

use crate::{
	ExecutionContext, ExecutionError, ExecutionHandle, ExecutionInterface, ExecutionOutcome,
	ExecutionReceipt,
};
use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use relayer_types::{
	ConfigSchema, ExecutionParams, Field, FieldType, IERC20, IPaymentForwarder, RelayTransaction,
	Schema, SignedRequest, ValidationError,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Gas charged by the forwarder itself on top of the inner call's budget:
/// signature check, nonce bump, and dispatch.
const EXECUTE_GAS_OVERHEAD: u64 = 60_000;

/// Gas limit for `collectPayment`, a single token transfer plus bookkeeping.
const PAYMENT_GAS_LIMIT: u64 = 120_000;

/// Configuration for the Alloy EVM execution adapter.
#[derive(Debug, Clone)]
pub struct AlloyExecutionConfig {
	/// JSON-RPC endpoint URL.
	pub rpc_url: String,
	/// How long to wait for a submission to confirm before reporting a
	/// timeout.
	pub confirmation_timeout_secs: u64,
	/// Receipt polling cadence while waiting.
	pub poll_interval_ms: u64,
	/// Blocks on top of inclusion before a receipt counts as confirmed.
	pub confirmation_blocks: u32,
}

impl AlloyExecutionConfig {
	pub fn from_toml(config: &toml::Value) -> Self {
		Self {
			rpc_url: config
				.get("rpc_url")
				.and_then(|v| v.as_str())
				.unwrap_or_default()
				.to_string(),
			confirmation_timeout_secs: config
				.get("confirmation_timeout_secs")
				.and_then(|v| v.as_integer())
				.unwrap_or(90) as u64,
			poll_interval_ms: config
				.get("poll_interval_ms")
				.and_then(|v| v.as_integer())
				.unwrap_or(1_000) as u64,
			confirmation_blocks: config
				.get("confirmation_blocks")
				.and_then(|v| v.as_integer())
				.unwrap_or(1) as u32,
		}
	}
}

/// EVM execution adapter backed by an Alloy HTTP provider.
pub struct AlloyExecution {
	provider: RootProvider<Ethereum>,
	context: ExecutionContext,
	config: AlloyExecutionConfig,
	/// Next relay account nonce, `None` when the node must be re-read.
	account_nonce: Mutex<Option<u64>>,
}

impl AlloyExecution {
	pub fn new(
		config: AlloyExecutionConfig,
		context: ExecutionContext,
	) -> Result<Self, ExecutionError> {
		let url = config
			.rpc_url
			.parse()
			.map_err(|e| ExecutionError::Network(format!("Invalid RPC URL: {}", e)))?;

		Ok(Self {
			provider: RootProvider::new_http(url),
			context,
			config,
			account_nonce: Mutex::new(None),
		})
	}

	/// Reserves the next relay account nonce, reading the node's pending
	/// count when the local cache has been invalidated.
	async fn next_account_nonce(&self, relayer: Address) -> Result<u64, ExecutionError> {
		let mut cache = self.account_nonce.lock().await;
		let nonce = match *cache {
			Some(next) => next,
			None => self
				.provider
				.get_transaction_count(relayer)
				.pending()
				.await
				.map_err(|e| {
					ExecutionError::Network(format!("Failed to read account nonce: {}", e))
				})?,
		};
		*cache = Some(nonce + 1);
		Ok(nonce)
	}

	async fn invalidate_account_nonce(&self) {
		*self.account_nonce.lock().await = None;
	}

	/// Signs and broadcasts a call to `to` as a raw EIP-1559 envelope.
	async fn send_call(
		&self,
		to: Address,
		value: U256,
		data: Vec<u8>,
		gas_limit: u64,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		let relayer = self.context.custody.address().await?;
		let nonce = self.next_account_nonce(relayer).await?;

		let tx = RelayTransaction {
			to,
			value,
			data: data.into(),
			gas_limit,
			nonce,
			chain_id: self.context.chain_id,
			max_fee_per_gas: params.max_fee_per_gas,
			max_priority_fee_per_gas: params.max_priority_fee_per_gas,
		};

		let signed = self.context.custody.sign(&tx).await?;

		match self.provider.send_raw_transaction(&signed.raw).await {
			Ok(_) => {
				debug!(tx_hash = %signed.hash, nonce, "transaction submitted");
				Ok(ExecutionHandle {
					tx_hash: signed.hash,
				})
			}
			Err(e) => {
				self.invalidate_account_nonce().await;
				Err(ExecutionError::Network(format!(
					"Transaction submission failed: {}",
					e
				)))
			}
		}
	}

	async fn read_contract(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ExecutionError> {
		let request = TransactionRequest::default()
			.with_to(to)
			.with_input(data);

		let output = self
			.provider
			.call(request)
			.await
			.map_err(|e| ExecutionError::Network(format!("Contract call failed: {}", e)))?;

		Ok(output.to_vec())
	}

	/// One receipt poll; `None` means not resolved yet.
	async fn check_receipt(&self, handle: &ExecutionHandle) -> Option<ExecutionOutcome> {
		let receipt = self
			.provider
			.get_transaction_receipt(handle.tx_hash)
			.await
			.ok()??;
		let block_number = receipt.block_number?;

		if self.config.confirmation_blocks > 1 {
			let head = self.provider.get_block_number().await.ok()?;
			if head.saturating_sub(block_number) + 1 < self.config.confirmation_blocks as u64 {
				return None;
			}
		}

		Some(if receipt.status() {
			ExecutionOutcome::Confirmed(ExecutionReceipt {
				tx_hash: handle.tx_hash,
				block_number,
			})
		} else {
			ExecutionOutcome::Reverted {
				reason: format!("execution reverted in block {}", block_number),
			}
		})
	}
}

fn execute_gas_limit(gas: U256) -> u64 {
	gas.saturating_to::<u64>().saturating_add(EXECUTE_GAS_OVERHEAD)
}

#[async_trait]
impl ExecutionInterface for AlloyExecution {
	async fn submit(
		&self,
		request: &SignedRequest,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		let call = IPaymentForwarder::executeCall {
			req: request.request.clone(),
			signature: request.signature.clone(),
		};

		// The forwarder passes request.value on to the inner call, funded by
		// the relay's own balance.
		self.send_call(
			self.context.forwarder,
			request.request.value,
			call.abi_encode(),
			execute_gas_limit(request.request.gas),
			params,
		)
		.await
	}

	async fn submit_payment(
		&self,
		from: Address,
		amount: U256,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		let call = IPaymentForwarder::collectPaymentCall { from, amount };

		self.send_call(
			self.context.forwarder,
			U256::ZERO,
			call.abi_encode(),
			PAYMENT_GAS_LIMIT,
			params,
		)
		.await
	}

	async fn wait_for_outcome(
		&self,
		handle: &ExecutionHandle,
	) -> Result<ExecutionOutcome, ExecutionError> {
		let deadline = Instant::now() + Duration::from_secs(self.config.confirmation_timeout_secs);

		loop {
			if let Some(outcome) = self.check_receipt(handle).await {
				return Ok(outcome);
			}

			if Instant::now() >= deadline {
				warn!(tx_hash = %handle.tx_hash, "confirmation window elapsed");
				// The transaction may still land; the cached account nonce
				// can no longer be trusted either way.
				self.invalidate_account_nonce().await;
				return Ok(ExecutionOutcome::TimedOut);
			}

			tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
		}
	}

	async fn forwarder_nonce(&self, from: Address) -> Result<U256, ExecutionError> {
		let call = IPaymentForwarder::getNonceCall { from };
		let output = self
			.read_contract(self.context.forwarder, call.abi_encode())
			.await?;

		IPaymentForwarder::getNonceCall::abi_decode_returns(&output)
			.map_err(|e| ExecutionError::Encoding(format!("Malformed getNonce response: {}", e)))
	}

	async fn payment_allowance(&self, owner: Address) -> Result<U256, ExecutionError> {
		let call = IERC20::allowanceCall {
			owner,
			spender: self.context.forwarder,
		};
		let output = self
			.read_contract(self.context.payment_token, call.abi_encode())
			.await?;

		IERC20::allowanceCall::abi_decode_returns(&output)
			.map_err(|e| ExecutionError::Encoding(format!("Malformed allowance response: {}", e)))
	}

	async fn fee_estimate(&self) -> Result<ExecutionParams, ExecutionError> {
		match self.provider.estimate_eip1559_fees().await {
			Ok(fees) => Ok(ExecutionParams {
				max_fee_per_gas: fees.max_fee_per_gas,
				max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
			}),
			Err(e) => {
				warn!(error = %e, "EIP-1559 fee estimation failed, falling back to gas price");
				let gas_price = self.provider.get_gas_price().await.map_err(|e| {
					ExecutionError::Network(format!("Failed to get gas price: {}", e))
				})?;
				Ok(ExecutionParams {
					max_fee_per_gas: gas_price,
					max_priority_fee_per_gas: 0,
				})
			}
		}
	}
}

/// Configuration schema for AlloyExecution.
pub struct AlloyExecutionSchema;

impl ConfigSchema for AlloyExecutionSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			// Required fields
			vec![
				Field::new("rpc_url", FieldType::String).with_validator(|value| {
					let url = value.as_str().unwrap();
					if url.starts_with("http://") || url.starts_with("https://") {
						Ok(())
					} else {
						Err("rpc_url must be an http(s) URL".to_string())
					}
				}),
			],
			// Optional fields
			vec![
				Field::new(
					"confirmation_timeout_secs",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new(
					"poll_interval_ms",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
				Field::new(
					"confirmation_blocks",
					FieldType::Integer {
						min: Some(1),
						max: Some(128),
					},
				),
			],
		);

		schema.validate(config)
	}
}

/// Factory function to create an EVM execution adapter from configuration.
///
/// Configuration parameters:
/// - `rpc_url`: JSON-RPC endpoint (required)
/// - `confirmation_timeout_secs`: confirmation wait window (default: 90)
/// - `poll_interval_ms`: receipt polling cadence (default: 1000)
/// - `confirmation_blocks`: depth before a receipt counts (default: 1)
pub fn create_execution(
	config: &toml::Value,
	context: ExecutionContext,
) -> Box<dyn ExecutionInterface> {
	AlloyExecutionSchema
		.validate(config)
		.expect("Invalid execution configuration");

	let config = AlloyExecutionConfig::from_toml(config);

	Box::new(AlloyExecution::new(config, context).expect("Failed to create execution adapter"))
}
