//! Configuration sections for the relay service.
//!
//! Boundary implementations (queue, storage, custody, execution, oracle) are
//! selected by name and receive their own free-form `config` table, validated
//! by the implementation's schema at construction time.

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub relayer: RelayerSettings,
	pub domain: DomainConfig,
	pub payment: PaymentConfig,
	#[serde(default)]
	pub retry: RetryConfig,
	pub queue: ImplementationConfig,
	pub storage: ImplementationConfig,
	pub custody: ImplementationConfig,
	pub execution: ImplementationConfig,
	#[serde(default)]
	pub oracle: Option<ImplementationConfig>,
}

/// Service-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerSettings {
	#[serde(default = "default_name")]
	pub name: String,
	/// Number of concurrent queue workers.
	#[serde(default = "default_workers")]
	pub workers: usize,
	#[serde(default = "default_http_port")]
	pub http_port: u16,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// How often the queue is polled for new deliveries.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

impl Default for RelayerSettings {
	fn default() -> Self {
		Self {
			name: default_name(),
			workers: default_workers(),
			http_port: default_http_port(),
			log_level: default_log_level(),
			poll_interval_ms: default_poll_interval_ms(),
		}
	}
}

/// EIP-712 domain binding. Name and version are fixed by the forwarder
/// contract; only the deployment coordinates vary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
	pub chain_id: u64,
	pub verifying_contract: Address,
}

/// Payment policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
	/// Payment token contract address.
	pub token: Address,
	/// Static payment floor in token base units.
	#[serde(with = "relayer_types::serde_helpers::u256_decimal")]
	pub min_payment: U256,
	/// Markup multiplier applied to the estimated execution cost when dynamic
	/// pricing is enabled. Must be at least 1.0.
	#[serde(default = "default_markup")]
	pub markup: Decimal,
	/// When true the floor is max(min_payment, cost-derived floor).
	#[serde(default)]
	pub dynamic_pricing: bool,
}

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
	/// Retries after the first attempt; a request is attempted at most
	/// `max_retries + 1` times before dead-lettering.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_initial_backoff_ms")]
	pub initial_backoff_ms: u64,
	#[serde(default = "default_max_backoff_secs")]
	pub max_backoff_secs: u64,
	/// Transient custodian faults retried this many times per attempt without
	/// consuming the execution retry budget.
	#[serde(default = "default_custodian_retries")]
	pub custodian_retries: u32,
	#[serde(default = "default_custodian_backoff_ms")]
	pub custodian_backoff_ms: u64,
	/// Deliveries a request whose nonce is ahead of the forwarder may spend
	/// waiting for its predecessor before it is dead-lettered with a
	/// recorded outcome. Must not exceed the queue's receive budget, or the
	/// queue backstop removes the message without one.
	#[serde(default = "default_max_holds")]
	pub max_holds: u32,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: default_max_retries(),
			initial_backoff_ms: default_initial_backoff_ms(),
			max_backoff_secs: default_max_backoff_secs(),
			custodian_retries: default_custodian_retries(),
			custodian_backoff_ms: default_custodian_backoff_ms(),
			max_holds: default_max_holds(),
		}
	}
}

/// A named boundary implementation with its own settings table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationConfig {
	pub implementation: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

fn default_name() -> String {
	"forwarder-relayer".to_string()
}

fn default_workers() -> usize {
	4
}

fn default_http_port() -> u16 {
	8080
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_markup() -> Decimal {
	Decimal::ONE
}

fn default_max_retries() -> u32 {
	3
}

fn default_initial_backoff_ms() -> u64 {
	500
}

fn default_max_backoff_secs() -> u64 {
	30
}

fn default_custodian_retries() -> u32 {
	5
}

fn default_custodian_backoff_ms() -> u64 {
	250
}

fn default_max_holds() -> u32 {
	5
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::map::Map::new())
}
