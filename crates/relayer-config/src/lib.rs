//! Configuration loading for the relay service.
//!
//! Configuration is read from a TOML (or JSON/YAML) file, `${VAR}` references
//! are substituted from the environment, a small set of service-level
//! overrides is applied from `RELAYER_`-prefixed variables, and the result is
//! validated before the service starts.

use std::env;
use std::path::Path;
use thiserror::Error;

pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "RELAYER_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		self.apply_env_overrides(&mut config)?;

		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let path = Path::new(file_path);
		if !path.exists() {
			return Err(ConfigError::FileNotFound(file_path.to_string()));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let substituted = substitute_env_vars(&content)?;

		let extension = path
			.extension()
			.and_then(|ext| ext.to_str())
			.unwrap_or("toml");

		let config: Config = match extension {
			"json" => serde_json::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string()))?,
			"yaml" | "yml" => serde_yaml::from_str(&substituted)
				.map_err(|e| ConfigError::ParseError(e.to_string()))?,
			_ => toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?,
		};

		Ok(config)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			config.relayer.log_level = log_level;
		}

		if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
			config.relayer.http_port = http_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Ok(workers) = env::var(format!("{}WORKERS", self.env_prefix)) {
			config.relayer.workers = workers
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid worker count: {}", e)))?;
		}

		Ok(())
	}
}

/// Replaces `${VAR}` references with environment variable values. Every
/// referenced variable must be set; a missing one fails the load rather than
/// silently producing a broken value.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let mut result = String::with_capacity(content.len());
	let mut rest = content;

	while let Some(start) = rest.find("${") {
		result.push_str(&rest[..start]);
		let after = &rest[start + 2..];
		let end = after
			.find('}')
			.ok_or_else(|| ConfigError::ParseError("Unterminated ${ reference".to_string()))?;
		let var_name = &after[..end];
		let value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
		result.push_str(&value);
		rest = &after[end + 1..];
	}

	result.push_str(rest);
	Ok(result)
}

/// Startup validation; failures here abort before any service is built.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	if config.relayer.workers == 0 {
		return Err(ConfigError::ValidationError(
			"At least one worker is required".to_string(),
		));
	}

	if config.relayer.poll_interval_ms == 0 {
		return Err(ConfigError::ValidationError(
			"Queue poll interval must be non-zero".to_string(),
		));
	}

	if config.domain.chain_id == 0 {
		return Err(ConfigError::ValidationError(
			"Chain id must be non-zero".to_string(),
		));
	}

	if config.domain.verifying_contract.is_zero() {
		return Err(ConfigError::ValidationError(
			"Verifying contract address must be set".to_string(),
		));
	}

	if config.payment.token.is_zero() {
		return Err(ConfigError::ValidationError(
			"Payment token address must be set".to_string(),
		));
	}

	if config.payment.dynamic_pricing {
		if config.payment.markup < rust_decimal::Decimal::ONE {
			return Err(ConfigError::ValidationError(
				"Payment markup must be at least 1.0".to_string(),
			));
		}
		if config.oracle.is_none() {
			return Err(ConfigError::ValidationError(
				"Dynamic pricing requires an oracle section".to_string(),
			));
		}
	}

	if config.retry.max_holds == 0 {
		return Err(ConfigError::ValidationError(
			"Hold budget must allow at least one delivery".to_string(),
		));
	}

	for (section, implementation) in [
		("queue", &config.queue.implementation),
		("storage", &config.storage.implementation),
		("custody", &config.custody.implementation),
		("execution", &config.execution.implementation),
	] {
		if implementation.is_empty() {
			return Err(ConfigError::ValidationError(format!(
				"Section '{}' names no implementation",
				section
			)));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn base_toml() -> String {
		r#"
[relayer]
workers = 2
http_port = 8080

[domain]
chain_id = 31337
verifying_contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"

[payment]
token = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
min_payment = "1000000"

[retry]
max_retries = 3

[queue]
implementation = "memory"

[storage]
implementation = "memory"

[custody]
implementation = "local"
[custody.config]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[execution]
implementation = "evm"
[execution.config]
rpc_url = "http://localhost:8545"
"#
		.to_string()
	}

	fn write_temp(content: &str, extension: &str) -> tempfile::TempPath {
		let mut file = tempfile::Builder::new()
			.suffix(&format!(".{}", extension))
			.tempfile()
			.unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file.into_temp_path()
	}

	#[tokio::test]
	async fn loads_toml_file() {
		let path = write_temp(&base_toml(), "toml");
		let config = ConfigLoader::new().with_file(&path).load().await.unwrap();

		assert_eq!(config.relayer.workers, 2);
		assert_eq!(config.domain.chain_id, 31337);
		assert_eq!(config.retry.max_retries, 3);
		assert_eq!(config.retry.max_holds, 5);
		assert_eq!(config.queue.implementation, "memory");
		assert!(config.custody.config.get("private_key").is_some());
	}

	#[tokio::test]
	async fn missing_file_is_an_error() {
		let result = ConfigLoader::new()
			.with_file("/nonexistent/relayer.toml")
			.load()
			.await;
		assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
	}

	#[test]
	fn substitutes_env_vars() {
		env::set_var("RELAYER_TEST_SUBST_URL", "http://rpc.internal:8545");
		let out = substitute_env_vars("rpc_url = \"${RELAYER_TEST_SUBST_URL}\"").unwrap();
		assert_eq!(out, "rpc_url = \"http://rpc.internal:8545\"");
	}

	#[test]
	fn missing_env_var_is_an_error() {
		let result = substitute_env_vars("key = \"${RELAYER_TEST_DEFINITELY_UNSET}\"");
		assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "RELAYER_TEST_DEFINITELY_UNSET"));
	}

	#[test]
	fn content_without_references_is_untouched() {
		let content = "plain = \"value\"";
		assert_eq!(substitute_env_vars(content).unwrap(), content);
	}

	#[tokio::test]
	async fn env_override_wins() {
		env::set_var("RELAYER_OVERRIDE_WORKERS", "8");
		let path = write_temp(&base_toml(), "toml");
		let config = ConfigLoader::new()
			.with_env_prefix("RELAYER_OVERRIDE_")
			.with_file(&path)
			.load()
			.await
			.unwrap();
		assert_eq!(config.relayer.workers, 8);
	}

	#[tokio::test]
	async fn rejects_zero_verifying_contract() {
		let content = base_toml().replace(
			"0x5FbDB2315678afecb367f032d93F642f64180aa3",
			"0x0000000000000000000000000000000000000000",
		);
		let path = write_temp(&content, "toml");
		let result = ConfigLoader::new().with_file(&path).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}

	#[tokio::test]
	async fn rejects_dynamic_pricing_without_oracle() {
		let content = base_toml().replace(
			"min_payment = \"1000000\"",
			"min_payment = \"1000000\"\nmarkup = \"1.1\"\ndynamic_pricing = true",
		);
		let path = write_temp(&content, "toml");
		let result = ConfigLoader::new().with_file(&path).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}

	#[tokio::test]
	async fn rejects_zero_hold_budget() {
		let content = base_toml().replace("max_retries = 3", "max_retries = 3\nmax_holds = 0");
		let path = write_temp(&content, "toml");
		let result = ConfigLoader::new().with_file(&path).load().await;
		assert!(matches!(result, Err(ConfigError::ValidationError(_))));
	}
}
