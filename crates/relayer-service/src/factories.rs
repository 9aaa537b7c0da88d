//! Maps configured implementation names to component factories.
//!
//! Each boundary names its implementation in the configuration; this module
//! hands the matching factory to the builder. Unknown names fail fast at
//! startup.

use anyhow::{bail, Result};
use relayer_config::Config;
use relayer_core::RelayBuilder;

pub fn register(mut builder: RelayBuilder, config: &Config) -> Result<RelayBuilder> {
	builder = match config.queue.implementation.as_str() {
		"memory" => {
			builder.with_queue_factory(relayer_queue::implementations::memory::create_queue)
		}
		other => bail!("Unknown queue implementation: {}", other),
	};

	builder = match config.storage.implementation.as_str() {
		"memory" => {
			builder.with_storage_factory(relayer_storage::implementations::memory::create_storage)
		}
		"file" => {
			builder.with_storage_factory(relayer_storage::implementations::file::create_storage)
		}
		other => bail!("Unknown storage implementation: {}", other),
	};

	builder = match config.custody.implementation.as_str() {
		"local" => {
			builder.with_custody_factory(relayer_custody::implementations::local::create_custody)
		}
		other => bail!("Unknown custody implementation: {}", other),
	};

	builder = match config.execution.implementation.as_str() {
		"evm" => {
			builder.with_execution_factory(relayer_execution::implementations::evm::create_execution)
		}
		other => bail!("Unknown execution implementation: {}", other),
	};

	if let Some(oracle) = &config.oracle {
		builder = match oracle.implementation.as_str() {
			"fixed" => {
				builder.with_oracle_factory(relayer_policy::implementations::fixed::create_oracle)
			}
			other => bail!("Unknown oracle implementation: {}", other),
		};
	}

	Ok(builder)
}
