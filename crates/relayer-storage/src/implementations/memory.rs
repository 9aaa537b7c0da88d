//! In-memory storage backend.
//!
//! Keeps records in a concurrent map. Nothing survives a restart, which is
//! fine for tests and local development but not for production use.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory storage implementation backed by a concurrent map.
#[derive(Default)]
pub struct MemoryStorage {
	entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.entries
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.entries.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.entries.contains_key(key))
	}
}

/// Factory function to create an in-memory storage backend.
///
/// Takes no configuration parameters.
pub fn create_storage(_config: &toml::Value) -> Box<dyn StorageInterface> {
	Box::new(MemoryStorage::new())
}
