//! Per-identity in-flight markers.

use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed exclusive sections, one per authorizing identity.
///
/// A worker holds the identity's section from verification until the
/// execution outcome is known, so `nonce + 1` is never verified or submitted
/// while `nonce` is still in flight for the same identity. Distinct
/// identities never contend, and an identity with no holder and no waiters
/// leaves no entry behind.
#[derive(Clone, Default)]
pub struct InflightRegistry {
	locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
}

/// Holds the identity's section; releasing it evicts the map entry unless
/// another worker is already waiting on it.
pub struct InflightGuard {
	locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
	identity: Address,
	permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for InflightGuard {
	fn drop(&mut self) {
		self.permit.take();
		// A waiter's clone keeps the count above one; the removal and a
		// concurrent acquire serialize on the shard lock.
		self.locks
			.remove_if(&self.identity, |_, lock| Arc::strong_count(lock) == 1);
	}
}

impl InflightRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Acquires the identity's exclusive section, creating it on first use.
	pub async fn acquire(&self, identity: Address) -> InflightGuard {
		// The map entry guard must be released before parking on the mutex,
		// otherwise a waiting worker would pin the shard.
		let lock = self
			.locks
			.entry(identity)
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone();
		let permit = lock.lock_owned().await;
		InflightGuard {
			locks: self.locks.clone(),
			identity,
			permit: Some(permit),
		}
	}
}
