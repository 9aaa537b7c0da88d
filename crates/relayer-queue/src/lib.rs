//! Work queue abstraction for the relay service.
//!
//! Delivery is at-least-once: a received message stays invisible for a
//! bounded window and reappears unless it is deleted or dead-lettered.
//! Consumers therefore delete only on terminal outcomes and otherwise let the
//! message come back. Duplicate handling is not the queue's job; the relay's
//! nonce check makes redelivery harmless.

use async_trait::async_trait;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// The receipt does not match any in-flight delivery, usually because
	/// the visibility window expired and the message was handed out again.
	#[error("Unknown receipt: {0}")]
	UnknownReceipt(String),
	/// Error in the queue backend.
	#[error("Backend error: {0}")]
	Backend(String),
}

/// One delivery of a queued message.
#[derive(Debug, Clone)]
pub struct QueueMessage {
	/// Stable message identifier, the same across redeliveries.
	pub id: String,
	/// Receipt for this delivery only; delete and dead-letter take it.
	pub receipt: String,
	pub body: Vec<u8>,
	/// How many times this message has been delivered, this one included.
	pub receive_count: u32,
}

/// Trait defining the interface for queue backends.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Enqueues a message body, returning its message id.
	async fn publish(&self, body: Vec<u8>) -> Result<String, QueueError>;

	/// Receives up to `max` visible messages, making each invisible for the
	/// backend's visibility window.
	async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError>;

	/// Permanently removes a delivered message.
	async fn delete(&self, receipt: &str) -> Result<(), QueueError>;

	/// Moves a delivered message to the dead-letter channel.
	async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), QueueError>;
}

/// High-level queue service wrapping a backend implementation.
pub struct QueueService {
	backend: Box<dyn QueueInterface>,
}

impl QueueService {
	pub fn new(backend: Box<dyn QueueInterface>) -> Self {
		Self { backend }
	}

	pub async fn publish(&self, body: Vec<u8>) -> Result<String, QueueError> {
		self.backend.publish(body).await
	}

	pub async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
		self.backend.receive(max).await
	}

	pub async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
		self.backend.delete(receipt).await
	}

	pub async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), QueueError> {
		self.backend.dead_letter(receipt, reason).await
	}
}
