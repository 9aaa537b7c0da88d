//! In-memory queue backend.
//!
//! Implements the full delivery contract of the queue interface: visibility
//! windows, receive counts, and automatic redrive to a dead-letter buffer
//! once a message has been delivered too many times. State lives in process
//! memory, so this backend suits tests and single-node deployments where a
//! managed queue is not worth operating.

use crate::{QueueError, QueueInterface, QueueMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
	id: String,
	body: Vec<u8>,
	receive_count: u32,
}

#[derive(Debug, Clone)]
struct InFlight {
	entry: Entry,
	visible_at: Instant,
}

/// A message that exhausted its receive budget or was explicitly escalated.
#[derive(Debug, Clone)]
pub struct DeadLetter {
	pub message_id: String,
	pub body: Vec<u8>,
	pub receive_count: u32,
	pub reason: String,
}

#[derive(Default)]
struct Inner {
	ready: VecDeque<Entry>,
	in_flight: HashMap<String, InFlight>,
	dead: Vec<DeadLetter>,
}

/// In-memory queue with visibility timeouts and dead-letter redrive.
#[derive(Clone)]
pub struct MemoryQueue {
	inner: Arc<Mutex<Inner>>,
	visibility_timeout: Duration,
	max_receive_count: u32,
}

impl MemoryQueue {
	pub fn new(visibility_timeout: Duration, max_receive_count: u32) -> Self {
		Self {
			inner: Arc::new(Mutex::new(Inner::default())),
			visibility_timeout,
			max_receive_count,
		}
	}

	/// Messages delivered or deliverable, excluding dead letters.
	pub async fn pending(&self) -> usize {
		let inner = self.inner.lock().await;
		inner.ready.len() + inner.in_flight.len()
	}

	/// Snapshot of the dead-letter buffer.
	pub async fn dead_letters(&self) -> Vec<DeadLetter> {
		self.inner.lock().await.dead.clone()
	}

	/// Returns expired in-flight deliveries to the ready queue. Called at the
	/// start of every operation so expiry is observed without a background
	/// task.
	fn reclaim_expired(inner: &mut Inner) {
		let now = Instant::now();
		let expired: Vec<String> = inner
			.in_flight
			.iter()
			.filter(|(_, holding)| holding.visible_at <= now)
			.map(|(receipt, _)| receipt.clone())
			.collect();

		for receipt in expired {
			if let Some(holding) = inner.in_flight.remove(&receipt) {
				inner.ready.push_back(holding.entry);
			}
		}
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn publish(&self, body: Vec<u8>) -> Result<String, QueueError> {
		let id = uuid::Uuid::new_v4().to_string();
		let mut inner = self.inner.lock().await;
		inner.ready.push_back(Entry {
			id: id.clone(),
			body,
			receive_count: 0,
		});
		Ok(id)
	}

	async fn receive(&self, max: usize) -> Result<Vec<QueueMessage>, QueueError> {
		let mut inner = self.inner.lock().await;
		Self::reclaim_expired(&mut inner);

		let mut messages = Vec::new();
		while messages.len() < max {
			let Some(mut entry) = inner.ready.pop_front() else {
				break;
			};

			entry.receive_count += 1;
			if entry.receive_count > self.max_receive_count {
				// Crash-loop backstop: the consumer never resolved this
				// message, stop handing it out.
				inner.dead.push(DeadLetter {
					message_id: entry.id,
					body: entry.body,
					receive_count: entry.receive_count - 1,
					reason: format!("exceeded max receive count {}", self.max_receive_count),
				});
				continue;
			}

			let receipt = uuid::Uuid::new_v4().to_string();
			messages.push(QueueMessage {
				id: entry.id.clone(),
				receipt: receipt.clone(),
				body: entry.body.clone(),
				receive_count: entry.receive_count,
			});
			inner.in_flight.insert(
				receipt,
				InFlight {
					entry,
					visible_at: Instant::now() + self.visibility_timeout,
				},
			);
		}

		Ok(messages)
	}

	async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
		let mut inner = self.inner.lock().await;
		Self::reclaim_expired(&mut inner);

		inner
			.in_flight
			.remove(receipt)
			.map(|_| ())
			.ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))
	}

	async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<(), QueueError> {
		let mut inner = self.inner.lock().await;
		Self::reclaim_expired(&mut inner);

		let holding = inner
			.in_flight
			.remove(receipt)
			.ok_or_else(|| QueueError::UnknownReceipt(receipt.to_string()))?;

		inner.dead.push(DeadLetter {
			message_id: holding.entry.id,
			body: holding.entry.body,
			receive_count: holding.entry.receive_count,
			reason: reason.to_string(),
		});

		Ok(())
	}
}

/// Factory function to create an in-memory queue from configuration.
///
/// Configuration parameters:
/// - `visibility_timeout_secs`: redelivery window for unresolved messages (default: 30)
/// - `max_receive_count`: deliveries before automatic dead-letter redrive (default: 5)
pub fn create_queue(config: &toml::Value) -> Box<dyn QueueInterface> {
	let visibility_timeout_secs = config
		.get("visibility_timeout_secs")
		.and_then(|v| v.as_integer())
		.unwrap_or(30) as u64;

	let max_receive_count = config
		.get("max_receive_count")
		.and_then(|v| v.as_integer())
		.unwrap_or(5) as u32;

	Box::new(MemoryQueue::new(
		Duration::from_secs(visibility_timeout_secs),
		max_receive_count,
	))
}
