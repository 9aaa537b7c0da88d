//! Relay lifecycle events and the in-process bus carrying them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{ErrorKind, RejectionReason};
use alloy::primitives::B256;

/// Events published by the orchestrator: one per terminal transition, plus
/// per-attempt submissions and failures for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RelayEvent {
	Received {
		request_id: String,
	},
	Rejected {
		request_id: String,
		reason: RejectionReason,
	},
	Submitted {
		request_id: String,
		attempt: u32,
		tx_hash: B256,
	},
	AttemptFailed {
		request_id: String,
		attempt: u32,
		kind: ErrorKind,
		error: String,
	},
	Settled {
		request_id: String,
		onchain_reference: B256,
		payment_reference: B256,
	},
	PaymentFailed {
		request_id: String,
		onchain_reference: B256,
		error: String,
	},
	DeadLettered {
		request_id: String,
		attempts: u32,
		kind: ErrorKind,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<RelayEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: RelayEvent) -> Result<(), broadcast::error::SendError<RelayEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
