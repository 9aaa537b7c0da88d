//! Relay orchestration.
//!
//! [`RelayEngine`] drives every dequeued request through the lifecycle:
//! signature and nonce verification, payment policy, execution with a bounded
//! retry budget, then payment collection. Terminal states release the queue
//! message; infrastructure failures leave it in flight so the queue
//! redelivers it after the visibility timeout.
//!
//! The engine is assembled through [`RelayBuilder`], which takes a factory
//! for each pluggable boundary and instantiates the implementations the
//! configuration names.

pub mod inflight;

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use backoff::{backoff::Backoff, ExponentialBackoff};
use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use relayer_config::Config;
use relayer_custody::{CustodyError, CustodyInterface, CustodyService};
use relayer_execution::{
	ExecutionContext, ExecutionError, ExecutionHandle, ExecutionInterface, ExecutionOutcome,
	ExecutionService,
};
use relayer_policy::{FeeOracle, OracleError, PolicyDecision, PolicyEvaluator};
use relayer_queue::{QueueError, QueueInterface, QueueMessage, QueueService};
use relayer_storage::{
	StorageError, StorageInterface, StorageService, ESCALATIONS_NAMESPACE, OUTCOMES_NAMESPACE,
};
use relayer_types::{
	ErrorKind, EscalationRecord, EventBus, ExecutionParams, PaymentAuthorization, RejectionReason,
	RelayEvent, RelayOutcome, RelayStatus, SignedRequest,
};
use relayer_verifier::RequestVerifier;

use crate::inflight::InflightRegistry;

#[derive(Debug, Error)]
pub enum RelayError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Queue error: {0}")]
	Queue(#[from] QueueError),
	#[error("Execution error: {0}")]
	Execution(#[from] ExecutionError),
	#[error("Oracle error: {0}")]
	Oracle(#[from] OracleError),
	#[error("Engine error: {0}")]
	Engine(String),
}

/// How a request's execution phase ended.
enum Resolution {
	Confirmed { execution_ref: B256 },
	Exhausted { kind: ErrorKind, error: String },
}

/// Queue-driven relay orchestrator.
///
/// Cloning is cheap; each worker task runs on its own clone.
#[derive(Clone)]
pub struct RelayEngine {
	config: Config,
	verifier: Arc<RequestVerifier>,
	policy: Arc<PolicyEvaluator>,
	execution: Arc<ExecutionService>,
	queue: Arc<QueueService>,
	storage: Arc<StorageService>,
	event_bus: EventBus,
	inflight: InflightRegistry,
	shutdown: broadcast::Sender<()>,
}

impl RelayEngine {
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn verifier(&self) -> Arc<RequestVerifier> {
		self.verifier.clone()
	}

	pub fn queue(&self) -> Arc<QueueService> {
		self.queue.clone()
	}

	pub fn storage(&self) -> Arc<StorageService> {
		self.storage.clone()
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Handle for requesting engine shutdown from outside the run loop.
	pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
		self.shutdown.clone()
	}

	/// Runs the polling loop until a shutdown signal arrives.
	///
	/// Dequeues up to `workers` messages per poll and processes each on its
	/// own task; a worker holds a semaphore permit for the whole delivery.
	/// In-flight deliveries are drained before the loop returns.
	pub async fn run(&self) -> Result<(), RelayError> {
		let workers = self.config.relayer.workers;
		let poll_interval = Duration::from_millis(self.config.relayer.poll_interval_ms);
		let semaphore = Arc::new(Semaphore::new(workers));
		let mut shutdown = self.shutdown.subscribe();
		let mut tasks: JoinSet<()> = JoinSet::new();

		info!(
			name = %self.config.relayer.name,
			workers,
			poll_interval_ms = self.config.relayer.poll_interval_ms,
			"relay engine started"
		);

		loop {
			while tasks.try_join_next().is_some() {}

			tokio::select! {
				_ = shutdown.recv() => {
					info!("shutdown signal received, draining in-flight deliveries");
					break;
				}
				_ = tokio::time::sleep(poll_interval) => {
					let capacity = semaphore.available_permits();
					if capacity == 0 {
						continue;
					}
					let messages = match self.queue.receive(capacity).await {
						Ok(messages) => messages,
						Err(e) => {
							warn!(error = %e, "queue receive failed");
							continue;
						}
					};
					for message in messages {
						let permit = semaphore
							.clone()
							.acquire_owned()
							.await
							.map_err(|_| RelayError::Engine("worker semaphore closed".to_string()))?;
						let engine = self.clone();
						tasks.spawn(async move {
							engine.process_delivery(message).await;
							drop(permit);
						});
					}
				}
			}
		}

		while tasks.join_next().await.is_some() {}
		info!("relay engine stopped");
		Ok(())
	}

	/// Processes one queue delivery end to end.
	///
	/// Terminal outcomes release the message inside; an infrastructure error
	/// leaves it in flight for redelivery.
	async fn process_delivery(&self, message: QueueMessage) {
		let signed: SignedRequest = match serde_json::from_slice(&message.body) {
			Ok(signed) => signed,
			Err(e) => {
				warn!(message_id = %message.id, error = %e, "undecodable queue message");
				if let Err(e) = self
					.queue
					.dead_letter(&message.receipt, &format!("undecodable body: {}", e))
					.await
				{
					warn!(error = %e, "failed to dead-letter undecodable message");
				}
				return;
			}
		};

		let request_id = self.verifier.request_id(&signed.request);
		if let Err(e) = self.handle_request(&request_id, &signed, &message).await {
			warn!(
				request_id = %request_id,
				error = %e,
				"delivery aborted, leaving message for redelivery"
			);
		}
	}

	async fn handle_request(
		&self,
		request_id: &str,
		signed: &SignedRequest,
		message: &QueueMessage,
	) -> Result<(), RelayError> {
		let from = signed.request.from;

		// One request per identity at a time; the successor of an in-flight
		// nonce waits here instead of racing it on-chain.
		let inflight = self.inflight.acquire(from).await;

		let mut outcome = self.load_or_seed_outcome(request_id, from).await?;
		if outcome.status.is_terminal() {
			debug!(
				request_id,
				status = ?outcome.status,
				"redelivery of a completed request, releasing"
			);
			self.delete_message(message).await;
			return Ok(());
		}

		let prior_status = outcome.status;
		let prior_error = outcome.error.clone();
		self.set_status(&mut outcome, RelayStatus::Verifying, None).await?;

		let current_nonce = self.execution.forwarder_nonce(from).await?;
		match signed.request.nonce.cmp(&current_nonce) {
			Ordering::Greater => {
				// A predecessor has not executed yet. The wait is bounded:
				// a request still ahead after the hold budget is
				// dead-lettered with a recorded outcome rather than
				// recycled until the queue backstop eats it.
				if message.receive_count >= self.config.retry.max_holds {
					warn!(
						request_id,
						request_nonce = %signed.request.nonce,
						current_nonce = %current_nonce,
						deliveries = message.receive_count,
						"hold budget spent, predecessor never executed"
					);
					let error = format!(
						"nonce {} still ahead of the forwarder after {} deliveries",
						signed.request.nonce, message.receive_count
					);
					return self
						.dead_letter_exhausted(
							&mut outcome,
							ErrorKind::NonceMismatch,
							error,
							"predecessor never executed",
							message,
						)
						.await;
				}
				// Leave the message in flight; it comes back after the
				// visibility timeout.
				debug!(
					request_id,
					request_nonce = %signed.request.nonce,
					current_nonce = %current_nonce,
					"nonce ahead of the forwarder, holding back"
				);
				return Ok(());
			}
			Ordering::Less => {
				// Either a stale replay, or our own timed-out submission
				// landed after the confirmation window and moved the nonce.
				let landed = outcome.attempts > 0
					&& matches!(
						prior_status,
						RelayStatus::Executing
							| RelayStatus::Confirmed
							| RelayStatus::CollectingPayment
					) && current_nonce == signed.request.nonce + U256::from(1u64);
				if landed {
					if let Some(execution_ref) = outcome.onchain_reference {
						info!(request_id, "earlier submission landed, resuming payment collection");
						drop(inflight);
						return self
							.collect_payment(&mut outcome, signed, execution_ref, message)
							.await;
					}
				}
				return self.reject(&mut outcome, RejectionReason::NonceMismatch, message).await;
			}
			Ordering::Equal => {}
		}

		if !self.verifier.verify(&signed.request, &signed.signature, current_nonce) {
			return self.reject(&mut outcome, RejectionReason::InvalidSignature, message).await;
		}
		if let Some(payment_signature) = &signed.payment.payment_signature {
			let authorization = PaymentAuthorization {
				from,
				payment: signed.payment.payment,
				nonce: signed.request.nonce,
			};
			if !self.verifier.verify_payment(&authorization, payment_signature) {
				return self.reject(&mut outcome, RejectionReason::InvalidSignature, message).await;
			}
		}

		let allowance = self.execution.payment_allowance(from).await?;
		let required = self.policy.required_payment(signed.request.gas).await?;
		match self.policy.evaluate(signed.payment.payment, allowance, required) {
			PolicyDecision::Rejected(reason) => {
				return self.reject(&mut outcome, reason, message).await;
			}
			PolicyDecision::Approved { required_payment } => {
				debug!(
					request_id,
					payment = %signed.payment.payment,
					required = %required_payment,
					"payment policy cleared"
				);
			}
		}
		self.set_status(&mut outcome, RelayStatus::Verified, None).await?;

		match self
			.execute_with_retries(&mut outcome, signed, prior_status, prior_error)
			.await?
		{
			Resolution::Confirmed { execution_ref } => {
				// The nonce has moved; the identity's successor may proceed
				// while payment is collected.
				drop(inflight);
				self.collect_payment(&mut outcome, signed, execution_ref, message).await
			}
			Resolution::Exhausted { kind, error } => {
				drop(inflight);
				self.dead_letter_exhausted(&mut outcome, kind, error, "retry budget exhausted", message)
					.await
			}
		}
	}

	/// Runs execution attempts until one confirms or the retry budget is
	/// spent. The attempt counter lives on the persisted outcome, so a
	/// redelivered request resumes its budget instead of resetting it.
	async fn execute_with_retries(
		&self,
		outcome: &mut RelayOutcome,
		signed: &SignedRequest,
		prior_status: RelayStatus,
		prior_error: Option<String>,
	) -> Result<Resolution, RelayError> {
		let max_attempts = self.config.retry.max_retries + 1;
		let mut backoff = self.retry_backoff();
		// A redelivered request that spent its budget in earlier deliveries
		// dead-letters with the failure it last recorded.
		let mut last_failure = match prior_status {
			RelayStatus::Reverted => (
				ErrorKind::ExecutionReverted,
				prior_error.unwrap_or_default(),
			),
			_ => (ErrorKind::ExecutionTimeout, prior_error.unwrap_or_default()),
		};

		while outcome.attempts < max_attempts {
			// Fees are sampled before the attempt slot is consumed; a failed
			// estimate abandons the delivery without spending budget.
			let params = self.execution.fee_estimate().await?;
			outcome.attempts += 1;
			let attempt = outcome.attempts;
			self.set_status(outcome, RelayStatus::Executing, None).await?;

			let handle = match self.submit_with_custodian_retry(signed, &params).await {
				Ok(handle) => handle,
				Err(error) => {
					// The submission never reached the ledger. Roll the
					// attempt back and abandon the delivery.
					outcome.attempts -= 1;
					self.store_outcome(outcome).await?;
					if matches!(&error, ExecutionError::Custodian(CustodyError::Unavailable(_))) {
						self.emit(RelayEvent::AttemptFailed {
							request_id: outcome.request_id.clone(),
							attempt,
							kind: ErrorKind::CustodianUnavailable,
							error: error.to_string(),
						});
					}
					return Err(error.into());
				}
			};

			outcome.onchain_reference = Some(handle.tx_hash);
			self.store_outcome(outcome).await?;
			self.emit(RelayEvent::Submitted {
				request_id: outcome.request_id.clone(),
				attempt,
				tx_hash: handle.tx_hash,
			});
			debug!(
				request_id = %outcome.request_id,
				attempt,
				tx_hash = %handle.tx_hash,
				"execution submitted"
			);

			match self.execution.wait_for_outcome(&handle).await? {
				ExecutionOutcome::Confirmed(receipt) => {
					self.set_status(outcome, RelayStatus::Confirmed, None).await?;
					info!(
						request_id = %outcome.request_id,
						attempt,
						tx_hash = %receipt.tx_hash,
						block = receipt.block_number,
						"execution confirmed"
					);
					return Ok(Resolution::Confirmed { execution_ref: receipt.tx_hash });
				}
				ExecutionOutcome::Reverted { reason } => {
					warn!(
						request_id = %outcome.request_id,
						attempt,
						reason = %reason,
						"execution reverted"
					);
					self.emit(RelayEvent::AttemptFailed {
						request_id: outcome.request_id.clone(),
						attempt,
						kind: ErrorKind::ExecutionReverted,
						error: reason.clone(),
					});
					self.set_status(outcome, RelayStatus::Reverted, Some(reason.clone())).await?;
					last_failure = (ErrorKind::ExecutionReverted, reason);
				}
				ExecutionOutcome::TimedOut => {
					let error = "no confirmation inside the attempt window".to_string();
					warn!(request_id = %outcome.request_id, attempt, "execution attempt timed out");
					self.emit(RelayEvent::AttemptFailed {
						request_id: outcome.request_id.clone(),
						attempt,
						kind: ErrorKind::ExecutionTimeout,
						error: error.clone(),
					});
					self.set_status(outcome, RelayStatus::Executing, Some(error.clone())).await?;

					// The transaction may have landed after the window. The
					// forwarder nonce is the ground truth.
					let nonce_now = self.execution.forwarder_nonce(signed.request.from).await?;
					if nonce_now > signed.request.nonce {
						info!(
							request_id = %outcome.request_id,
							"timed-out submission landed, proceeding to payment"
						);
						self.set_status(outcome, RelayStatus::Confirmed, None).await?;
						return Ok(Resolution::Confirmed { execution_ref: handle.tx_hash });
					}
					last_failure = (ErrorKind::ExecutionTimeout, error);
				}
			}

			if outcome.attempts < max_attempts {
				if let Some(delay) = backoff.next_backoff() {
					debug!(
						request_id = %outcome.request_id,
						delay_ms = delay.as_millis() as u64,
						"backing off before retry"
					);
					tokio::time::sleep(delay).await;
				}
			}
		}

		let (kind, error) = last_failure;
		Ok(Resolution::Exhausted { kind, error })
	}

	/// Collects the authorized payment for a confirmed execution.
	///
	/// A payment submitted by an earlier delivery is never resubmitted; the
	/// recorded transaction decides the outcome. A failed collection is
	/// escalated, never retried, so the executed transfer cannot be silently
	/// unpaid.
	async fn collect_payment(
		&self,
		outcome: &mut RelayOutcome,
		signed: &SignedRequest,
		execution_ref: B256,
		message: &QueueMessage,
	) -> Result<(), RelayError> {
		outcome.onchain_reference = Some(execution_ref);
		self.set_status(outcome, RelayStatus::CollectingPayment, None).await?;

		if let Some(payment_ref) = outcome.payment_reference {
			let handle = ExecutionHandle { tx_hash: payment_ref };
			return match self.execution.wait_for_outcome(&handle).await? {
				ExecutionOutcome::Confirmed(receipt) => {
					self.settle(outcome, execution_ref, receipt.tx_hash, message).await
				}
				ExecutionOutcome::Reverted { reason } => {
					self.payment_failed(outcome, signed, execution_ref, reason, message).await
				}
				ExecutionOutcome::TimedOut => {
					self.payment_failed(
						outcome,
						signed,
						execution_ref,
						"payment confirmation timed out".to_string(),
						message,
					)
					.await
				}
			};
		}

		let params = self.execution.fee_estimate().await?;
		let handle = self
			.submit_payment_with_custodian_retry(signed.request.from, signed.payment.payment, &params)
			.await?;
		outcome.payment_reference = Some(handle.tx_hash);
		self.store_outcome(outcome).await?;
		debug!(
			request_id = %outcome.request_id,
			tx_hash = %handle.tx_hash,
			amount = %signed.payment.payment,
			"payment collection submitted"
		);

		match self.execution.wait_for_outcome(&handle).await? {
			ExecutionOutcome::Confirmed(receipt) => {
				self.settle(outcome, execution_ref, receipt.tx_hash, message).await
			}
			ExecutionOutcome::Reverted { reason } => {
				self.payment_failed(outcome, signed, execution_ref, reason, message).await
			}
			ExecutionOutcome::TimedOut => {
				self.payment_failed(
					outcome,
					signed,
					execution_ref,
					"payment confirmation timed out".to_string(),
					message,
				)
				.await
			}
		}
	}

	async fn settle(
		&self,
		outcome: &mut RelayOutcome,
		execution_ref: B256,
		payment_ref: B256,
		message: &QueueMessage,
	) -> Result<(), RelayError> {
		outcome.payment_reference = Some(payment_ref);
		self.set_status(outcome, RelayStatus::Settled, None).await?;
		self.emit(RelayEvent::Settled {
			request_id: outcome.request_id.clone(),
			onchain_reference: execution_ref,
			payment_reference: payment_ref,
		});
		info!(
			request_id = %outcome.request_id,
			execution = %execution_ref,
			payment = %payment_ref,
			attempts = outcome.attempts,
			"request settled"
		);
		self.delete_message(message).await;
		Ok(())
	}

	async fn payment_failed(
		&self,
		outcome: &mut RelayOutcome,
		signed: &SignedRequest,
		execution_ref: B256,
		error: String,
		message: &QueueMessage,
	) -> Result<(), RelayError> {
		// The escalation record is written before the status flips; if the
		// write fails the delivery aborts and a redelivery lands here again.
		let escalation = EscalationRecord {
			request_id: outcome.request_id.clone(),
			from: signed.request.from,
			payment: signed.payment.payment,
			onchain_reference: Some(execution_ref),
			error: error.clone(),
			created_at: chrono::Utc::now().timestamp(),
		};
		self.storage
			.store(ESCALATIONS_NAMESPACE, &outcome.request_id, &escalation)
			.await?;

		self.set_status(outcome, RelayStatus::PaymentFailed, Some(error.clone())).await?;
		self.emit(RelayEvent::PaymentFailed {
			request_id: outcome.request_id.clone(),
			onchain_reference: execution_ref,
			error: error.clone(),
		});
		error!(
			request_id = %outcome.request_id,
			execution = %execution_ref,
			error = %error,
			"payment collection failed, escalating"
		);
		if let Err(e) = self.queue.dead_letter(&message.receipt, "payment collection failed").await {
			warn!(error = %e, "failed to dead-letter message");
		}
		Ok(())
	}

	async fn reject(
		&self,
		outcome: &mut RelayOutcome,
		reason: RejectionReason,
		message: &QueueMessage,
	) -> Result<(), RelayError> {
		self.set_status(outcome, RelayStatus::Rejected, Some(reason.to_string())).await?;
		self.emit(RelayEvent::Rejected {
			request_id: outcome.request_id.clone(),
			reason,
		});
		info!(request_id = %outcome.request_id, %reason, "request rejected");
		self.delete_message(message).await;
		Ok(())
	}

	async fn dead_letter_exhausted(
		&self,
		outcome: &mut RelayOutcome,
		kind: ErrorKind,
		error: String,
		reason: &str,
		message: &QueueMessage,
	) -> Result<(), RelayError> {
		self.set_status(outcome, RelayStatus::DeadLettered, Some(error)).await?;
		self.emit(RelayEvent::DeadLettered {
			request_id: outcome.request_id.clone(),
			attempts: outcome.attempts,
			kind,
		});
		error!(
			request_id = %outcome.request_id,
			attempts = outcome.attempts,
			reason,
			"dead-lettering request"
		);
		if let Err(e) = self.queue.dead_letter(&message.receipt, reason).await {
			warn!(error = %e, "failed to dead-letter message");
		}
		Ok(())
	}

	/// Submits the forward execution, absorbing transient custodian
	/// unavailability. These retries are bounded by their own counter and do
	/// not consume the request's execution budget; when they run out the
	/// error propagates and the delivery is abandoned for redelivery.
	async fn submit_with_custodian_retry(
		&self,
		signed: &SignedRequest,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		let mut remaining = self.config.retry.custodian_retries;
		loop {
			match self.execution.submit(signed, params).await {
				Err(ExecutionError::Custodian(CustodyError::Unavailable(reason)))
					if remaining > 0 =>
				{
					remaining -= 1;
					warn!(%reason, remaining, "custodian unavailable, retrying");
					tokio::time::sleep(Duration::from_millis(
						self.config.retry.custodian_backoff_ms,
					))
					.await;
				}
				result => return result,
			}
		}
	}

	async fn submit_payment_with_custodian_retry(
		&self,
		from: Address,
		amount: U256,
		params: &ExecutionParams,
	) -> Result<ExecutionHandle, ExecutionError> {
		let mut remaining = self.config.retry.custodian_retries;
		loop {
			match self.execution.submit_payment(from, amount, params).await {
				Err(ExecutionError::Custodian(CustodyError::Unavailable(reason)))
					if remaining > 0 =>
				{
					remaining -= 1;
					warn!(%reason, remaining, "custodian unavailable, retrying");
					tokio::time::sleep(Duration::from_millis(
						self.config.retry.custodian_backoff_ms,
					))
					.await;
				}
				result => return result,
			}
		}
	}

	fn retry_backoff(&self) -> ExponentialBackoff {
		ExponentialBackoff {
			initial_interval: Duration::from_millis(self.config.retry.initial_backoff_ms),
			max_interval: Duration::from_secs(self.config.retry.max_backoff_secs),
			max_elapsed_time: None,
			..Default::default()
		}
	}

	async fn load_or_seed_outcome(
		&self,
		request_id: &str,
		from: Address,
	) -> Result<RelayOutcome, RelayError> {
		match self.storage.retrieve::<RelayOutcome>(OUTCOMES_NAMESPACE, request_id).await {
			Ok(outcome) => Ok(outcome),
			Err(StorageError::NotFound) => Ok(RelayOutcome {
				request_id: request_id.to_string(),
				from,
				status: RelayStatus::Received,
				onchain_reference: None,
				payment_reference: None,
				error: None,
				attempts: 0,
				updated_at: chrono::Utc::now().timestamp(),
			}),
			Err(e) => Err(e.into()),
		}
	}

	async fn set_status(
		&self,
		outcome: &mut RelayOutcome,
		status: RelayStatus,
		error: Option<String>,
	) -> Result<(), RelayError> {
		outcome.status = status;
		outcome.error = error;
		outcome.updated_at = chrono::Utc::now().timestamp();
		self.store_outcome(outcome).await
	}

	async fn store_outcome(&self, outcome: &RelayOutcome) -> Result<(), RelayError> {
		self.storage.store(OUTCOMES_NAMESPACE, &outcome.request_id, outcome).await?;
		Ok(())
	}

	async fn delete_message(&self, message: &QueueMessage) {
		if let Err(e) = self.queue.delete(&message.receipt).await {
			warn!(message_id = %message.id, error = %e, "failed to delete queue message");
		}
	}

	fn emit(&self, event: RelayEvent) {
		// Send fails only when no subscriber is attached.
		let _ = self.event_bus.publish(event);
	}
}

/// Factory for queue implementations.
pub type QueueFactory = Box<dyn Fn(&toml::Value) -> Box<dyn QueueInterface> + Send>;
/// Factory for storage implementations.
pub type StorageFactory = Box<dyn Fn(&toml::Value) -> Box<dyn StorageInterface> + Send>;
/// Factory for key custodian implementations.
pub type CustodyFactory = Box<dyn Fn(&toml::Value) -> Box<dyn CustodyInterface> + Send>;
/// Factory for execution adapter implementations.
pub type ExecutionFactory =
	Box<dyn Fn(&toml::Value, ExecutionContext) -> Box<dyn ExecutionInterface> + Send>;
/// Factory for fee oracle implementations.
pub type OracleFactory = Box<dyn Fn(&toml::Value) -> Box<dyn FeeOracle> + Send>;

/// Builder for the relay engine.
///
/// The binary registers a factory per boundary; [`build`](Self::build)
/// instantiates exactly the implementations the configuration names and
/// wires them together.
pub struct RelayBuilder {
	config: Config,
	queue_factory: Option<QueueFactory>,
	storage_factory: Option<StorageFactory>,
	custody_factory: Option<CustodyFactory>,
	execution_factory: Option<ExecutionFactory>,
	oracle_factory: Option<OracleFactory>,
}

impl RelayBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			queue_factory: None,
			storage_factory: None,
			custody_factory: None,
			execution_factory: None,
			oracle_factory: None,
		}
	}

	pub fn with_queue_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn QueueInterface> + Send + 'static,
	{
		self.queue_factory = Some(Box::new(factory));
		self
	}

	pub fn with_storage_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn StorageInterface> + Send + 'static,
	{
		self.storage_factory = Some(Box::new(factory));
		self
	}

	pub fn with_custody_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn CustodyInterface> + Send + 'static,
	{
		self.custody_factory = Some(Box::new(factory));
		self
	}

	pub fn with_execution_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value, ExecutionContext) -> Box<dyn ExecutionInterface> + Send + 'static,
	{
		self.execution_factory = Some(Box::new(factory));
		self
	}

	pub fn with_oracle_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Box<dyn FeeOracle> + Send + 'static,
	{
		self.oracle_factory = Some(Box::new(factory));
		self
	}

	/// Instantiates the configured implementations and assembles the engine.
	pub fn build(self) -> Result<RelayEngine, RelayError> {
		let config = self.config;

		let queue_backend = self
			.queue_factory
			.ok_or_else(|| RelayError::Config("Queue factory not provided".to_string()))?(
			&config.queue.config,
		);
		let queue = Arc::new(QueueService::new(queue_backend));

		let storage_backend = self
			.storage_factory
			.ok_or_else(|| RelayError::Config("Storage factory not provided".to_string()))?(
			&config.storage.config,
		);
		let storage = Arc::new(StorageService::new(storage_backend));

		let custodian = self
			.custody_factory
			.ok_or_else(|| RelayError::Config("Custody factory not provided".to_string()))?(
			&config.custody.config,
		);
		let custody = Arc::new(CustodyService::new(custodian));

		let context = ExecutionContext {
			chain_id: config.domain.chain_id,
			forwarder: config.domain.verifying_contract,
			payment_token: config.payment.token,
			custody,
		};
		let adapter = self
			.execution_factory
			.ok_or_else(|| RelayError::Config("Execution factory not provided".to_string()))?(
			&config.execution.config,
			context,
		);
		let execution = Arc::new(ExecutionService::new(adapter));

		let oracle = if config.payment.dynamic_pricing {
			let oracle_config = config.oracle.as_ref().ok_or_else(|| {
				RelayError::Config("Dynamic pricing requires an [oracle] section".to_string())
			})?;
			let factory = self
				.oracle_factory
				.ok_or_else(|| RelayError::Config("Oracle factory not provided".to_string()))?;
			Some(factory(&oracle_config.config))
		} else {
			None
		};
		let policy = Arc::new(PolicyEvaluator::new(
			config.payment.min_payment,
			config.payment.markup,
			oracle,
		));

		let verifier = Arc::new(RequestVerifier::new(
			config.domain.chain_id,
			config.domain.verifying_contract,
		));

		let (shutdown, _) = broadcast::channel(1);

		Ok(RelayEngine {
			config,
			verifier,
			policy,
			execution,
			queue,
			storage,
			event_bus: EventBus::new(1000),
			inflight: InflightRegistry::new(),
			shutdown,
		})
	}
}
