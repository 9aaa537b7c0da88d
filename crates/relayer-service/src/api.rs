//! HTTP ingestion and status endpoints.
//!
//! `POST /requests` performs shape checks only and enqueues; signature and
//! policy verification happen in the engine so the endpoint stays fast and
//! the queue remains the single entry point into the state machine.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use relayer_core::RelayEngine;
use relayer_queue::QueueService;
use relayer_storage::{StorageError, StorageService, OUTCOMES_NAMESPACE};
use relayer_types::{EventBus, RelayEvent, RelayOutcome, RelayStatus, SignedRequest};
use relayer_verifier::RequestVerifier;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

const SIGNATURE_LENGTH: usize = 65;

pub struct ApiServer {
	port: u16,
	state: AppState,
}

#[derive(Clone)]
struct AppState {
	verifier: Arc<RequestVerifier>,
	queue: Arc<QueueService>,
	storage: Arc<StorageService>,
	event_bus: EventBus,
}

impl ApiServer {
	pub fn new(port: u16, engine: &RelayEngine) -> Self {
		Self {
			port,
			state: AppState {
				verifier: engine.verifier(),
				queue: engine.queue(),
				storage: engine.storage(),
				event_bus: engine.event_bus().clone(),
			},
		}
	}

	pub async fn run(self) -> anyhow::Result<()> {
		let app = router(self.state);
		let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;
		info!("API server listening on port {}", self.port);
		axum::serve(listener, app).await?;
		Ok(())
	}
}

fn router(state: AppState) -> Router {
	Router::new()
		.route("/requests", post(submit_request))
		.route("/requests/{id}", get(get_request))
		.route("/health", get(health_check))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

/// Accepts a signed forward request for relay.
///
/// Returns 202 with the request id once the request is recorded and
/// enqueued. A resubmission of a known request reports its current position
/// instead of enqueueing a duplicate, with one exception: a request rejected
/// earlier starts a fresh lifecycle, since the payment rides outside the
/// signed digest and a corrected offer arrives under the same id.
async fn submit_request(
	State(state): State<AppState>,
	Json(signed): Json<SignedRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
	if signed.signature.len() != SIGNATURE_LENGTH {
		return (
			StatusCode::BAD_REQUEST,
			Json(serde_json::json!({ "error": "signature must be 65 bytes" })),
		);
	}
	if let Some(payment_signature) = &signed.payment.payment_signature {
		if payment_signature.len() != SIGNATURE_LENGTH {
			return (
				StatusCode::BAD_REQUEST,
				Json(serde_json::json!({ "error": "payment signature must be 65 bytes" })),
			);
		}
	}

	let request_id = state.verifier.request_id(&signed.request);

	if let Ok(outcome) = state
		.storage
		.retrieve::<RelayOutcome>(OUTCOMES_NAMESPACE, &request_id)
		.await
	{
		// A rejection never reached the ledger, so the nonce is still
		// spendable; the resubmission falls through and reseeds the record.
		if outcome.status != RelayStatus::Rejected {
			return (
				StatusCode::OK,
				Json(serde_json::json!({
					"request_id": request_id,
					"status": outcome.status,
				})),
			);
		}
		info!(request_id = %request_id, "resubmission of a rejected request, starting over");
	}

	let outcome = RelayOutcome {
		request_id: request_id.clone(),
		from: signed.request.from,
		status: RelayStatus::Received,
		onchain_reference: None,
		payment_reference: None,
		error: None,
		attempts: 0,
		updated_at: chrono::Utc::now().timestamp(),
	};
	if let Err(e) = state
		.storage
		.store(OUTCOMES_NAMESPACE, &request_id, &outcome)
		.await
	{
		return (
			StatusCode::INTERNAL_SERVER_ERROR,
			Json(serde_json::json!({ "error": format!("failed to record request: {}", e) })),
		);
	}

	let body = match serde_json::to_vec(&signed) {
		Ok(body) => body,
		Err(e) => {
			return (
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(serde_json::json!({ "error": format!("failed to encode request: {}", e) })),
			);
		}
	};
	if let Err(e) = state.queue.publish(body).await {
		return (
			StatusCode::INTERNAL_SERVER_ERROR,
			Json(serde_json::json!({ "error": format!("failed to enqueue request: {}", e) })),
		);
	}

	let _ = state.event_bus.publish(RelayEvent::Received {
		request_id: request_id.clone(),
	});
	info!(request_id = %request_id, from = %signed.request.from, "request accepted");

	(
		StatusCode::ACCEPTED,
		Json(serde_json::json!({
			"request_id": request_id,
			"status": RelayStatus::Received,
		})),
	)
}

/// Returns the persisted outcome record for a request id.
async fn get_request(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
	match state
		.storage
		.retrieve::<RelayOutcome>(OUTCOMES_NAMESPACE, &id)
		.await
	{
		Ok(outcome) => match serde_json::to_value(&outcome) {
			Ok(value) => (StatusCode::OK, Json(value)),
			Err(e) => (
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(serde_json::json!({ "error": format!("failed to encode outcome: {}", e) })),
			),
		},
		Err(StorageError::NotFound) => (
			StatusCode::NOT_FOUND,
			Json(serde_json::json!({ "error": "unknown request" })),
		),
		Err(e) => (
			StatusCode::INTERNAL_SERVER_ERROR,
			Json(serde_json::json!({ "error": format!("storage failure: {}", e) })),
		),
	}
}

async fn health_check() -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "ok",
		"timestamp": chrono::Utc::now().timestamp(),
	}))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::{Address, Bytes, U256};
	use alloy::signers::local::PrivateKeySigner;
	use alloy::signers::SignerSync;
	use relayer_queue::implementations::memory::MemoryQueue;
	use relayer_queue::QueueInterface;
	use relayer_storage::implementations::memory::MemoryStorage;
	use relayer_types::{ForwardRequest, PaymentInfo};
	use std::time::Duration;

	fn test_state() -> (AppState, MemoryQueue) {
		let queue = MemoryQueue::new(Duration::from_secs(30), 5);
		let state = AppState {
			verifier: Arc::new(RequestVerifier::new(31337, Address::repeat_byte(0x42))),
			queue: Arc::new(QueueService::new(Box::new(queue.clone()))),
			storage: Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			event_bus: EventBus::new(16),
		};
		(state, queue)
	}

	fn stored_outcome(request_id: &str, from: Address, status: RelayStatus) -> RelayOutcome {
		RelayOutcome {
			request_id: request_id.to_string(),
			from,
			status,
			onchain_reference: None,
			payment_reference: None,
			error: None,
			attempts: 0,
			updated_at: 0,
		}
	}

	fn signed_request(state: &AppState, signer: &PrivateKeySigner) -> SignedRequest {
		let request = ForwardRequest {
			from: signer.address(),
			to: Address::repeat_byte(0x77),
			value: U256::ZERO,
			gas: U256::from(100_000u64),
			nonce: U256::ZERO,
			data: Bytes::new(),
		};
		let digest = state.verifier.request_digest(&request);
		let signature = signer.sign_hash_sync(&digest).expect("signing succeeds");
		SignedRequest {
			request,
			signature: Bytes::from(signature.as_bytes().to_vec()),
			payment: PaymentInfo {
				payment: U256::from(2_000u64),
				payment_signature: None,
			},
		}
	}

	#[tokio::test]
	async fn submission_is_recorded_and_enqueued() {
		let (state, queue) = test_state();
		let signer = PrivateKeySigner::random();
		let signed = signed_request(&state, &signer);
		let request_id = state.verifier.request_id(&signed.request);

		let (status, Json(body)) =
			submit_request(State(state.clone()), Json(signed.clone())).await;
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(body["request_id"], request_id);
		assert_eq!(body["status"], "Received");
		assert_eq!(queue.pending().await, 1);

		let (status, Json(body)) = get_request(State(state), Path(request_id.clone())).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["request_id"], request_id);
		assert_eq!(body["status"], "Received");

		// The enqueued body decodes back to the submitted request.
		let messages = queue.receive(1).await.unwrap();
		let enqueued: SignedRequest = serde_json::from_slice(&messages[0].body).unwrap();
		assert_eq!(enqueued.request.from, signer.address());
	}

	#[tokio::test]
	async fn malformed_signature_is_refused() {
		let (state, queue) = test_state();
		let signer = PrivateKeySigner::random();
		let mut signed = signed_request(&state, &signer);
		signed.signature = Bytes::from(vec![0u8; 64]);

		let (status, Json(body)) = submit_request(State(state), Json(signed)).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert!(body["error"].as_str().unwrap().contains("65 bytes"));
		assert_eq!(queue.pending().await, 0);
	}

	#[tokio::test]
	async fn duplicate_submission_reports_current_position() {
		let (state, queue) = test_state();
		let signer = PrivateKeySigner::random();
		let signed = signed_request(&state, &signer);

		let (status, _) = submit_request(State(state.clone()), Json(signed.clone())).await;
		assert_eq!(status, StatusCode::ACCEPTED);
		let (status, Json(body)) = submit_request(State(state), Json(signed)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "Received");
		assert_eq!(queue.pending().await, 1);
	}

	#[tokio::test]
	async fn unknown_request_is_not_found() {
		let (state, _queue) = test_state();
		let (status, Json(body)) =
			get_request(State(state), Path("0xdeadbeef".to_string())).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		assert_eq!(body["error"], "unknown request");
	}

	#[tokio::test]
	async fn corrected_resubmission_supersedes_a_rejection() {
		let (state, queue) = test_state();
		let signer = PrivateKeySigner::random();
		let mut signed = signed_request(&state, &signer);
		let request_id = state.verifier.request_id(&signed.request);

		let mut rejected =
			stored_outcome(&request_id, signer.address(), RelayStatus::Rejected);
		rejected.error = Some("payment below minimum".to_string());
		state
			.storage
			.store(OUTCOMES_NAMESPACE, &request_id, &rejected)
			.await
			.unwrap();

		// The payment is outside the signed digest; raising it keeps the
		// signature and the request id.
		signed.payment.payment = U256::from(1_000_000u64);
		let (status, Json(body)) = submit_request(State(state.clone()), Json(signed)).await;
		assert_eq!(status, StatusCode::ACCEPTED);
		assert_eq!(body["request_id"], request_id);
		assert_eq!(body["status"], "Received");
		assert_eq!(queue.pending().await, 1);

		let stored: RelayOutcome = state
			.storage
			.retrieve(OUTCOMES_NAMESPACE, &request_id)
			.await
			.unwrap();
		assert_eq!(stored.status, RelayStatus::Received);
		assert_eq!(stored.attempts, 0);
		assert!(stored.error.is_none());

		let messages = queue.receive(1).await.unwrap();
		let enqueued: SignedRequest = serde_json::from_slice(&messages[0].body).unwrap();
		assert_eq!(enqueued.payment.payment, U256::from(1_000_000u64));
	}

	#[tokio::test]
	async fn settled_request_is_not_resubmitted() {
		let (state, queue) = test_state();
		let signer = PrivateKeySigner::random();
		let signed = signed_request(&state, &signer);
		let request_id = state.verifier.request_id(&signed.request);

		let settled = stored_outcome(&request_id, signer.address(), RelayStatus::Settled);
		state
			.storage
			.store(OUTCOMES_NAMESPACE, &request_id, &settled)
			.await
			.unwrap();

		let (status, Json(body)) = submit_request(State(state), Json(signed)).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["status"], "Settled");
		assert_eq!(queue.pending().await, 0);
	}
}
