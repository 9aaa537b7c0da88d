use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relayer_config::ConfigLoader;
use relayer_core::RelayBuilder;
use relayer_types::RelayEvent;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod factories;

#[derive(Parser)]
#[command(name = "token-relayer")]
#[command(about = "Meta-transaction relay service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "RELAYER_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the relay service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting relay service");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Relayer name: {}", config.relayer.name);
	info!("Chain id: {}", config.domain.chain_id);
	info!("Forwarder: {}", config.domain.verifying_contract);
	info!("HTTP port: {}", config.relayer.http_port);

	let builder = factories::register(RelayBuilder::new(config.clone()), &config)?;
	let engine = builder.build().context("Failed to build relay engine")?;

	// Keep at least one event subscriber alive for the engine's lifetime.
	tokio::spawn(log_events(engine.event_bus().subscribe()));

	let api = api::ApiServer::new(config.relayer.http_port, &engine);
	let api_handle = tokio::spawn(async move {
		if let Err(e) = api.run().await {
			error!(error = %e, "API server exited");
		}
	});

	let shutdown = engine.shutdown_handle();
	let engine_handle = tokio::spawn({
		let engine = engine.clone();
		async move { engine.run().await }
	});

	info!("Relay service started");

	shutdown_signal().await;
	info!("Shutdown signal received, stopping services");

	let _ = shutdown.send(());
	engine_handle
		.await
		.context("Engine task panicked")?
		.context("Engine exited with an error")?;
	api_handle.abort();

	info!("Relay service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Relayer name: {}", config.relayer.name);
	info!("Chain id: {}", config.domain.chain_id);
	info!("Forwarder: {}", config.domain.verifying_contract);
	info!("Payment token: {}", config.payment.token);
	info!("Minimum payment: {}", config.payment.min_payment);
	info!("Dynamic pricing: {}", config.payment.dynamic_pricing);
	info!("Implementations:");
	info!("  Queue: {}", config.queue.implementation);
	info!("  Storage: {}", config.storage.implementation);
	info!("  Custody: {}", config.custody.implementation);
	info!("  Execution: {}", config.execution.implementation);
	if let Some(oracle) = &config.oracle {
		info!("  Oracle: {}", oracle.implementation);
	}

	Ok(())
}

/// Logs relay events as they happen. Terminal transitions surface at info or
/// above; per-attempt failures at warn.
async fn log_events(mut events: broadcast::Receiver<RelayEvent>) {
	loop {
		match events.recv().await {
			Ok(RelayEvent::Received { request_id }) => {
				info!(%request_id, "event: request received");
			}
			Ok(RelayEvent::Rejected { request_id, reason }) => {
				info!(%request_id, %reason, "event: request rejected");
			}
			Ok(RelayEvent::Submitted { request_id, attempt, tx_hash }) => {
				info!(%request_id, attempt, %tx_hash, "event: execution submitted");
			}
			Ok(RelayEvent::AttemptFailed { request_id, attempt, kind, error }) => {
				warn!(%request_id, attempt, ?kind, %error, "event: attempt failed");
			}
			Ok(RelayEvent::Settled { request_id, onchain_reference, payment_reference }) => {
				info!(
					%request_id,
					%onchain_reference,
					%payment_reference,
					"event: request settled"
				);
			}
			Ok(RelayEvent::PaymentFailed { request_id, onchain_reference, error }) => {
				error!(%request_id, %onchain_reference, %error, "event: payment failed");
			}
			Ok(RelayEvent::DeadLettered { request_id, attempts, kind }) => {
				error!(%request_id, attempts, ?kind, "event: request dead-lettered");
			}
			Err(broadcast::error::RecvError::Lagged(skipped)) => {
				warn!(skipped, "event logger lagged behind");
			}
			Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
