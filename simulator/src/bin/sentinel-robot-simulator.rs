//! Robot simulator binary - publishes synthetic telemetry until interrupted

use anyhow::Context;
use robot_simulator::{
    EmitterStats, JetStreamPublisher, LogOnlyPublisher, SimulatorConfig, TelemetryEmitter,
    TelemetryPublisher,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SimulatorConfig::parse_config();
    init_tracing(config.log_json);

    let robot_id = config.resolve_robot_id();

    info!("Starting Sentinel Robot Simulator");
    info!("Configuration:");
    info!("  Robot: {}", robot_id);
    info!("  Stream: {}", config.stream_name);
    info!("  Region: {}", config.region);
    info!("  Interval: {}s", config.interval_secs);
    info!("  Error backoff: {}s", config.error_backoff_secs);
    info!("  Dry-run: {}", config.dry_run);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping simulation"),
            Err(e) => warn!("Failed to listen for interrupt: {}", e),
        }
        signal_token.cancel();
    });

    let stats = if config.dry_run {
        info!("Using log-only publisher (dry-run mode)");
        let publisher = Arc::new(LogOnlyPublisher::new(config.region.clone()));
        run_emitter(&config, robot_id, publisher, &cancel).await
    } else {
        let publisher = JetStreamPublisher::connect(&config)
            .await
            .context("Failed to create NATS publisher")?;
        run_emitter(&config, robot_id, Arc::new(publisher), &cancel).await
    };

    info!(sent = stats.sent, failed = stats.failed, "Simulator exited");
    Ok(())
}

/// Run the emitter loop with the specified publisher
async fn run_emitter<P: TelemetryPublisher + 'static>(
    config: &SimulatorConfig,
    robot_id: String,
    publisher: Arc<P>,
    cancel: &CancellationToken,
) -> EmitterStats {
    let mut emitter = TelemetryEmitter::new(robot_id, config.emitter_settings(), publisher);
    if let Some(seed) = config.seed {
        emitter = emitter.with_seed(seed);
    }

    emitter.run_loop(cancel).await
}
