//! Configuration for the robot simulator

use crate::emitter::EmitterSettings;
use clap::Parser;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
pub const DEFAULT_STREAM_NAME: &str = "sentinel-telemetry-stream";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 10;

/// Configuration for the robot telemetry simulator
#[derive(Debug, Clone, Parser)]
#[command(name = "sentinel-robot-simulator")]
#[command(about = "Generates synthetic robot telemetry and publishes it to a NATS stream")]
pub struct SimulatorConfig {
    /// NATS server URL
    #[arg(long, env, default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// Path to NATS credentials file
    #[arg(long, env)]
    pub nats_creds_path: Option<String>,

    /// JetStream stream name
    #[arg(long, env, default_value = DEFAULT_STREAM_NAME)]
    pub stream_name: String,

    /// Region label, used as a subject token
    #[arg(long, env, default_value = DEFAULT_REGION)]
    pub region: String,

    /// Robot id used for every reading (random UUID if unset)
    #[arg(long, env)]
    pub robot_id: Option<String>,

    /// Delay between readings in seconds
    #[arg(long, env, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval_secs: u64,

    /// Delay after a failed send in seconds
    #[arg(long, env, default_value_t = DEFAULT_ERROR_BACKOFF_SECS)]
    pub error_backoff_secs: u64,

    /// Dry-run mode (log payloads only, no NATS connection)
    #[arg(long, env)]
    pub dry_run: bool,

    /// Seed for the sensor sampler
    #[arg(long, env)]
    pub seed: Option<u64>,

    /// Stop after this many successful sends
    #[arg(long, env)]
    pub max_readings: Option<u64>,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            nats_creds_path: None,
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            region: DEFAULT_REGION.to_string(),
            robot_id: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            error_backoff_secs: DEFAULT_ERROR_BACKOFF_SECS,
            dry_run: false,
            seed: None,
            max_readings: None,
            log_json: false,
        }
    }
}

impl SimulatorConfig {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        SimulatorConfig::parse()
    }

    /// Robot id for this process run. Call once and keep the result; without an
    /// explicit id every call yields a new UUID.
    pub fn resolve_robot_id(&self) -> String {
        match &self.robot_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    pub fn emitter_settings(&self) -> EmitterSettings {
        EmitterSettings {
            stream_name: self.stream_name.clone(),
            interval: Duration::from_secs(self.interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            max_readings: self.max_readings,
        }
    }
}
