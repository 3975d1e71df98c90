//! Stream publisher trait and implementations
//!
//! The JetStream publisher owns its NATS connection for the lifetime of the emitter.
//! The log-only publisher is used for dry runs and never touches the network.

use crate::config::SimulatorConfig;
use crate::error::PublishError;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream::Stream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Root of every telemetry subject
pub const SUBJECT_ROOT: &str = "sentinel.telemetry.v1";

/// Header carrying the partition key alongside the subject token
pub const PARTITION_KEY_HEADER: &str = "Sentinel-Partition-Key";

/// Where a payload ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub subject: String,
    /// Stream sequence from the JetStream ack (None when nothing was sent)
    pub sequence: Option<u64>,
}

/// Publisher trait - implement this to send telemetry to a different backend
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Publish one payload to `stream`, routed by `partition_key`
    async fn publish(
        &self,
        stream: &str,
        payload: Vec<u8>,
        partition_key: &str,
    ) -> Result<PublishReceipt, PublishError>;
}

/// Build the subject for a region and partition key
///
/// Subject pattern: sentinel.telemetry.v1.<region>.<partition_key>
pub fn subject_for(region: &str, partition_key: &str) -> String {
    format!(
        "{}.{}.{}",
        SUBJECT_ROOT,
        subject_token(region),
        subject_token(partition_key)
    )
}

/// NATS subject tokens cannot contain separators or wildcards
fn subject_token(raw: &str) -> String {
    let token: String = raw
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();

    if token.is_empty() {
        "_".to_string()
    } else {
        token
    }
}

/// Log-only publisher (dry-run mode)
#[derive(Debug, Clone, Default)]
pub struct LogOnlyPublisher {
    region: String,
}

impl LogOnlyPublisher {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

#[async_trait]
impl TelemetryPublisher for LogOnlyPublisher {
    async fn publish(
        &self,
        stream: &str,
        payload: Vec<u8>,
        partition_key: &str,
    ) -> Result<PublishReceipt, PublishError> {
        let subject = subject_for(&self.region, partition_key);
        info!(
            stream = %stream,
            subject = %subject,
            partition_key = %partition_key,
            payload_size = payload.len(),
            "Telemetry payload (log-only mode)"
        );
        Ok(PublishReceipt {
            subject,
            sequence: None,
        })
    }
}

/// JetStream publisher - publishes telemetry payloads and waits for the ack
pub struct JetStreamPublisher {
    context: jetstream::Context,
    region: String,
    stream_ready: AtomicBool,
}

impl JetStreamPublisher {
    /// Connect to NATS. The stream itself is checked lazily on first publish so an
    /// unreachable server surfaces as a retryable publish failure.
    pub async fn connect(config: &SimulatorConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.nats_url);

        let options = if let Some(creds_path) = &config.nats_creds_path {
            info!("Using credentials file: {}", creds_path);
            async_nats::ConnectOptions::new()
                .credentials_file(creds_path)
                .await
                .context("Failed to load NATS credentials")?
        } else {
            warn!("No NATS credentials provided, connecting without auth");
            async_nats::ConnectOptions::new()
        };

        let client = options
            .retry_on_initial_connect()
            .connect(&config.nats_url)
            .await
            .map_err(|e| PublishError::Connect {
                url: config.nats_url.clone(),
                message: e.to_string(),
            })?;

        info!("NATS client created");
        Ok(Self::from_context(
            jetstream::new(client),
            config.region.clone(),
        ))
    }

    pub fn from_context(context: jetstream::Context, region: String) -> Self {
        Self {
            context,
            region,
            stream_ready: AtomicBool::new(false),
        }
    }

    /// Ensure JetStream stream exists
    async fn ensure_stream(&self, stream_name: &str) -> Result<Stream, PublishError> {
        match self.context.get_stream(stream_name).await {
            Ok(stream) => {
                info!("Found existing stream: {}", stream_name);
                Ok(stream)
            }
            Err(_) => {
                info!("Stream {} not found, creating it", stream_name);
                let stream_config = jetstream::stream::Config {
                    name: stream_name.to_string(),
                    subjects: vec![format!("{}.>", SUBJECT_ROOT)],
                    max_age: Duration::from_secs(3600 * 24), // Retain for 1 day
                    ..Default::default()
                };

                let stream = self
                    .context
                    .get_or_create_stream(stream_config)
                    .await
                    .map_err(|e| PublishError::StreamSetup {
                        stream: stream_name.to_string(),
                        message: e.to_string(),
                    })?;

                info!("Successfully created stream: {}", stream_name);
                Ok(stream)
            }
        }
    }
}

#[async_trait]
impl TelemetryPublisher for JetStreamPublisher {
    async fn publish(
        &self,
        stream: &str,
        payload: Vec<u8>,
        partition_key: &str,
    ) -> Result<PublishReceipt, PublishError> {
        if !self.stream_ready.load(Ordering::Acquire) {
            self.ensure_stream(stream).await?;
            self.stream_ready.store(true, Ordering::Release);
        }

        let subject = subject_for(&self.region, partition_key);

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(PARTITION_KEY_HEADER, partition_key);

        let ack_future = self
            .context
            .publish_with_headers(subject.clone(), headers, payload.into())
            .await
            .map_err(|e| PublishError::Request {
                subject: subject.clone(),
                message: e.to_string(),
            })?;

        let ack = ack_future.await.map_err(|e| PublishError::Ack {
            subject: subject.clone(),
            message: e.to_string(),
        })?;

        if ack.stream != stream {
            warn!(
                expected = %stream,
                actual = %ack.stream,
                subject = %subject,
                "Telemetry landed in a different stream"
            );
        }

        debug!(
            subject = %subject,
            stream = %ack.stream,
            sequence = ack.sequence,
            "Published telemetry reading"
        );

        Ok(PublishReceipt {
            subject,
            sequence: Some(ack.sequence),
        })
    }
}
