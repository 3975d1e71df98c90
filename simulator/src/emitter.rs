//! Telemetry emitter - the generate, serialize, publish, sleep loop

use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::{DEFAULT_ERROR_BACKOFF_SECS, DEFAULT_INTERVAL_SECS, DEFAULT_STREAM_NAME};
use crate::error::EmitError;
use crate::metrics::EmitterStats;
use crate::publisher::{PublishReceipt, TelemetryPublisher};
use crate::reading::generate_reading;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Loop timing and target stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitterSettings {
    pub stream_name: String,
    pub interval: Duration,
    pub error_backoff: Duration,
    /// Stop after this many successful sends; `None` runs until cancelled
    pub max_readings: Option<u64>,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            error_backoff: Duration::from_secs(DEFAULT_ERROR_BACKOFF_SECS),
            max_readings: None,
        }
    }
}

/// Emits synthetic readings for a single robot until cancelled
pub struct TelemetryEmitter<P: TelemetryPublisher> {
    robot_id: String,
    settings: EmitterSettings,
    publisher: Arc<P>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    rng: ChaCha8Rng,
    stats: EmitterStats,
}

impl<P: TelemetryPublisher> TelemetryEmitter<P> {
    /// Create an emitter using the wall clock, the tokio timer and an entropy-seeded sampler
    pub fn new(robot_id: impl Into<String>, settings: EmitterSettings, publisher: Arc<P>) -> Self {
        Self {
            robot_id: robot_id.into(),
            settings,
            publisher,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            rng: ChaCha8Rng::from_entropy(),
            stats: EmitterStats::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    pub fn stats(&self) -> EmitterStats {
        self.stats
    }

    /// Generate one reading, serialize it and publish it keyed by the robot id
    pub async fn emit_once(&mut self) -> Result<PublishReceipt, EmitError> {
        let reading = generate_reading(&self.robot_id, self.clock.as_ref(), &mut self.rng);
        let payload = reading.to_payload()?;

        info!(payload = %payload, "Sending telemetry reading");

        let receipt = self
            .publisher
            .publish(
                &self.settings.stream_name,
                payload.into_bytes(),
                &self.robot_id,
            )
            .await?;

        Ok(receipt)
    }

    /// Run the emit loop until `cancel` fires (or `max_readings` is reached)
    ///
    /// Failures never end the loop: each one is logged and followed by the error
    /// backoff instead of the regular interval.
    pub async fn run_loop(&mut self, cancel: &CancellationToken) -> EmitterStats {
        info!(
            robot_id = %self.robot_id,
            stream = %self.settings.stream_name,
            interval_secs = self.settings.interval.as_secs_f64(),
            error_backoff_secs = self.settings.error_backoff.as_secs_f64(),
            "Simulating data for robot"
        );

        while !cancel.is_cancelled() {
            let delay = match self.emit_once().await {
                Ok(receipt) => {
                    self.stats.record_sent(&self.robot_id);
                    debug!(
                        subject = %receipt.subject,
                        sequence = ?receipt.sequence,
                        "Telemetry reading sent"
                    );

                    if self.limit_reached() {
                        info!(sent = self.stats.sent, "Reached max readings");
                        break;
                    }
                    self.settings.interval
                }
                Err(e) => {
                    self.stats.record_failure(&e, &self.robot_id);
                    if e.is_transient() {
                        warn!(
                            error = %e,
                            code = e.code(),
                            backoff_secs = self.settings.error_backoff.as_secs_f64(),
                            "Failed to send telemetry reading, backing off"
                        );
                    } else {
                        error!(
                            error = %e,
                            code = e.code(),
                            backoff_secs = self.settings.error_backoff.as_secs_f64(),
                            "Failed to build telemetry reading, backing off"
                        );
                    }
                    self.settings.error_backoff
                }
            };

            if !self.pause(delay, cancel).await {
                break;
            }
        }

        info!(
            sent = self.stats.sent,
            failed = self.stats.failed,
            "Simulation stopped"
        );
        self.stats
    }

    fn limit_reached(&self) -> bool {
        self.settings
            .max_readings
            .map(|max| self.stats.sent >= max)
            .unwrap_or(false)
    }

    /// Wait for `delay`; returns false if cancelled first
    async fn pause(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.sleeper.sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::LogOnlyPublisher;

    struct NoSleep;

    #[async_trait::async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    #[tokio::test]
    async fn test_emit_once_with_log_only_publisher() {
        let mut emitter = TelemetryEmitter::new(
            "r1",
            EmitterSettings::default(),
            Arc::new(LogOnlyPublisher::new("us-east-1")),
        );

        let receipt = emitter.emit_once().await.unwrap();
        assert_eq!(receipt.subject, "sentinel.telemetry.v1.us-east-1.r1");
    }

    #[tokio::test]
    async fn test_max_readings_stops_loop() {
        let settings = EmitterSettings {
            max_readings: Some(3),
            ..Default::default()
        };
        let mut emitter =
            TelemetryEmitter::new("r1", settings, Arc::new(LogOnlyPublisher::new("us-east-1")))
                .with_sleeper(Arc::new(NoSleep));

        let stats = emitter.run_loop(&CancellationToken::new()).await;
        assert_eq!(stats, EmitterStats { sent: 3, failed: 0 });
    }

    #[tokio::test]
    async fn test_cancelled_before_start_emits_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut emitter = TelemetryEmitter::new(
            "r1",
            EmitterSettings::default(),
            Arc::new(LogOnlyPublisher::new("us-east-1")),
        );

        let stats = emitter.run_loop(&cancel).await;
        assert_eq!(stats.attempts(), 0);
    }
}
