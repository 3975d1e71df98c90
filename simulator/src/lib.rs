//! Robot Simulator - generates synthetic robot telemetry and publishes it to a stream
//!
//! Each reading is sampled fresh, serialized to JSON and published to NATS JetStream
//! with the robot id as partition key. Publish failures are logged and retried after
//! a fixed backoff; the loop only stops when cancelled.

pub mod clock;
pub mod config;
pub mod emitter;
pub mod error;
pub mod metrics;
pub mod publisher;
pub mod reading;

pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use config::SimulatorConfig;
pub use emitter::{EmitterSettings, TelemetryEmitter};
pub use error::{EmitError, PublishError};
pub use metrics::EmitterStats;
pub use publisher::{JetStreamPublisher, LogOnlyPublisher, PublishReceipt, TelemetryPublisher};
pub use reading::{generate_reading, TelemetryReading};
