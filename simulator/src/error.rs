use thiserror::Error;

/// Failures talking to the streaming service. All of them are transient from the
/// emitter's point of view.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to connect to NATS at {url}: {message}")]
    Connect { url: String, message: String },
    #[error("Failed to set up stream {stream}: {message}")]
    StreamSetup { stream: String, message: String },
    #[error("Publish request to {subject} failed: {message}")]
    Request { subject: String, message: String },
    #[error("Publish to {subject} was not acknowledged: {message}")]
    Ack { subject: String, message: String },
}

/// Failure of a single generate/serialize/publish step
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Failed to serialize telemetry reading: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl EmitError {
    /// Transport failures are expected to clear up on their own; serialization
    /// failures point at a bug in the reading model.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmitError::Publish(_))
    }

    pub fn code(&self) -> &'static str {
        match self {
            EmitError::Serialize(_) => "EMIT_SERIALIZE_ERROR",
            EmitError::Publish(PublishError::Connect { .. }) => "EMIT_CONNECT_ERROR",
            EmitError::Publish(PublishError::StreamSetup { .. }) => "EMIT_STREAM_SETUP_ERROR",
            EmitError::Publish(PublishError::Request { .. }) => "EMIT_PUBLISH_ERROR",
            EmitError::Publish(PublishError::Ack { .. }) => "EMIT_ACK_ERROR",
        }
    }
}
