//! Emitter counters
//!
//! Counts are kept in-process and reported through structured logging; there is
//! no exporter.

use crate::error::EmitError;
use serde::Serialize;
use tracing::debug;

/// Running totals for one emitter loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitterStats {
    pub sent: u64,
    pub failed: u64,
}

impl EmitterStats {
    pub fn record_sent(&mut self, robot_id: &str) {
        self.sent += 1;
        debug!(robot_id = %robot_id, sent = self.sent, "Recorded telemetry send");
    }

    pub fn record_failure(&mut self, error: &EmitError, robot_id: &str) {
        self.failed += 1;
        debug!(
            robot_id = %robot_id,
            error_code = error.code(),
            failed = self.failed,
            "Recorded telemetry failure"
        );
    }

    /// Total emit attempts
    pub fn attempts(&self) -> u64 {
        self.sent + self.failed
    }
}
