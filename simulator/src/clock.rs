//! Time sources for the emitter loop
//!
//! The emitter never calls the system clock or sleeps directly, so tests can drive
//! the loop with fixed timestamps and without real delays.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Source of reading timestamps (seconds since the Unix epoch)
pub trait Clock: Send + Sync {
    fn now_epoch_secs(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Waits between loop iterations
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
