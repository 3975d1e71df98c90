//! Telemetry reading model and synthetic sensor sampling

use crate::clock::Clock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Motor temperature in Celsius
pub const MOTOR_TEMP_RANGE: RangeInclusive<f64> = 55.0..=75.0;
/// Battery voltage in Volts
pub const BATTERY_VOLTAGE_RANGE: RangeInclusive<f64> = 22.0..=24.5;
/// Vibration in g-force
pub const VIBRATION_RANGE: RangeInclusive<f64> = 0.1..=2.5;

pub const MOTOR_TEMP_DECIMALS: i32 = 2;
pub const BATTERY_VOLTAGE_DECIMALS: i32 = 2;
pub const VIBRATION_DECIMALS: i32 = 3;

/// One synthetic snapshot of robot sensor values (matches the stream payload schema)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TelemetryReading {
    pub robot_id: String,
    pub timestamp: i64,
    pub motor_temp: f64,
    pub battery_voltage: f64,
    pub vibration: f64,
}

impl TelemetryReading {
    /// Encode the reading as the UTF-8 JSON payload published to the stream
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Build a reading for `robot_id` with freshly sampled sensor values
pub fn generate_reading<R: Rng>(
    robot_id: &str,
    clock: &dyn Clock,
    rng: &mut R,
) -> TelemetryReading {
    TelemetryReading {
        robot_id: robot_id.to_string(),
        timestamp: clock.now_epoch_secs(),
        motor_temp: round_to(rng.gen_range(MOTOR_TEMP_RANGE), MOTOR_TEMP_DECIMALS),
        battery_voltage: round_to(
            rng.gen_range(BATTERY_VOLTAGE_RANGE),
            BATTERY_VOLTAGE_DECIMALS,
        ),
        vibration: round_to(rng.gen_range(VIBRATION_RANGE), VIBRATION_DECIMALS),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
