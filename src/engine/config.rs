//! Engine configuration options.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum gap between two stored rate samples of one asset.
    pub sample_throttle_ms: i64,
    /// Window the day-ago rate is searched in.
    pub change_lookback_ms: i64,
    /// Pub/sub channel every notification goes out on.
    pub channel: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_throttle_ms: 3 * Timestamp::HOUR_MS,
            change_lookback_ms: 24 * Timestamp::HOUR_MS,
            channel: "info".to_string(),
        }
    }
}
