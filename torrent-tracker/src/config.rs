use std::time::Duration;

use serde::Deserialize;

use crate::error::TrackerResult;

/// Client-wide settings. Every field has a default, so an empty JSON object
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Port announced to trackers as our listening port.
    pub port: u16,
    /// Local address the UDP socket binds to.
    pub bind_addr: String,
    /// Timeout for the first attempt of a request, doubled on every retry.
    pub base_timeout_secs: u64,
    /// Total number of requests sent before a session gives up.
    pub max_attempts: u32,
    /// How long a connection id stays usable after the connect response.
    pub connection_ttl_secs: u64,
}

impl TrackerConfig {
    pub fn from_json(json: &str) -> TrackerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &str) -> TrackerResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn base_timeout(&self) -> Duration {
        Duration::from_secs(self.base_timeout_secs)
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            port: 6881,
            bind_addr: "0.0.0.0:0".to_string(),
            base_timeout_secs: 15,
            max_attempts: 4,
            connection_ttl_secs: 60,
        }
    }
}
