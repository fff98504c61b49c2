//! Runtime configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tunables for a [`crate::client::SyncClient`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Rows fetched by the seed and by each poll.
    pub page_size: usize,
    /// Polling-mode interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Name written into history entries.
    pub acting_user: String,
    /// Capacity of the [`crate::runtime::events::SyncEvent`] broadcast.
    pub event_capacity: usize,
    /// Bound of the runtime command queue.
    pub command_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            poll_interval_ms: 8_000,
            acting_user: "You".to_string(),
            event_capacity: 1024,
            command_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON object; missing keys keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
