use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a watch stream may take to deliver its initial list
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sync_timeout_secs: u64,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl Settings {
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }
}
