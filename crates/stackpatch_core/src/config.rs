//! Ambient operational settings: knobs for how the binary behaves, not
//! part of the domain model in [`crate::entities`].
//! Kept separate from [`crate::entities::RunConfig`], which is the patch
//! stack's own configuration and has no sensible default.

use serde::{Deserialize, Serialize};

/// Persisted operational settings: how chatty logging is and how the
/// update engine's network layer behaves by default. `RunConfig` supplies
/// the patch stack itself; this only supplies knobs around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    /// Number of files the update engine may fetch concurrently across
    /// patches. The core's own update loop is sequential per §4.I; this
    /// bounds a caller that chooses to fan updates out itself.
    pub download_concurrency: u32,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            download_concurrency: 4,
            request_timeout_secs: 30,
        }
    }
}
