//! Shared HTTP client configuration: one factory function, sane
//! timeouts, a descriptive user agent.

use std::time::Duration;

use reqwest::Client;
use stackpatch_core::Error;

/// No timeout is imposed at the application layer beyond the HTTP
/// client's own connect timeout, per §5's "none imposed" policy — this
/// only bounds how long a connection attempt may hang before the
/// classifier calls it a timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `"<short-name>/<version> (<os-description>)"`, per §6.
pub fn user_agent() -> String {
    let os = whoami::distro();
    format!(
        "{}/{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        os
    )
}

/// Builds the process-global HTTP client used for mirror/manifest
/// downloads.
pub fn build_patch_client() -> Result<Client, Error> {
    Client::builder()
        .user_agent(user_agent())
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Other(format!("failed to create HTTP client: {e}")))
}
