//! Keep-alive self-ping for always-on deployments.
//!
//! Free-tier hosts idle instances out after a few minutes without
//! traffic. When KEEPALIVE_URL is set we GET it on a fixed interval.
//! Ping failures are logged and swallowed (they must never affect the
//! main event flow), and the task shuts down cleanly via its
//! cancellation token.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Interval between pings. Render idles instances after 15 minutes.
const PING_INTERVAL: Duration = Duration::from_secs(14 * 60);

/// Per-request timeout; a hung ping is treated like a failed one.
const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns the keep-alive task. Cancel the token to stop it.
pub fn spawn_keepalive(url: String, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(PING_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                log::error!("Failed to build keep-alive HTTP client: {}", e);
                return;
            }
        };

        log::info!("Keep-alive task started (pinging {} every {}s)", url, PING_INTERVAL.as_secs());
        let mut ticker = interval(PING_INTERVAL);
        // The first tick fires immediately; skip it so startup traffic
        // doesn't double up with the dispatcher coming online.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("Keep-alive task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match client.get(&url).send().await {
                        Ok(response) => log::debug!("Keep-alive ping: {}", response.status()),
                        Err(e) => log::warn!("Keep-alive ping failed: {}", e),
                    }
                }
            }
        }
    })
}
