use std::time::Duration;

use tracing::{info, warn};

/// Delay before the first ping, so the listener is up.
const STARTUP_DELAY: Duration = Duration::from_secs(10);
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Background task that keeps a free-tier host from idling the service by
/// requesting our own `/ping` on an interval.
pub async fn run_self_ping(port: u16, interval: Duration) {
    tokio::time::sleep(STARTUP_DELAY).await;

    let client = match reqwest::Client::builder().timeout(PING_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Self-ping disabled, could not build HTTP client: {}", e);
            return;
        }
    };
    let url = format!("http://127.0.0.1:{}/ping", port);
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match client.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => info!("Self-ping executed on port {}", port),
            Err(e) => warn!("Self-ping failed: {}", e),
        }
    }
}
