pub mod fixtures;
pub mod outbound;
pub mod relay;

pub use outbound::RecordingOutbound;
pub use relay::MemoryRelay;

use anyhow::{bail, Result};
use std::sync::Once;
use std::time::Duration;
use tacsync::CoordinatorEvent;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("tacsync=debug,tacsync_network=debug,tacsync_test_utils=debug")
            }))
            .with_test_writer()
            .init();
    });
}

/// Receive coordinator events until one matches, skipping the rest
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<CoordinatorEvent>,
    timeout: Duration,
    mut matches: F,
) -> Result<CoordinatorEvent>
where
    F: FnMut(&CoordinatorEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => bail!("event bus closed"),
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => bail!("no matching coordinator event within {:?}", timeout),
    }
}
