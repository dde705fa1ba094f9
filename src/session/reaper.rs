//! Background maintenance for the session registry.
//!
//! Periodically sweeps the registry: sessions idle past the configured
//! threshold are evicted (their interpreter killed), and interpreters that
//! exited on their own are logged and their process slots released.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::registry::SessionRegistry;

/// Spawn the registry sweep task.
///
/// `max_idle` of `None` disables eviction; exited interpreters are still
/// detected. The task stops when `cancel` fires.
#[must_use]
pub fn spawn_idle_reaper(
    registry: Arc<SessionRegistry>,
    max_idle: Option<Duration>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("session reaper shutting down");
                        break;
                    }
                    () = tokio::time::sleep(interval) => {}
                }

                let report = registry.sweep(max_idle).await;

                for key in &report.exited {
                    warn!(session_key = %key, "interpreter exited unexpectedly");
                }
                if !report.evicted.is_empty() {
                    info!(count = report.evicted.len(), "evicted idle sessions");
                }
            }
        }
        .instrument(info_span!("session_reaper")),
    )
}
