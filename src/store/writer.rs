//! Single-writer save queue.
//!
//! Mutations bump a generation counter on a `watch` channel. One writer task
//! per store waits for the counter to move, snapshots whatever state is
//! current at that moment, and writes it. Bursts of mutations therefore
//! coalesce into one write, and no two writes for a store overlap.

use std::sync::Weak;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::{Shared, StoreEvent};
use crate::error::Result;

/// Outcome of the most recent write the writer finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveStatus {
    /// Highest requested generation covered by that write.
    pub generation: u64,
    /// Final error if every attempt failed.
    pub error: Option<String>,
}

pub(super) async fn run_writer(shared: Weak<Shared>, mut requests: watch::Receiver<u64>) {
    while requests.changed().await.is_ok() {
        let generation = *requests.borrow_and_update();
        let Some(shared) = shared.upgrade() else {
            break;
        };

        let status = match write_with_retry(&shared).await {
            Ok(()) => {
                debug!(key = %shared.key, generation, "Saved codes");
                shared.publish(StoreEvent::Saved { generation });
                SaveStatus {
                    generation,
                    error: None,
                }
            }
            Err(e) => {
                error!(key = %shared.key, generation, error = %e, "Giving up on saving codes");
                let reason = e.to_string();
                shared.publish(StoreEvent::SaveFailed {
                    generation,
                    reason: reason.clone(),
                });
                SaveStatus {
                    generation,
                    error: Some(reason),
                }
            }
        };
        shared.status.send_replace(status);
    }
    debug!("Code store writer stopped");
}

async fn write_with_retry(shared: &Shared) -> Result<()> {
    let mut delay = shared.settings.retry_backoff();
    let mut attempt = 0;
    loop {
        match shared.write_once().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < shared.settings.save_retries => {
                attempt += 1;
                warn!(
                    key = %shared.key,
                    attempt,
                    retry_in_ms = delay.as_millis(),
                    error = %e,
                    "Save failed, retrying"
                );
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}
