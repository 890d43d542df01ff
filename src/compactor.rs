use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{StoreError, WalKv};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once `threshold` appends have piled up. Returns whether it ran.
pub async fn compact_if_needed(store: &WalKv, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await?;
    if appends < threshold {
        return Ok(false);
    }
    store.compact().await?;
    info!("compacted taken-date log after {appends} appends");
    Ok(true)
}

/// Background task: periodically compact the store's log. Exits when the
/// store's writer is gone.
pub async fn run_compactor(store: Arc<WalKv>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        match compact_if_needed(&store, threshold).await {
            Ok(_) => {}
            Err(StoreError::Closed(msg)) => {
                debug!("compactor stopping: {msg}");
                break;
            }
            Err(e) => warn!("compaction failed: {e}"),
        }
    }
}
