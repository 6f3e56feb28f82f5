use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use pubvote_db::RoundStore;

/// Background task that drops rounds past their expiry.
///
/// Expired rounds are already invisible to every store operation; this only
/// keeps the table from growing.
pub async fn run_cleanup_loop(store: Arc<dyn RoundStore>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.delete_expired()).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired rounds", count);
                }
            }
            Ok(Err(e)) => warn!("Cleanup error: {}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}
