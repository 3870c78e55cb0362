//! Background expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;

use crate::cache::ResponseCache;

/// Spawn a task that purges expired entries every `interval` until shutdown.
pub fn spawn_cleanup_task(
    cache: Arc<ResponseCache>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = cache.len(), "Purged expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper received shutdown signal");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CachedResponse;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};

    #[tokio::test]
    async fn test_sweeper_purges_cold_keys() {
        let cache = Arc::new(ResponseCache::new(8, Duration::from_secs(60), 1024));
        let value = CachedResponse::new(StatusCode::OK, &HeaderMap::new(), Bytes::from_static(b"x"));
        cache.set("cold", value, Some(Duration::from_millis(10)));

        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_cleanup_task(cache.clone(), Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
