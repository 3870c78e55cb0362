//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream exchanges with the per-request deadline
//! - Turn an elapsed deadline into [`ProxyError::UpstreamTimeout`]
//!
//! Dropping the wrapped future cancels the exchange; the checked-out
//! connection is then discarded by its guard.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::{ProxyError, Result};
use crate::load_balancer::backend::EndpointId;

/// Run `fut` with a deadline of `limit`.
pub async fn with_timeout<T, F>(endpoint: &EndpointId, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProxyError::UpstreamTimeout {
            endpoint: endpoint.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_elapsed_maps_to_upstream_timeout() {
        let endpoint = EndpointId::new("alpha", "127.0.0.1", 9000);
        let result: Result<()> = with_timeout(&endpoint, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ProxyError::UpstreamTimeout { .. })));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let endpoint = EndpointId::new("alpha", "127.0.0.1", 9000);
        let ok = with_timeout(&endpoint, Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }
}
