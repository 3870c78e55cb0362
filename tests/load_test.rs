//! Load testing for the storage proxy.

use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_load_reuses_pooled_connections() {
    let (backend, _) = common::start_counting_backend(Duration::ZERO).await;
    let config = common::config_from_toml(&format!(
        "[health_check]\nenabled = false\n[pool]\nmax_connections = 16\n{}",
        common::service_toml("alpha", backend.port(), "cache = { enabled = false }"),
    ));
    let proxy = common::start_proxy(config).await;
    let client = common::client();

    let total_requests = 400;
    let concurrency = 8;
    let start = Instant::now();

    let statuses: Vec<u16> = stream::iter(0..total_requests)
        .map(|i| {
            let client = client.clone();
            let url = proxy.url(&format!("/service/alpha/items/{}", i));
            async move {
                match client.get(url).send().await {
                    Ok(res) => res.status().as_u16(),
                    Err(_) => 0,
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let elapsed = start.elapsed();
    let ok = statuses.iter().filter(|s| **s == 200).count();
    println!(
        "{} requests in {:?} ({:.0} req/s), {} ok",
        total_requests,
        elapsed,
        total_requests as f64 / elapsed.as_secs_f64(),
        ok
    );
    assert_eq!(ok, total_requests);

    let stats: Value = client.get(proxy.url("/stats")).send().await.unwrap().json().await.unwrap();
    let pool = &stats["pools"][0];
    assert!(pool["created"].as_u64().unwrap() < 100);
    assert!(pool["reused"].as_u64().unwrap() > 0);
    assert_eq!(pool["exhausted"], 0);
    proxy.stop().await;
}
