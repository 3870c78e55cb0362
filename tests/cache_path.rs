//! End-to-end tests for the cached GET path and forwarding headers.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::Value;

mod common;

async fn cached_proxy(extra: &str) -> (common::TestProxy, std::sync::Arc<std::sync::atomic::AtomicU32>) {
    let (backend, hits) = common::start_counting_backend(Duration::ZERO).await;
    let config = common::config_from_toml(&format!(
        "[health_check]\nenabled = false\n{}{}",
        extra,
        common::service_toml("alpha", backend.port(), "cache = { key_params = [\"x\"] }"),
    ));
    (common::start_proxy(config).await, hits)
}

#[tokio::test]
async fn test_cache_hit_path() {
    let (proxy, hits) = cached_proxy("").await;
    let client = common::client();

    let first = client.get(proxy.url("/service/alpha/items?x=1")).send().await.unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()["x-service-name"], "alpha");
    let first_body = first.text().await.unwrap();

    let second = client.get(proxy.url("/service/alpha/items?x=1")).send().await.unwrap();
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()["x-service-name"], "alpha");
    assert_eq!(second.text().await.unwrap(), first_body);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Parameters outside the whitelist share the cached entry.
    let noisy = client.get(proxy.url("/service/alpha/items?x=1&nonce=9")).send().await.unwrap();
    assert_eq!(noisy.headers()["x-cache"], "HIT");

    let other = client.get(proxy.url("/service/alpha/items?x=2")).send().await.unwrap();
    assert_eq!(other.headers()["x-cache"], "MISS");
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let stats: Value = client.get(proxy.url("/stats")).send().await.unwrap().json().await.unwrap();
    assert_eq!(stats["cache"]["hits"], 2);
    assert_eq!(stats["cache"]["size"], 2);
    assert!(stats["pools"][0]["reused"].as_u64().unwrap() >= 1);
    proxy.stop().await;
}

#[tokio::test]
async fn test_invalidate_service_cache() {
    let (backend, hits) = common::start_counting_backend(Duration::ZERO).await;
    let config = common::config_from_toml(&format!(
        "[health_check]\nenabled = false\n{}{}",
        common::service_toml("alpha", backend.port(), ""),
        common::service_toml("alphabet", backend.port(), ""),
    ));
    let proxy = common::start_proxy(config).await;
    let client = common::client();

    for service in ["alpha", "alphabet"] {
        let url = proxy.url(&format!("/service/{}/items", service));
        client.get(&url).send().await.unwrap();
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.headers()["x-cache"], "HIT");
    }

    let res = client.delete(proxy.url("/cache/alpha")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["removed"], 1);

    let res = client.get(proxy.url("/service/alpha/items")).send().await.unwrap();
    assert_eq!(res.headers()["x-cache"], "MISS");
    let res = client.get(proxy.url("/service/alphabet/items")).send().await.unwrap();
    assert_eq!(res.headers()["x-cache"], "HIT");
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let res = client.delete(proxy.url("/cache/gamma")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    proxy.stop().await;
}

#[tokio::test]
async fn test_post_and_errors_are_not_cached() {
    let (proxy, hits) = cached_proxy("").await;
    let client = common::client();

    for _ in 0..2 {
        let res = client
            .post(proxy.url("/service/alpha/items?x=1"))
            .body("{\"x\":1}")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["x-cache"], "MISS");
    }
    for _ in 0..2 {
        let res = client.get(proxy.url("/service/alpha/missing")).send().await.unwrap();
        assert_eq!(res.status(), 404);
        assert_eq!(res.headers()["x-cache"], "MISS");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    proxy.stop().await;
}

#[tokio::test]
async fn test_cached_entry_expires() {
    let (backend, hits) = common::start_counting_backend(Duration::ZERO).await;
    let config = common::config_from_toml(&format!(
        "[health_check]\nenabled = false\n{}",
        common::service_toml("alpha", backend.port(), "cache = { ttl_secs = 1 }"),
    ));
    let proxy = common::start_proxy(config).await;
    let client = common::client();

    client.get(proxy.url("/service/alpha/items")).send().await.unwrap();
    let hit = client.get(proxy.url("/service/alpha/items")).send().await.unwrap();
    assert_eq!(hit.headers()["x-cache"], "HIT");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let expired = client.get(proxy.url("/service/alpha/items")).send().await.unwrap();
    assert_eq!(expired.headers()["x-cache"], "MISS");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    proxy.stop().await;
}

#[tokio::test]
async fn test_forwarding_headers_and_request_id() {
    let (proxy, _) = cached_proxy("").await;
    let client = common::client();

    let res = client
        .post(proxy.url("/service/alpha/deep/path?q=1"))
        .header("x-request-id", "req-abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "req-abc");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["path"], "/deep/path");
    assert_eq!(body["query"], "q=1");
    assert_eq!(body["forwarded_by"], "storage-proxy");
    assert_eq!(body["request_id"], "req-abc");

    // Generated when the client sends none.
    let res = client.get(proxy.url("/service/alpha/items")).send().await.unwrap();
    let generated = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&generated).is_ok());
    proxy.stop().await;
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = std::env::temp_dir().join(format!("storage-proxy-it-{}", uuid::Uuid::new_v4()));
    let snapshot = dir.join("cache.json");
    let extra = format!("[cache]\nsnapshot_path = {:?}\n", snapshot.to_string_lossy());

    let (backend, hits) = common::start_counting_backend(Duration::ZERO).await;
    let toml_str = format!(
        "[health_check]\nenabled = false\n{}{}",
        extra,
        common::service_toml("alpha", backend.port(), ""),
    );

    let proxy = common::start_proxy(common::config_from_toml(&toml_str)).await;
    common::client().get(proxy.url("/service/alpha/items")).send().await.unwrap();
    proxy.stop().await;
    assert!(snapshot.exists());

    let proxy = common::start_proxy(common::config_from_toml(&toml_str)).await;
    let res = common::client().get(proxy.url("/service/alpha/items")).send().await.unwrap();
    assert_eq!(res.headers()["x-cache"], "HIT");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    proxy.stop().await;

    std::fs::remove_dir_all(dir).ok();
}
