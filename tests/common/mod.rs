//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use storage_proxy::{ProxyConfig, ProxyContext, ProxyServer, Shutdown};

/// Serve `app` on an ephemeral port.
pub async fn start_backend(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Backend that answers `/health` with 200 and every other GET/POST with
/// `{"hits": n, "path": ..., "forwarded_by": ..., "request_id": ...}`.
/// `/missing` answers 404. Each call waits `delay` first.
pub async fn start_counting_backend(delay: Duration) -> (SocketAddr, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    let handler = move |uri: axum::http::Uri, headers: HeaderMap| {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(delay).await;
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            let status = if uri.path() == "/missing" {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(json!({
                    "hits": n,
                    "path": uri.path(),
                    "query": uri.query().unwrap_or_default(),
                    "forwarded_by": header("x-forwarded-by"),
                    "request_id": header("x-request-id"),
                })),
            )
        }
    };

    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .fallback(handler);
    (start_backend(app).await, hits)
}

/// A port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// `[[services]]` TOML block.
pub fn service_toml(name: &str, port: u16, extra: &str) -> String {
    format!(
        "[[services]]\nname = \"{}\"\nhost = \"127.0.0.1\"\nport = {}\n{}\n",
        name, port, extra
    )
}

pub fn config_from_toml(toml_str: &str) -> ProxyConfig {
    toml::from_str(toml_str).unwrap()
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("proxy should stop")
            .unwrap()
            .unwrap();
    }
}

/// Boot the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let ctx = ProxyContext::from_config(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = ProxyServer::new(ctx);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    TestProxy { addr, shutdown, handle }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
