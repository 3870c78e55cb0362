//! HTTP/1.1 upstream connections.
//!
//! Each [`UpstreamConnection`] owns the request half of a hyper client
//! connection; the connection driver runs on its own task and ends when the
//! socket closes or the sender is dropped.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::error::{ProxyError, Result};
use crate::load_balancer::backend::EndpointId;
use crate::pool::{ConnectionPool, Upstream};

/// Pool of HTTP/1.1 connections to one endpoint.
pub type UpstreamPool = ConnectionPool<UpstreamConnection>;

pub struct UpstreamConnection {
    endpoint: EndpointId,
    sender: SendRequest<Body>,
}

impl std::fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl UpstreamConnection {
    /// Open a TCP connection and complete the HTTP/1.1 handshake.
    pub async fn connect(endpoint: EndpointId, connect_timeout: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint.authority)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProxyError::UpstreamConnect { endpoint, source }),
            Err(_) => {
                return Err(ProxyError::UpstreamTimeout {
                    endpoint,
                    elapsed_ms: connect_timeout.as_millis() as u64,
                })
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(endpoint = %endpoint, error = %e, "Failed to set TCP_NODELAY on upstream connection");
        }

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| ProxyError::UpstreamProtocol {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        let driver_endpoint = endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(endpoint = %driver_endpoint, error = %e, "Upstream connection closed with error");
            }
        });

        Ok(Self { endpoint, sender })
    }

    /// Send one request over this connection.
    pub async fn send(&mut self, request: Request<Body>) -> Result<Response<Incoming>> {
        self.sender.ready().await.map_err(|e| self.protocol_error(e))?;
        self.sender
            .send_request(request)
            .await
            .map_err(|e| self.protocol_error(e))
    }

    fn protocol_error(&self, e: hyper::Error) -> ProxyError {
        ProxyError::UpstreamProtocol {
            endpoint: self.endpoint.clone(),
            message: e.to_string(),
        }
    }
}

impl Upstream for UpstreamConnection {
    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}
