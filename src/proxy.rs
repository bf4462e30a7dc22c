//! Reverse proxy to the upstream backend
//!
//! Handles request forwarding with:
//! - Connection pooling to the backend
//! - Header rewriting (X-Forwarded-For, X-Real-IP, Host)
//! - Request timeout
//!
//! Requests arrive with the body already buffered because the inspection
//! gate consumed it; the same bytes are forwarded unchanged.

use std::net::SocketAddr;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{HeaderMap, Request, Response, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::error::{Result, WafError};

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream backend URL (e.g., "http://localhost:3000")
    pub upstream_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Preserve Host header from original request
    pub preserve_host: bool,
}

impl ProxyConfig {
    pub fn new(upstream_url: String) -> Self {
        Self {
            upstream_url,
            timeout: Duration::from_secs(30),
            preserve_host: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_preserve_host(mut self, preserve: bool) -> Self {
        self.preserve_host = preserve;
        self
    }
}

/// Reverse proxy client with connection pooling
pub struct ProxyClient {
    config: ProxyConfig,
    client: Client<HttpConnector, Full<Bytes>>,
    upstream_uri: Uri,
}

impl ProxyClient {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let upstream_uri: Uri = config
            .upstream_url
            .parse()
            .map_err(|e| WafError::Config(format!("Invalid upstream URL: {}", e)))?;

        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            config,
            client,
            upstream_uri,
        })
    }

    /// Forward the request to the backend and return the buffered response
    /// together with its status code.
    pub async fn forward(
        &self,
        mut req: Request<Full<Bytes>>,
        client_addr: SocketAddr,
    ) -> Result<Response<Full<Bytes>>> {
        let upstream_path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let upstream_uri = format!(
            "{}://{}{}",
            self.upstream_uri.scheme_str().unwrap_or("http"),
            self.upstream_uri
                .authority()
                .map(|a| a.as_str())
                .unwrap_or("localhost"),
            upstream_path
        );

        *req.uri_mut() = upstream_uri
            .parse()
            .map_err(|e| WafError::Upstream(format!("Failed to parse upstream URI: {}", e)))?;

        self.rewrite_headers(req.headers_mut(), client_addr);

        let response = tokio::time::timeout(self.config.timeout, self.client.request(req))
            .await
            .map_err(|_| WafError::Upstream("Upstream request timeout".to_string()))?
            .map_err(|e| WafError::Upstream(format!("Upstream request failed: {}", e)))?;

        let (parts, body) = response.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map_err(|e| WafError::Upstream(format!("Failed to read upstream response: {}", e)))?
            .to_bytes();

        let response = Response::from_parts(parts, Full::new(body_bytes));

        Ok(response)
    }

    /// Rewrite request headers for proxy
    fn rewrite_headers(&self, headers: &mut HeaderMap, client_addr: SocketAddr) {
        let client_ip = client_addr.ip().to_string();
        if let Some(existing) = headers.get("x-forwarded-for") {
            if let Ok(value) = existing.to_str() {
                let new_value = format!("{}, {}", value, client_ip);
                if let Ok(header) = new_value.parse() {
                    headers.insert("x-forwarded-for", header);
                }
            }
        } else if let Ok(header) = client_ip.parse() {
            headers.insert("x-forwarded-for", header);
        }

        if let Ok(header) = client_addr.ip().to_string().parse() {
            headers.insert("x-real-ip", header);
        }

        if !self.config.preserve_host {
            if let Some(authority) = self.upstream_uri.authority() {
                if let Ok(header) = authority.as_str().parse() {
                    headers.insert("host", header);
                }
            }
        }

        headers.remove("connection");
        headers.remove("keep-alive");
        headers.remove("proxy-authenticate");
        headers.remove("proxy-authorization");
        headers.remove("te");
        headers.remove("trailers");
        headers.remove("transfer-encoding");
        headers.remove("upgrade");
    }
}
