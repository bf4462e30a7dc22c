//! TCP server and per-request orchestration
//!
//! Responsibilities:
//! - Accept TCP connections, HTTP/1.1 parsing via hyper
//! - Spawn per-connection tasks
//! - Per-request lifecycle: REQ log line, body inspection, forward or
//!   reject, correlation load-and-clear, RES log line
//!
//! Each request walks Received -> BodyInspecting -> Forwarding|Rejected ->
//! Completed and emits exactly two access-log lines whatever the outcome.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::access_log::AccessLog;
use crate::correlation::CorrelationLog;
use crate::error::{Result, WafError};
use crate::inspect::{InspectionGate, Verdict};
use crate::proxy::ProxyClient;

/// Main server struct tying the gate, correlation log and proxy together
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
    gate: Arc<InspectionGate>,
    correlation: Arc<CorrelationLog>,
    proxy_client: Arc<ProxyClient>,
    access_log: Arc<AccessLog>,
    rejection_status: StatusCode,
}

impl Server {
    pub async fn bind(
        addr: SocketAddr,
        gate: InspectionGate,
        correlation: Arc<CorrelationLog>,
        proxy_client: ProxyClient,
        access_log: AccessLog,
        rejection_status: u16,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WafError::Bind { addr, source: e })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|e| WafError::Config(format!("Failed to get local address: {}", e)))?;

        let rejection_status = StatusCode::from_u16(rejection_status)
            .map_err(|e| WafError::Config(format!("Invalid rejection status: {}", e)))?;

        info!(%actual_addr, "Server bound successfully");

        Ok(Self {
            listener,
            addr: actual_addr,
            gate: Arc::new(gate),
            correlation,
            proxy_client: Arc::new(proxy_client),
            access_log: Arc::new(access_log),
            rejection_status,
        })
    }

    pub async fn run(self) -> Result<()> {
        info!(addr = %self.addr, "Starting server");

        loop {
            let (stream, remote_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(%e, "Failed to accept connection");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let gate = self.gate.clone();
            let correlation = self.correlation.clone();
            let proxy_client = self.proxy_client.clone();
            let access_log = self.access_log.clone();
            let rejection_status = self.rejection_status;

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    handle_request(
                        req,
                        remote_addr,
                        gate.clone(),
                        correlation.clone(),
                        proxy_client.clone(),
                        access_log.clone(),
                        rejection_status,
                    )
                });
                // half_close lets a client that shut its write side mid-upload
                // still receive the error response
                if let Err(e) = http1::Builder::new()
                    .half_close(true)
                    .serve_connection(io, service)
                    .await
                {
                    warn!(%remote_addr, %e, "Connection error");
                }
            });
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Handle a single HTTP request through the full lifecycle
///
/// Flow:
/// 1. Assign transaction id, emit REQ line before touching the body
/// 2. Buffer the body, run the inspection gate
/// 3. Pass: forward to upstream; Block: synthetic rejection, backend
///    never contacted
/// 4. Claim any block record from the correlation log and emit the RES line
async fn handle_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    gate: Arc<InspectionGate>,
    correlation: Arc<CorrelationLog>,
    proxy_client: Arc<ProxyClient>,
    access_log: Arc<AccessLog>,
    rejection_status: StatusCode,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let start = Instant::now();
    let tx_id = correlation.next_id();

    let method = req.method().clone();
    let uri = req.uri().clone();
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let declared_length = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    access_log.req(&method, &uri, content_type.as_deref(), declared_length);

    let (parts, body) = req.into_parts();
    let body_bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            // client went away or the stream broke mid-upload; nothing left
            // to inspect or forward
            warn!(tx_id = %tx_id, %remote_addr, error = %e, "Failed to read request body");
            let response = Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "text/plain")
                .body(Full::new(Bytes::from("Bad Request")))
                .unwrap();
            let block = correlation.load_and_clear(tx_id);
            access_log.res(
                &method,
                &uri,
                response.status(),
                start.elapsed(),
                block.as_ref(),
            );
            return Ok(response);
        }
    };

    let verdict = gate.inspect(
        tx_id,
        content_type.as_deref(),
        &body_bytes,
        &correlation,
        &access_log,
    );

    let response = match verdict {
        Verdict::Pass => {
            let req = Request::from_parts(parts, Full::new(body_bytes));
            match proxy_client.forward(req, remote_addr).await {
                Ok(response) => response,
                Err(e) => {
                    error!(tx_id = %tx_id, %remote_addr, error = %e, "Proxy forward failed");
                    Response::builder()
                        .status(StatusCode::BAD_GATEWAY)
                        .header("Content-Type", "text/plain")
                        .body(Full::new(Bytes::from("Bad Gateway")))
                        .unwrap()
                }
            }
        }
        Verdict::Block(_) => Response::builder()
            .status(rejection_status)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from("Forbidden")))
            .unwrap(),
    };

    // exactly one load-and-clear per request lifecycle, claimed or not
    let block = correlation.load_and_clear(tx_id);
    access_log.res(
        &method,
        &uri,
        response.status(),
        start.elapsed(),
        block.as_ref(),
    );

    Ok(response)
}
