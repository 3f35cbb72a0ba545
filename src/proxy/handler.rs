//! HTTP request handler for the proxy

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, PROXY_AUTHORIZATION};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpStream;

use super::response::{
    bad_gateway_response, decision_response, empty_body, internal_error_response, ProxyBody,
};
use super::tunnel::TunnelHandler;
use crate::auth::{AuthDecision, AuthGate};

/// Main proxy request handler
pub struct ProxyHandler {
    tunnel_handler: Arc<TunnelHandler>,
    gate: Option<Arc<AuthGate>>,
    client_addr: String,
    log_requests: bool,
}

impl ProxyHandler {
    pub fn new(tunnel_handler: Arc<TunnelHandler>, client_addr: impl Into<String>) -> Self {
        Self {
            tunnel_handler,
            gate: None,
            client_addr: client_addr.into(),
            log_requests: false,
        }
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Require authorization through `gate`. Without a gate every request is forwarded.
    pub fn with_gate(mut self, gate: Option<Arc<AuthGate>>) -> Self {
        self.gate = gate;
        self
    }

    /// Run the gate on the blocking pool: it reads a file and may run bcrypt.
    async fn authorize(&self, header: Option<HeaderValue>) -> Option<AuthDecision> {
        let gate = self.gate.clone()?;
        let remote = self.client_addr.clone();

        let decision = tokio::task::spawn_blocking(move || {
            tracing::info_span!("authorize", remote = %remote)
                .in_scope(|| gate.authorize_header(header.as_ref()))
        })
        .await;

        match decision {
            Ok(decision) => Some(decision),
            Err(e) => {
                tracing::error!(error = %e, "authorization task failed");
                Some(AuthDecision::Error(std::io::Error::other(e)))
            }
        }
    }

    /// Handle an incoming proxy request
    pub async fn handle(
        self,
        req: Request<Incoming>,
    ) -> Result<Response<ProxyBody>, hyper::Error> {
        let header = req.headers().get(PROXY_AUTHORIZATION).cloned();
        if let Some(decision) = self.authorize(header).await {
            if let Some(resp) = decision_response(&decision) {
                tracing::warn!(
                    client = %self.client_addr,
                    method = %req.method(),
                    uri = %req.uri(),
                    status = resp.status().as_u16(),
                    "Proxy authorization failed"
                );
                return Ok(resp);
            }
        }

        if req.method() == Method::CONNECT {
            return self.handle_connect(req).await;
        }

        self.handle_http(req).await
    }

    async fn handle_connect(
        self,
        req: Request<Incoming>,
    ) -> Result<Response<ProxyBody>, hyper::Error> {
        let Some(host) = req.uri().host().map(str::to_string) else {
            tracing::warn!(uri = %req.uri(), "CONNECT without a host");
            return Ok(bad_gateway_response("CONNECT target must be host:port"));
        };
        let port = req.uri().port_u16().unwrap_or(443);

        tracing::debug!(host = %host, port = %port, "CONNECT request");

        let upstream = match self.tunnel_handler.connect(&host, port).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(host = %host, port = %port, error = %e, "CONNECT upstream failed");
                return Ok(bad_gateway_response(&e.to_string()));
            }
        };

        if self.log_requests {
            tracing::info!(client = %self.client_addr, host = %host, port = %port, "CONNECT");
        }

        let upgrade = hyper::upgrade::on(req);
        let tunnel_handler = self.tunnel_handler.clone();

        tokio::spawn(async move {
            let upgraded = match upgrade.await {
                Ok(u) => u,
                Err(e) => {
                    tracing::error!(host = %host, error = %e, "Failed to upgrade connection");
                    return;
                }
            };

            if let Err(e) = tunnel_handler.run(upgraded, upstream, &host).await {
                tracing::debug!(host = %host, error = %e, "Tunnel error");
            }
        });

        let mut resp = Response::new(empty_body());
        *resp.status_mut() = StatusCode::OK;
        Ok(resp)
    }

    async fn handle_http(
        self,
        req: Request<Incoming>,
    ) -> Result<Response<ProxyBody>, hyper::Error> {
        let uri = req.uri();
        let Some(host) = uri.host().map(str::to_string) else {
            // Origin-form requests are addressed to the proxy itself.
            tracing::debug!(uri = %uri, "request without an absolute URI");
            return Ok(bad_gateway_response("proxy requests must use an absolute URI"));
        };
        let port = uri.port_u16().unwrap_or(80);

        if self.log_requests {
            tracing::info!(
                client = %self.client_addr,
                method = %req.method(),
                url = %uri,
                "FORWARD"
            );
        }

        match forward_http_request(&host, port, req).await {
            Ok(resp) => Ok(resp),
            Err(ForwardError::Connect(e)) => {
                tracing::error!(host = %host, port = %port, error = %e, "HTTP forwarding error");
                Ok(bad_gateway_response(&e.to_string()))
            }
            Err(ForwardError::Request(e)) => {
                tracing::error!(host = %host, error = %e, "Invalid forwarded request");
                Ok(internal_error_response())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ForwardError {
    #[error("{0}")]
    Connect(Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Request(#[from] hyper::http::Error),
}

impl From<std::io::Error> for ForwardError {
    fn from(e: std::io::Error) -> Self {
        ForwardError::Connect(Box::new(e))
    }
}

impl From<hyper::Error> for ForwardError {
    fn from(e: hyper::Error) -> Self {
        ForwardError::Connect(Box::new(e))
    }
}

/// Hop-by-hop headers that must not be forwarded (RFC 7230 §6.1).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forward a plain HTTP request to the upstream server.
async fn forward_http_request(
    host: &str,
    port: u16,
    req: Request<Incoming>,
) -> Result<Response<ProxyBody>, ForwardError> {
    let tcp = TcpStream::connect((host, port)).await?;
    let io = TokioIo::new(tcp);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "HTTP upstream connection error");
        }
    });

    // Absolute-form to origin-form, minus hop-by-hop headers.
    let (parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut builder = Request::builder()
        .method(parts.method)
        .uri(path_and_query)
        .version(hyper::Version::HTTP_11);

    for (name, value) in &parts.headers {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            builder = builder.header(name, value);
        }
    }

    if !parts.headers.contains_key(hyper::header::HOST) {
        let host_header = if port == 80 {
            host.to_string()
        } else {
            format!("{}:{}", host, port)
        };
        builder = builder.header(hyper::header::HOST, host_header);
    }

    let upstream_req = builder.body(body)?;
    let resp = sender.send_request(upstream_req).await?;

    Ok(resp.map(|b| b.boxed()))
}
