//! CONNECT tunnelling
//!
//! Once a CONNECT request is authorized the client connection is upgraded
//! and spliced byte-for-byte to the upstream TCP connection. Nothing inside
//! the tunnel is inspected.

use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Relays an upgraded client connection to `host:port`.
#[derive(Debug, Clone, Default)]
pub struct TunnelHandler {
    log_requests: bool,
}

impl TunnelHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Open the upstream connection. Done before answering the CONNECT so
    /// an unreachable target surfaces as a 502 instead of a dead tunnel.
    pub async fn connect(&self, host: &str, port: u16) -> Result<TcpStream> {
        let addr = format!("{}:{}", host, port);
        TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::proxy(format!("Failed to connect to {}: {}", addr, e)))
    }

    /// Copy bytes in both directions until either side closes.
    pub async fn run(&self, upgraded: Upgraded, mut upstream: TcpStream, host: &str) -> Result<()> {
        let mut client = TokioIo::new(upgraded);

        let (from_client, from_upstream) =
            tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;

        if self.log_requests {
            tracing::info!(
                host = %host,
                sent = from_client,
                received = from_upstream,
                "tunnel closed"
            );
        }
        Ok(())
    }
}
