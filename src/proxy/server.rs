//! Main proxy server

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::handler::ProxyHandler;
use super::tunnel::TunnelHandler;
use crate::auth::AuthGate;
use crate::config::Config;
use crate::error::{Error, Result};

/// The main proxy server
pub struct ProxyServer {
    config: Config,
    gate: Option<Arc<AuthGate>>,
    tls_acceptor: Option<TlsAcceptor>,
    tunnel_handler: Arc<TunnelHandler>,
    listener: Option<TcpListener>,
}

impl ProxyServer {
    /// Create a new proxy server from configuration
    pub fn new(config: Config) -> Result<Self> {
        let gate = config
            .proxy
            .authorization
            .enabled_passwdfile()
            .map(|path| {
                let span = tracing::info_span!("auth", passwdfile = %path);
                Arc::new(AuthGate::from_htpasswd(path, span))
            });

        let tls_acceptor = if config.ssl.enabled {
            let pem = config
                .ssl
                .pem
                .as_deref()
                .ok_or_else(|| Error::config("SSL certificate path not specified"))?;
            let key = config
                .ssl
                .key
                .as_deref()
                .ok_or_else(|| Error::config("SSL key path not specified"))?;
            Some(load_tls_acceptor(pem, key)?)
        } else {
            None
        };

        let tunnel_handler =
            Arc::new(TunnelHandler::new().with_request_logging(config.proxy.logging));

        tracing::info!(
            authorization = gate.is_some(),
            tls = tls_acceptor.is_some(),
            "Proxy initialized"
        );

        Ok(Self {
            config,
            gate,
            tls_acceptor,
            tunnel_handler,
            listener: None,
        })
    }

    /// Replace the authorization gate (e.g. one backed by another credential store).
    pub fn with_gate(mut self, gate: Option<Arc<AuthGate>>) -> Self {
        self.gate = gate;
        self
    }

    /// Run the proxy server with graceful shutdown
    pub async fn run_until_shutdown(
        mut self,
        shutdown: tokio::sync::oneshot::Receiver<()>,
    ) -> Result<()> {
        let local_addr = self.bind().await?;
        tracing::info!(
            address = %local_addr,
            tls = self.tls_acceptor.is_some(),
            "Proxy server listening"
        );
        self.serve(shutdown).await
    }

    /// Bind the server to its configured address and return the local address.
    ///
    /// Useful when binding to port 0 to discover the assigned port.
    /// Call `serve()` afterwards to start accepting connections.
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let addr = self.config.server.socket_addr()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::proxy(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::proxy(format!("Failed to get local address: {}", e)))?;

        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Serve connections using a previously bound listener until `shutdown` fires.
    pub async fn serve(mut self, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::proxy("serve() called before bind()"))?;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    return Ok(());
                }
                result = listener.accept() => {
                    let (stream, client_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    tracing::debug!(client = %client_addr, "New connection");
                    let context = self.connection_context();
                    let client = client_addr.to_string();
                    match self.tls_acceptor.clone() {
                        Some(acceptor) => {
                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls) => context.serve_connection(tls, client).await,
                                    Err(e) => {
                                        tracing::debug!(
                                            client = %client,
                                            error = %e,
                                            "TLS handshake failed"
                                        );
                                    }
                                }
                            });
                        }
                        None => {
                            tokio::spawn(context.serve_connection(stream, client));
                        }
                    }
                }
            }
        }
    }

    fn connection_context(&self) -> ConnectionContext {
        ConnectionContext {
            gate: self.gate.clone(),
            tunnel_handler: self.tunnel_handler.clone(),
            log_requests: self.config.proxy.logging,
        }
    }

    /// Get the configured listen address
    pub fn bind_address(&self) -> &str {
        &self.config.server.addr
    }

    /// Whether requests must pass authorization
    pub fn requires_authorization(&self) -> bool {
        self.gate.is_some()
    }
}

/// Everything a spawned connection task needs.
struct ConnectionContext {
    gate: Option<Arc<AuthGate>>,
    tunnel_handler: Arc<TunnelHandler>,
    log_requests: bool,
}

impl ConnectionContext {
    async fn serve_connection<S>(self, stream: S, client_addr: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let remote = client_addr.clone();

        let service = service_fn(move |req| {
            let handler = ProxyHandler::new(self.tunnel_handler.clone(), remote.clone())
                .with_request_logging(self.log_requests)
                .with_gate(self.gate.clone());
            async move { handler.handle(req).await }
        });

        if let Err(e) = http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(true)
            .serve_connection(io, service)
            .with_upgrades()
            .await
        {
            tracing::debug!(client = %client_addr, error = %e, "Connection error");
        }
    }
}

/// Build a TLS acceptor from a PEM certificate chain and private key.
pub fn load_tls_acceptor(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<TlsAcceptor> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();

    let cert_pem = std::fs::read(cert_path).map_err(|e| {
        Error::tls(format!(
            "Failed to read certificate '{}': {}",
            cert_path.display(),
            e
        ))
    })?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::tls(format!("Invalid certificate PEM: {}", e)))?;
    if certs.is_empty() {
        return Err(Error::tls(format!(
            "No certificates found in '{}'",
            cert_path.display()
        )));
    }

    let key_pem = std::fs::read(key_path).map_err(|e| {
        Error::tls(format!(
            "Failed to read private key '{}': {}",
            key_path.display(),
            e
        ))
    })?;
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| Error::tls(format!("Invalid private key PEM: {}", e)))?
        .ok_or_else(|| Error::tls(format!("No private key found in '{}'", key_path.display())))?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::tls(format!("Invalid certificate/key pair: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
