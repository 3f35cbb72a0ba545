//! Test infrastructure for end-to-end proxy tests.

#![allow(dead_code)]

use avalanche::{AuthGate, Config, ProxyServer};
use base64::Engine;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// `{SHA}` hash of "admin"
pub const SHA_ADMIN: &str = "{SHA}0DPiKuNIrrVmD8IUCuw1hQxNqZc=";

// ---------------------------------------------------------------------------
// PasswdFile — a credential file in a tempdir
// ---------------------------------------------------------------------------

pub struct PasswdFile {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl PasswdFile {
    pub fn new(content: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".htpasswd");
        std::fs::write(&path, content).unwrap();
        Self { dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// TestProxy — wraps ProxyServer with bind + spawn
// ---------------------------------------------------------------------------

pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestProxy {
    /// Start a proxy on an ephemeral port, with authorization when `passwd` is given.
    pub async fn start(passwd: Option<&Path>) -> Self {
        let mut config = Config::default();
        config.server.addr = "127.0.0.1:0".to_string();
        if let Some(path) = passwd {
            config.proxy.authorization.enabled = true;
            config.proxy.authorization.passwdfile = Some(path.to_string_lossy().to_string());
        }

        Self::spawn(ProxyServer::new(config).unwrap()).await
    }

    /// Start a proxy on an ephemeral port guarded by a caller-built gate.
    pub async fn start_with_gate(gate: AuthGate) -> Self {
        let mut config = Config::default();
        config.server.addr = "127.0.0.1:0".to_string();
        let server = ProxyServer::new(config)
            .unwrap()
            .with_gate(Some(Arc::new(gate)));
        assert!(server.requires_authorization());
        Self::spawn(server).await
    }

    async fn spawn(mut server: ProxyServer) -> Self {
        let addr = server.bind().await.unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let _ = server.serve(shutdown_rx).await;
        });

        Self { addr, shutdown_tx }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

// ---------------------------------------------------------------------------
// Clients
// ---------------------------------------------------------------------------

/// reqwest client that sends plain HTTP through the proxy without credentials.
pub fn client(proxy_addr: SocketAddr) -> reqwest::Client {
    let proxy = reqwest::Proxy::http(format!("http://{}", proxy_addr)).unwrap();
    reqwest::Client::builder().proxy(proxy).build().unwrap()
}

/// reqwest client that sends plain HTTP through the proxy with Basic credentials.
pub fn client_with_auth(proxy_addr: SocketAddr, user: &str, pass: &str) -> reqwest::Client {
    let proxy = reqwest::Proxy::http(format!("http://{}", proxy_addr))
        .unwrap()
        .basic_auth(user, pass);
    reqwest::Client::builder().proxy(proxy).build().unwrap()
}

/// `Basic <base64(raw)>`
pub fn basic(raw: &str) -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(raw)
    )
}

// ---------------------------------------------------------------------------
// Raw socket helpers for CONNECT
// ---------------------------------------------------------------------------

/// Read a response head (status line + headers) byte by byte.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            break;
        }
        head.push(byte[0]);
    }
    String::from_utf8_lossy(&head).to_string()
}

/// Send a CONNECT for `target` and return the stream plus the response head.
pub async fn connect(
    proxy_addr: SocketAddr,
    target: &str,
    auth: Option<&str>,
) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(value) = auth {
        request.push_str(&format!("Proxy-Authorization: {value}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let head = read_head(&mut stream).await;
    (stream, head)
}
