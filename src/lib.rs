//! Avalanche - a forward HTTP proxy with Basic proxy authorization
//!
//! Requests are forwarded as-is (plain HTTP) or tunnelled (`CONNECT`). When
//! authorization is enabled, every request must carry a
//! `Proxy-Authorization: Basic ...` header whose credentials match an entry
//! in an htpasswd-style file.
//!
//! # Features
//!
//! - **htpasswd credentials**: bcrypt, APR1 and `{SHA}` hashes, re-read on every request
//! - **Uniform denials**: unknown users and wrong passwords get the same 401
//! - **Optional TLS listener**: serve the proxy itself over HTTPS
//!
//! # Example
//!
//! ```no_run
//! use avalanche::{Config, ProxyServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.yml")?;
//!     let server = ProxyServer::new(config)?;
//!     let (_tx, rx) = tokio::sync::oneshot::channel();
//!     server.run_until_shutdown(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod proxy;

pub use auth::{AuthDecision, AuthGate, CredentialStore, Denial, HtpasswdFile, PasswordVerifier};
pub use config::Config;
pub use error::{Error, Result};
pub use proxy::ProxyServer;
