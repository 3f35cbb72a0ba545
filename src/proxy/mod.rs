//! HTTP proxy server implementation

mod handler;
mod response;
mod server;
mod tunnel;

pub use handler::ProxyHandler;
pub use response::{decision_response, ProxyBody};
pub use server::{load_tls_acceptor, ProxyServer};
pub use tunnel::TunnelHandler;
