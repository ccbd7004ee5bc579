//! Secure Transport
//!
//! TLS setup shared by both listeners and the WebSocket ingest server:
//! accept loop, per-connection handlers, and delivery of complete binary
//! messages to the ingest sink.

pub use tls::build_tls_acceptor;
pub use ws_server::WsServer;

mod tls;
mod ws_server;
