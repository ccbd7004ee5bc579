//! Static File Serving
//!
//! The HTTPS side of the relay: a minimal GET-only listener that resolves
//! paths under the configured static root and streams file bodies through
//! `ChunkedFileStreamer`, 128 KiB at a time with one chunk in flight.

pub use http_server::HttpServer;
pub use streamer::{ChunkedFileStreamer, StreamState, CHUNK_SIZE};

mod http_server;
mod streamer;
