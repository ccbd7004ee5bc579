mod buffer;
mod ingest;
mod network;
mod service;
mod web;

pub use buffer::{Frame, FrameRing};
pub use ingest::{classify, ClassifiedFrame, IngestContext, MediaIngestSink, MediaKind};
pub use ingest::FRAME_SENTINEL;
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppError, AppResult, IngestConfig, Relay,
    RelayConfig, Shutdown, GLOBAL_CONFIG,
};
pub use web::{ChunkedFileStreamer, StreamState, CHUNK_SIZE};
