//! Frame Demultiplexing
//!
//! Turns raw WebSocket binary messages into classified media frames and
//! routes them into the bounded rings. Classification is pure; routing is
//! the only mutation, and every ingest failure is contained here.

pub use classifier::{classify, ClassifiedFrame, MediaKind, FRAME_SENTINEL};
pub use sink::{IngestContext, MediaIngestSink};

mod classifier;
mod sink;
