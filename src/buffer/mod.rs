//! Bounded Frame Storage
//!
//! Fixed-capacity circular buffers that decouple network arrival of media
//! frames from their consumption. Each ring pre-allocates all of its slots
//! and overwrites the oldest frame on wraparound, keeping memory bounded
//! under sustained streaming load.

pub use ring::Frame;
pub use ring::FrameRing;

mod ring;
