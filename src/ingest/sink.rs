use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::buffer::FrameRing;
use crate::service::IngestConfig;
use crate::AppError;

use super::classifier::{classify, MediaKind};

/// The two ingest rings, owned in one place and passed explicitly.
///
/// Constructed once at startup; every WebSocket connection handler shares it
/// through an `Arc`. Each ring sits behind its own mutex so concurrent
/// connections (and any external reader) serialize against the write path,
/// which the rings themselves do not do.
#[derive(Debug)]
pub struct IngestContext {
    audio: Mutex<FrameRing>,
    video: Mutex<FrameRing>,
}

impl IngestContext {
    pub fn new(config: &IngestConfig) -> IngestContext {
        IngestContext {
            audio: Mutex::new(FrameRing::new(config.audio_slots, config.max_frame_size)),
            video: Mutex::new(FrameRing::new(config.video_slots, config.max_frame_size)),
        }
    }

    /// Consumer-side access to the audio ring.
    pub fn audio(&self) -> &Mutex<FrameRing> {
        &self.audio
    }

    /// Consumer-side access to the video ring.
    pub fn video(&self) -> &Mutex<FrameRing> {
        &self.video
    }
}

/// Per-connection entry point for inbound binary messages.
///
/// Classifies each message and deposits its payload into the matching ring.
/// Every failure is terminal for the message only: it is logged and the
/// frame dropped, so a bad or oversized frame can never tear down the
/// connection handler it arrived on.
pub struct MediaIngestSink {
    context: Arc<IngestContext>,
    connection_id: u64,
}

impl MediaIngestSink {
    pub fn new(context: Arc<IngestContext>, connection_id: u64) -> MediaIngestSink {
        MediaIngestSink {
            context,
            connection_id,
        }
    }

    pub fn on_message(&self, raw: Bytes) {
        let frame = match classify(&raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    connection_id = self.connection_id,
                    "dropping broken packet: {}", e
                );
                return;
            }
        };

        let ring = match frame.kind {
            MediaKind::Audio => self.context.audio(),
            MediaKind::Video => self.context.video(),
        };

        match ring.lock().write(&frame.payload) {
            Ok(slot) => {
                debug!(
                    connection_id = self.connection_id,
                    kind = ?frame.kind,
                    slot,
                    len = frame.payload.len(),
                    "frame buffered"
                );
            }
            Err(e @ AppError::OversizedPayload { .. }) => {
                warn!(
                    connection_id = self.connection_id,
                    kind = ?frame.kind,
                    "dropping frame: {}", e
                );
            }
            Err(e) => {
                warn!(
                    connection_id = self.connection_id,
                    "dropping frame: {}", e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_context() -> Arc<IngestContext> {
        Arc::new(IngestContext::new(&IngestConfig {
            audio_slots: 10,
            video_slots: 3,
            max_frame_size: 16,
        }))
    }

    #[test]
    fn test_audio_message_routes_to_audio_ring_only() {
        let context = small_context();
        let sink = MediaIngestSink::new(context.clone(), 1);

        sink.on_message(Bytes::from_static(&[127, 1, 0xAA, 0xBB]));

        let audio = context.audio().lock();
        assert_eq!(audio.next_write_index(), 1);
        assert_eq!(audio.frame(0).payload(), &[0xAA, 0xBB]);
        assert_eq!(context.video().lock().next_write_index(), 0);
    }

    #[test]
    fn test_video_message_routes_to_video_ring_only() {
        let context = small_context();
        let sink = MediaIngestSink::new(context.clone(), 1);

        sink.on_message(Bytes::from_static(&[127, 0, 0xCC]));

        let video = context.video().lock();
        assert_eq!(video.next_write_index(), 1);
        assert_eq!(video.frame(0).payload(), &[0xCC]);
        assert_eq!(context.audio().lock().next_write_index(), 0);
    }

    #[test]
    fn test_malformed_messages_touch_no_ring() {
        let context = small_context();
        let sink = MediaIngestSink::new(context.clone(), 1);

        sink.on_message(Bytes::new());
        sink.on_message(Bytes::from_static(&[127]));
        sink.on_message(Bytes::from_static(&[5, 1, 2, 3]));
        sink.on_message(Bytes::from_static(&[127, 9, 1]));

        assert_eq!(context.audio().lock().next_write_index(), 0);
        assert_eq!(context.video().lock().next_write_index(), 0);
    }

    #[test]
    fn test_oversized_frame_dropped_without_cursor_movement() {
        let context = small_context();
        let sink = MediaIngestSink::new(context.clone(), 1);

        let mut msg = vec![127, 1];
        msg.extend_from_slice(&[0u8; 17]);
        sink.on_message(Bytes::from(msg));

        assert_eq!(context.audio().lock().next_write_index(), 0);
    }

    #[test]
    fn test_sustained_audio_stream_wraps_around() {
        let context = small_context();
        let sink = MediaIngestSink::new(context.clone(), 1);

        for n in 0..11u8 {
            sink.on_message(Bytes::from(vec![127, 1, n]));
        }

        let audio = context.audio().lock();
        // eleventh write wrapped into slot 0
        assert_eq!(audio.next_write_index(), 1);
        assert_eq!(audio.frame(0).payload(), &[10]);
        assert_eq!(audio.frame(1).payload(), &[1]);
    }
}
