use bytes::Bytes;

use crate::AppError::MalformedPacket;
use crate::AppResult;

/// Every valid inbound message starts with this marker byte. Anything else
/// is framing corruption and the whole message is dropped.
pub const FRAME_SENTINEL: u8 = 127;

const TYPE_TAG_VIDEO: u8 = 0;
const TYPE_TAG_AUDIO: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

/// A raw message split into its destination and payload.
/// Wire format: `[sentinel 0x7F][type tag u8][payload bytes...]`.
#[derive(Debug, Clone)]
pub struct ClassifiedFrame {
    pub kind: MediaKind,
    pub payload: Bytes,
}

/// Pure classification of one binary message. No side effects; the caller
/// decides what a `MalformedPacket` costs (the sink logs and drops it).
pub fn classify(msg: &Bytes) -> AppResult<ClassifiedFrame> {
    if msg.len() < 2 {
        return Err(MalformedPacket(format!(
            "message of {} bytes is shorter than the 2-byte header",
            msg.len()
        )));
    }
    if msg[0] != FRAME_SENTINEL {
        return Err(MalformedPacket(format!(
            "bad sentinel byte {:#04x}",
            msg[0]
        )));
    }
    let kind = match msg[1] {
        TYPE_TAG_AUDIO => MediaKind::Audio,
        TYPE_TAG_VIDEO => MediaKind::Video,
        other => {
            return Err(MalformedPacket(format!("bad type tag {}", other)));
        }
    };
    Ok(ClassifiedFrame {
        kind,
        payload: msg.slice(2..),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_audio_message_classified_with_payload() {
        let msg = Bytes::from_static(&[127, 1, 0xAA, 0xBB]);
        let frame = classify(&msg).unwrap();
        assert_eq!(frame.kind, MediaKind::Audio);
        assert_eq!(frame.payload.as_ref(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_video_message_classified_with_payload() {
        let msg = Bytes::from_static(&[127, 0, 0xCC]);
        let frame = classify(&msg).unwrap();
        assert_eq!(frame.kind, MediaKind::Video);
        assert_eq!(frame.payload.as_ref(), &[0xCC]);
    }

    #[test]
    fn test_header_only_message_has_empty_payload() {
        let msg = Bytes::from_static(&[127, 1]);
        let frame = classify(&msg).unwrap();
        assert_eq!(frame.kind, MediaKind::Audio);
        assert!(frame.payload.is_empty());
    }

    #[rstest]
    #[case::empty(&[], "shorter")]
    #[case::one_byte(&[127], "shorter")]
    #[case::bad_sentinel(&[5, 1, 9], "sentinel")]
    #[case::bad_type_tag(&[127, 7, 9], "type tag")]
    fn test_malformed_messages_rejected(#[case] raw: &'static [u8], #[case] cause: &str) {
        let msg = Bytes::from_static(raw);
        let err = classify(&msg).unwrap_err();
        match err {
            crate::AppError::MalformedPacket(reason) => {
                assert!(
                    reason.contains(cause),
                    "reason {:?} should name {:?}",
                    reason,
                    cause
                );
            }
            other => panic!("expected MalformedPacket, got {:?}", other),
        }
    }
}
