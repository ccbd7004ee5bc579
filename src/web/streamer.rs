use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::AppResult;

/// Read and send 128 KiB at a time.
pub const CHUNK_SIZE: usize = 131072;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Done,
    Failed,
}

/// Streams a file body to a connection in bounded chunks, one in flight.
///
/// Each cycle issues a single read into the reusable chunk buffer and hands
/// the bytes to the sink; awaiting the sink's write is the completion signal
/// that gates the next read, so the transport's send buffer is the only
/// backpressure needed. A short read marks the final chunk, a zero read is
/// EOF, and any read or write error ends the stream with no retry.
///
/// The reader is taken by value so its handle is released on every exit
/// path, success or failure.
pub struct ChunkedFileStreamer {
    chunk: Vec<u8>,
    state: StreamState,
    reads_issued: u64,
    writes_completed: u64,
    bytes_sent: u64,
}

impl Default for ChunkedFileStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedFileStreamer {
    pub fn new() -> ChunkedFileStreamer {
        ChunkedFileStreamer {
            chunk: vec![0u8; CHUNK_SIZE],
            state: StreamState::Idle,
            reads_issued: 0,
            writes_completed: 0,
            bytes_sent: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn reads_issued(&self) -> u64 {
        self.reads_issued
    }

    pub fn writes_completed(&self) -> u64 {
        self.writes_completed
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub async fn stream<R, W>(&mut self, mut reader: R, sink: &mut W) -> AppResult<u64>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            self.reads_issued += 1;
            let read_length = match reader.read(&mut self.chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.state = StreamState::Failed;
                    return Err(e.into());
                }
            };
            if read_length == 0 {
                self.state = StreamState::Done;
                return Ok(self.bytes_sent);
            }

            if let Err(e) = sink.write_all(&self.chunk[..read_length]).await {
                self.state = StreamState::Failed;
                return Err(e.into());
            }
            if let Err(e) = sink.flush().await {
                self.state = StreamState::Failed;
                return Err(e.into());
            }
            self.writes_completed += 1;
            self.bytes_sent += read_length as u64;

            // a short read was the final chunk, no further reads scheduled
            if read_length < self.chunk.len() {
                self.state = StreamState::Done;
                return Ok(self.bytes_sent);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Sink whose first write completes with an error, standing in for a
    /// connection closed mid-stream.
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection interrupted",
            )))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_exactly_one_full_chunk_takes_two_reads_one_write() {
        let body = vec![7u8; CHUNK_SIZE];
        let mut sink = Vec::new();
        let mut streamer = ChunkedFileStreamer::new();

        let sent = streamer.stream(body.as_slice(), &mut sink).await.unwrap();

        assert_eq!(sent, CHUNK_SIZE as u64);
        assert_eq!(streamer.reads_issued(), 2);
        assert_eq!(streamer.writes_completed(), 1);
        assert_eq!(streamer.state(), StreamState::Done);
        assert_eq!(sink.len(), CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_empty_input_takes_one_read_zero_writes() {
        let mut sink = Vec::new();
        let mut streamer = ChunkedFileStreamer::new();

        let empty: &[u8] = &[];
        let sent = streamer.stream(empty, &mut sink).await.unwrap();

        assert_eq!(sent, 0);
        assert_eq!(streamer.reads_issued(), 1);
        assert_eq!(streamer.writes_completed(), 0);
        assert_eq!(streamer.state(), StreamState::Done);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_short_final_chunk_finishes_without_eof_read() {
        let body = vec![1u8; CHUNK_SIZE + 100];
        let mut sink = Vec::new();
        let mut streamer = ChunkedFileStreamer::new();

        streamer.stream(body.as_slice(), &mut sink).await.unwrap();

        // one full chunk, one 100-byte tail, no trailing zero-length read
        assert_eq!(streamer.reads_issued(), 2);
        assert_eq!(streamer.writes_completed(), 2);
        assert_eq!(streamer.state(), StreamState::Done);
        assert_eq!(sink.len(), CHUNK_SIZE + 100);
    }

    #[tokio::test]
    async fn test_write_error_fails_stream_with_no_further_reads() {
        let body = vec![1u8; CHUNK_SIZE * 3];
        let mut sink = BrokenSink;
        let mut streamer = ChunkedFileStreamer::new();

        let err = streamer.stream(body.as_slice(), &mut sink).await.unwrap_err();

        assert!(matches!(err, crate::AppError::IoError(_)));
        assert_eq!(streamer.state(), StreamState::Failed);
        assert_eq!(streamer.reads_issued(), 1);
        assert_eq!(streamer.writes_completed(), 0);
    }

    #[tokio::test]
    async fn test_streams_real_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.bin");
        let body: Vec<u8> = (0..10_000u32).map(|n| n as u8).collect();
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&body)
            .unwrap();

        let file = tokio::fs::File::open(&path).await.unwrap();
        let mut sink = Vec::new();
        let mut streamer = ChunkedFileStreamer::new();

        let sent = streamer.stream(file, &mut sink).await.unwrap();

        assert_eq!(sent, body.len() as u64);
        assert_eq!(sink, body);
        assert_eq!(streamer.state(), StreamState::Done);
    }
}
