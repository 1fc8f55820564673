use std::io;
use std::time::Duration;

use frame_relay_common::config::FramingConfig;
use frame_relay_common::frame::{Frame, FrameError, FrameHeader, HEADER_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("no data for {0:?}")]
    Timeout(Duration),
}

/// Reassembles length-prefixed frames from a byte stream.
///
/// Each read is bounded by `chunk_size`, and a payload is only returned once
/// exactly `payload_len` bytes have been collected. A peer closing the
/// connection between frames is a clean end of stream; closing inside a
/// payload is a [`FrameError::Truncated`].
pub struct FrameReader<R> {
    reader: R,
    max_frame_len: u32,
    read_timeout: Option<Duration>,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, framing: &FramingConfig) -> Self {
        Self {
            reader,
            max_frame_len: framing.max_frame_len,
            read_timeout: framing.read_timeout(),
            chunk: vec![0u8; framing.chunk_size.max(1)],
        }
    }

    /// Read the next complete frame. `Ok(None)` means the peer closed the
    /// connection before a full header arrived.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, StreamError> {
        let mut header = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            let n = read_some(&mut self.reader, &mut header[filled..], self.read_timeout).await?;
            if n == 0 {
                if filled > 0 {
                    debug!(got = filled, "peer closed inside frame header");
                }
                return Ok(None);
            }
            filled += n;
        }

        let len = FrameHeader::parse(header).checked_len(self.max_frame_len)?;
        debug!(len, "receiving frame");

        let mut payload = Vec::with_capacity(len);
        while payload.len() < len {
            let want = (len - payload.len()).min(self.chunk.len());
            let n = read_some(&mut self.reader, &mut self.chunk[..want], self.read_timeout).await?;
            if n == 0 {
                return Err(FrameError::Truncated {
                    got: payload.len(),
                    expected: len,
                }
                .into());
            }
            payload.extend_from_slice(&self.chunk[..n]);
        }

        Ok(Some(Frame::new(payload)))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, StreamError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| StreamError::Timeout(limit))?
            .map_err(StreamError::from),
        None => Ok(reader.read(buf).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_relay_common::frame::encode_frame;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Serves `data` in the given chunk sizes, then EOF. Once the script runs
    /// out, whatever is left is served in one go.
    struct ScriptedReader {
        data: Vec<u8>,
        pos: usize,
        chunks: VecDeque<usize>,
        largest_request: usize,
    }

    impl ScriptedReader {
        fn new(data: Vec<u8>, chunks: &[usize]) -> Self {
            Self {
                data,
                pos: 0,
                chunks: chunks.iter().copied().collect(),
                largest_request: 0,
            }
        }
    }

    impl AsyncRead for ScriptedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.largest_request = self.largest_request.max(buf.remaining());
            let remaining = self.data.len() - self.pos;
            if remaining == 0 {
                return Poll::Ready(Ok(()));
            }
            let planned = self.chunks.pop_front().unwrap_or(remaining).min(remaining);
            let n = planned.min(buf.remaining());
            if n < planned {
                self.chunks.push_front(planned - n);
            }
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    fn framing(max_frame_len: u32, chunk_size: usize) -> FramingConfig {
        FramingConfig {
            max_frame_len,
            chunk_size,
            read_timeout_secs: 0,
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn reassembles_byte_at_a_time() {
        let body = payload(300);
        let wire = encode_frame(&body).unwrap();
        let chunks = vec![1; wire.len()];
        let mut reader = FrameReader::new(ScriptedReader::new(wire, &chunks), &framing(1024, 4096));

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &body[..]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reassembles_uneven_writes() {
        let body = payload(523);
        let wire = encode_frame(&body).unwrap();
        let mut reader = FrameReader::new(
            ScriptedReader::new(wire, &[4, 100, 23, 400]),
            &framing(1024, 4096),
        );

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.len(), 523);
        assert_eq!(frame.as_bytes(), &body[..]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn header_split_across_frames() {
        let mut wire = encode_frame(&payload(10)).unwrap();
        wire.extend(encode_frame(&payload(20)).unwrap());
        // second header straddles a read boundary
        let mut reader = FrameReader::new(
            ScriptedReader::new(wire, &[16, 2, 22]),
            &framing(1024, 4096),
        );

        assert_eq!(reader.next_frame().await.unwrap().unwrap().len(), 10);
        assert_eq!(reader.next_frame().await.unwrap().unwrap().as_bytes(), &payload(20)[..]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_never_exceed_chunk_size() {
        let body = payload(100);
        let wire = encode_frame(&body).unwrap();
        let mut reader = FrameReader::new(ScriptedReader::new(wire, &[]), &framing(1024, 16));

        let frame = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.as_bytes(), &body[..]);
        assert!(reader.into_inner().largest_request <= 16);
    }

    #[tokio::test]
    async fn truncated_payload_is_not_emitted() {
        let mut wire = vec![10, 0, 0, 0];
        wire.extend_from_slice(&[1, 2, 3, 4, 5]);
        let mut reader = FrameReader::new(ScriptedReader::new(wire, &[]), &framing(1024, 4096));

        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Protocol(FrameError::Truncated { got: 5, expected: 10 })
        ));
    }

    #[tokio::test]
    async fn oversized_header_rejected_before_payload_read() {
        let mut wire = 2048u32.to_le_bytes().to_vec();
        wire.extend(payload(64));
        let mut reader = FrameReader::new(ScriptedReader::new(wire, &[]), &framing(1024, 4096));

        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Protocol(FrameError::TooLarge { declared: 2048, max: 1024 })
        ));
        assert_eq!(reader.into_inner().pos, HEADER_SIZE);
    }

    #[tokio::test]
    async fn eof_before_or_inside_header_is_clean() {
        let mut empty = FrameReader::new(ScriptedReader::new(vec![], &[]), &framing(1024, 4096));
        assert!(empty.next_frame().await.unwrap().is_none());

        let mut partial =
            FrameReader::new(ScriptedReader::new(vec![10, 0], &[1, 1]), &framing(1024, 4096));
        assert!(partial.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let config = FramingConfig {
            max_frame_len: 1024,
            chunk_size: 4096,
            read_timeout_secs: 1,
        };
        let mut reader = FrameReader::new(server, &config);

        let err = reader.next_frame().await.unwrap_err();
        assert!(matches!(err, StreamError::Timeout(d) if d == Duration::from_secs(1)));
    }
}
