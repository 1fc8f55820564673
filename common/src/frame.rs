/// Wire format of one frame on the camera connection:
///
///   [0..4]   payload_len  (u32 little-endian)
///   [4..]    payload      (payload_len bytes, encoded image)
///
/// There is no handshake, acknowledgement or heartbeat; frames follow each
/// other back to back until the peer closes the connection.
pub const HEADER_SIZE: usize = 4;

/// Decoded length prefix of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn new(payload_len: u32) -> Self {
        Self { payload_len }
    }

    pub fn parse(bytes: [u8; HEADER_SIZE]) -> Self {
        Self {
            payload_len: u32::from_le_bytes(bytes),
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        self.payload_len.to_le_bytes()
    }

    /// Check the declared length against the configured ceiling and return it
    /// as a buffer size. Nothing should be allocated before this passes.
    pub fn checked_len(self, max_frame_len: u32) -> Result<usize, FrameError> {
        if self.payload_len > max_frame_len {
            return Err(FrameError::TooLarge {
                declared: self.payload_len as u64,
                max: max_frame_len,
            });
        }
        Ok(self.payload_len as usize)
    }
}

/// One complete, length-delimited payload as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Vec<u8>,
}

impl Frame {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.payload
    }
}

/// Serialize a payload with its length prefix.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        declared: payload.len() as u64,
        max: u32::MAX,
    })?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&FrameHeader::new(len).to_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame length {declared} exceeds maximum {max}")]
    TooLarge { declared: u64, max: u32 },
    #[error("connection closed after {got} of {expected} payload bytes")]
    Truncated { got: usize, expected: usize },
}
