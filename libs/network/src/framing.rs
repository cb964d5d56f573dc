//! Frame Codec
//!
//! Every frame on a peer link is `[length: u32 BE][type: u8][payload]`,
//! where `length` counts only the payload bytes. Reads may split a frame
//! anywhere, so the decoder works against an accumulating `BytesMut`.

use crate::{Result, TransportError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length prefix plus type byte
pub const FRAME_HEADER_LEN: usize = 5;

/// Default upper bound on a single frame payload
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// A decoded frame: the one-byte message type and its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(message_type: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }
}

/// Encodes and decodes link frames, enforcing a maximum payload size
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Append one frame to `dst`
    pub fn encode(&self, message_type: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_frame_size || payload.len() > u32::MAX as usize {
            return Err(TransportError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(FRAME_HEADER_LEN + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_u8(message_type);
        dst.put_slice(payload);
        Ok(())
    }

    /// Encode one frame into a standalone buffer
    pub fn encode_to_bytes(&self, message_type: u8, payload: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        self.encode(message_type, payload, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Take one complete frame off the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when fewer bytes than a
    /// full frame are buffered.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let total = FRAME_HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        frame.advance(4);
        let message_type = frame.get_u8();
        Ok(Some(Frame {
            message_type,
            payload: frame.freeze(),
        }))
    }
}
