//! Framing for recorded chunk streams.
//!
//! A replay file is a plain sequence of chunks, each prefixed by its
//! length as a little-endian `u16`. Zero-length records are legal and
//! stand for zero-length transport packets.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DisplayError;
use crate::protocol::MAX_CHUNK;

const LEN_PREFIX: usize = 2;

#[derive(Debug, Default, Clone, Copy)]
pub struct ChunkCodec;

impl tokio_util::codec::Decoder for ChunkCodec {
    type Item = Bytes;
    type Error = DisplayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let len = u16::from_le_bytes([src[0], src[1]]) as usize;
        if len > MAX_CHUNK {
            return Err(DisplayError::ChunkTooLarge { size: len, max: MAX_CHUNK });
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }
        src.advance(LEN_PREFIX);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl tokio_util::codec::Encoder<Bytes> for ChunkCodec {
    type Error = DisplayError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > MAX_CHUNK {
            return Err(DisplayError::ChunkTooLarge {
                size: item.len(),
                max: MAX_CHUNK,
            });
        }
        dst.reserve(LEN_PREFIX + item.len());
        dst.put_u16_le(item.len() as u16);
        dst.extend_from_slice(&item);
        Ok(())
    }
}
