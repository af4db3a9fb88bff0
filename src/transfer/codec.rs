//! Length-prefixed chunk frames for file upload and download bodies.
//!
//! ```text
//! +----------------+----------------+-----------------+-------------+
//! | name_len u16be | data_len u32be | name (utf-8)    | data        |
//! +----------------+----------------+-----------------+-------------+
//! ```
//!
//! Download frames carry an empty name.

use super::TransferError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const HEADER_LEN: usize = 2 + 4;

/// Upper bound on one frame's payload. Not a file size limit.
pub const MAX_FRAME_DATA: usize = 4 * 1024 * 1024;

/// One message of a chunk stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Chunk {
    pub filename: String,
    pub data: Bytes,
}

impl Chunk {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// A download frame: data only.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self::new(String::new(), data)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkCodec;

impl Decoder for ChunkCodec {
    type Item = Chunk;
    type Error = TransferError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, TransferError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let name_len = usize::from(u16::from_be_bytes([src[0], src[1]]));
        let data_len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if data_len > MAX_FRAME_DATA {
            return Err(TransferError::FrameTooLarge(data_len));
        }

        let frame_len = HEADER_LEN + name_len + data_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let name = src.split_to(name_len);
        let filename = String::from_utf8(name.to_vec()).map_err(|_| TransferError::InvalidFilename)?;
        let data = src.split_to(data_len).freeze();

        Ok(Some(Chunk { filename, data }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, TransferError> {
        match self.decode(src)? {
            Some(chunk) => Ok(Some(chunk)),
            None if src.is_empty() => Ok(None),
            None => Err(TransferError::TruncatedFrame),
        }
    }
}

impl Encoder<Chunk> for ChunkCodec {
    type Error = TransferError;

    fn encode(&mut self, chunk: Chunk, dst: &mut BytesMut) -> Result<(), TransferError> {
        let name_len =
            u16::try_from(chunk.filename.len()).map_err(|_| TransferError::InvalidFilename)?;
        if chunk.data.len() > MAX_FRAME_DATA {
            return Err(TransferError::FrameTooLarge(chunk.data.len()));
        }
        // Bounded by MAX_FRAME_DATA above.
        let data_len = chunk.data.len() as u32;

        dst.reserve(HEADER_LEN + chunk.filename.len() + chunk.data.len());
        dst.put_u16(name_len);
        dst.put_u32(data_len);
        dst.put_slice(chunk.filename.as_bytes());
        dst.put_slice(&chunk.data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(chunk: Chunk) -> BytesMut {
        let mut buf = BytesMut::new();
        ChunkCodec.encode(chunk, &mut buf).unwrap();
        buf
    }

    #[test]
    fn frame_layout_is_big_endian_prefixed() {
        let buf = encode(Chunk::new("ab", &b"xyz"[..]));
        assert_eq!(&buf[..], &[0, 2, 0, 0, 0, 3, b'a', b'b', b'x', b'y', b'z']);
    }

    #[test]
    fn decode_waits_for_a_whole_frame() {
        let full = encode(Chunk::new("file.bin", vec![7u8; 100]));
        let mut partial = BytesMut::from(&full[..full.len() - 1]);

        assert_eq!(ChunkCodec.decode(&mut partial).unwrap(), None);

        partial.extend_from_slice(&full[full.len() - 1..]);
        let chunk = ChunkCodec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(chunk.filename, "file.bin");
        assert_eq!(chunk.data.len(), 100);
        assert!(partial.is_empty());
    }

    #[test]
    fn decode_splits_back_to_back_frames() {
        let mut buf = encode(Chunk::new("a", &b"1"[..]));
        buf.extend_from_slice(&encode(Chunk::data(&b"22"[..])));

        let first = ChunkCodec.decode(&mut buf).unwrap().unwrap();
        let second = ChunkCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, Chunk::new("a", &b"1"[..]));
        assert_eq!(second.filename, "");
        assert_eq!(&second.data[..], b"22");
    }

    #[test]
    fn oversized_frame_is_rejected_before_buffering() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u32(MAX_FRAME_DATA as u32 + 1);
        assert!(matches!(
            ChunkCodec.decode(&mut buf),
            Err(TransferError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn trailing_partial_frame_is_truncation() {
        let full = encode(Chunk::new("a", &b"data"[..]));
        let mut partial = BytesMut::from(&full[..4]);
        assert!(matches!(
            ChunkCodec.decode_eof(&mut partial),
            Err(TransferError::TruncatedFrame)
        ));
        assert_eq!(ChunkCodec.decode_eof(&mut BytesMut::new()).unwrap(), None);
    }

    #[test]
    fn non_utf8_filename_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_u32(0);
        buf.put_slice(&[0xff, 0xfe]);
        assert!(matches!(
            ChunkCodec.decode(&mut buf),
            Err(TransferError::InvalidFilename)
        ));
    }
}
