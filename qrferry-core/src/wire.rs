//! Framing: `digest(20) || index(index_bytes, BE) || payload`. One frame per QR code.

use crate::index;
use crate::integrity::{FileDigest, DIGEST_LEN};
use crate::protocol::FileDescriptor;

/// Header length for a transfer whose index field is `index_bytes` wide.
pub fn header_len(index_bytes: usize) -> usize {
    DIGEST_LEN + index_bytes
}

/// One chunk of a transfer, detached from the wire header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub index: u64,
    pub payload: Vec<u8>,
}

/// Encode a frame. `index_bytes` must be the transfer-wide width so all frames share one header length.
pub fn encode_frame(digest: &FileDigest, index: u64, index_bytes: usize, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_len(index_bytes) + payload.len());
    out.extend_from_slice(digest.as_bytes());
    index::write_index(&mut out, index, index_bytes);
    out.extend_from_slice(payload);
    out
}

/// Frame fields as read from the wire, before any check against a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame<'a> {
    pub digest: FileDigest,
    pub index: u64,
    pub payload: &'a [u8],
}

/// Split scanned bytes into header fields. Only a missing digest is an error here: a short index
/// reads as zero-padded and the payload is whatever follows the header (possibly empty).
pub fn decode_frame(bytes: &[u8], index_bytes: usize) -> Result<RawFrame<'_>, FrameDecodeError> {
    let digest = FileDigest::from_prefix(bytes).ok_or(FrameDecodeError::Truncated {
        len: bytes.len(),
    })?;
    let index = index::decode_index(bytes, DIGEST_LEN, index_bytes);
    let payload = bytes.get(header_len(index_bytes)..).unwrap_or(&[]);
    Ok(RawFrame {
        digest,
        index,
        payload,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("frame of {len} bytes is shorter than the digest header")]
    Truncated { len: usize },
}

/// Decode and validate a frame against the active transfer.
pub fn parse_frame(bytes: &[u8], descriptor: &FileDescriptor) -> Result<Frame, FrameError> {
    let raw = decode_frame(bytes, descriptor.index_bytes)?;
    if raw.digest != descriptor.hash {
        return Err(FrameError::Mismatch {
            expected: descriptor.hash,
            actual: raw.digest,
        });
    }
    if raw.index >= descriptor.total_chunks {
        return Err(FrameError::InvalidIndex {
            index: raw.index,
            total_chunks: descriptor.total_chunks,
        });
    }
    Ok(Frame {
        index: raw.index,
        payload: raw.payload.to_vec(),
    })
}

/// Per-frame rejection. The frame is dropped; the transfer continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),
    #[error("frame belongs to another file: {actual}, expected {expected}")]
    Mismatch {
        expected: FileDigest,
        actual: FileDigest,
    },
    #[error("chunk index {index} out of range (0..{total_chunks})")]
    InvalidIndex { index: u64, total_chunks: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::hash_bytes;

    fn descriptor(total_chunks: u64) -> FileDescriptor {
        FileDescriptor::new(hash_bytes(b"file"), "file", 100, total_chunks).unwrap()
    }

    #[test]
    fn layout() {
        let digest = hash_bytes(b"file");
        let frame = encode_frame(&digest, 0x0102, 2, b"xyz");
        assert_eq!(frame.len(), 20 + 2 + 3);
        assert_eq!(&frame[..20], digest.as_bytes());
        assert_eq!(&frame[20..22], &[0x01, 0x02]);
        assert_eq!(&frame[22..], b"xyz");
    }

    #[test]
    fn parse_accepts_own_frame() {
        let d = descriptor(300);
        let bytes = encode_frame(&d.hash, 299, d.index_bytes, b"payload");
        let frame = parse_frame(&bytes, &d).unwrap();
        assert_eq!(frame.index, 299);
        assert_eq!(frame.payload, b"payload");
    }

    #[test]
    fn parse_rejects_other_file() {
        let d = descriptor(3);
        let bytes = encode_frame(&hash_bytes(b"other"), 0, d.index_bytes, b"p");
        assert!(matches!(
            parse_frame(&bytes, &d),
            Err(FrameError::Mismatch { .. })
        ));
    }

    #[test]
    fn parse_rejects_out_of_range_index() {
        let d = descriptor(3);
        let bytes = encode_frame(&d.hash, 3, d.index_bytes, b"p");
        assert_eq!(
            parse_frame(&bytes, &d),
            Err(FrameError::InvalidIndex {
                index: 3,
                total_chunks: 3
            })
        );
    }

    #[test]
    fn truncated_frames() {
        let d = descriptor(3);
        assert!(matches!(
            parse_frame(&[0u8; 10], &d),
            Err(FrameError::Decode(FrameDecodeError::Truncated { len: 10 }))
        ));
        // Header only: index missing reads as zero, payload empty.
        let raw = decode_frame(d.hash.as_bytes(), 1).unwrap();
        assert_eq!(raw.index, 0);
        assert!(raw.payload.is_empty());
    }
}
