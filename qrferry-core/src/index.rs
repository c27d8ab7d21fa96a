//! Index-width codec: how many bytes a chunk index needs, and fixed-width big-endian encode/decode.

/// Upper bound on the index width searched by [`width_for`].
pub const MAX_INDEX_BYTES: usize = 512;

/// Smallest width `w >= 1` such that `total_chunks <= 256^w`.
///
/// Any `u64` count fits in at most 8 bytes, so the error is unreachable in practice, but the
/// bound is still checked.
pub fn width_for(total_chunks: u64) -> Result<usize, IndexError> {
    for width in 1..=MAX_INDEX_BYTES {
        let bits = 8 * width as u32;
        if bits >= u64::BITS || total_chunks <= 1u64 << bits {
            return Ok(width);
        }
    }
    Err(IndexError::CapacityExceeded { total_chunks })
}

/// Append `index` to `out` as `width` bytes, most significant first, zero padded.
/// Caller must ensure `index < 256^width`; higher bytes are truncated otherwise.
pub fn write_index(out: &mut Vec<u8>, index: u64, width: usize) {
    for j in 0..width {
        let shift = 8 * (width - 1 - j);
        let byte = if shift >= u64::BITS as usize {
            0
        } else {
            (index >> shift) as u8
        };
        out.push(byte);
    }
}

/// Encode `index` as `width` big-endian bytes.
pub fn encode_index(index: u64, width: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width);
    write_index(&mut out, index, width);
    out
}

/// Read `width` bytes starting at `offset` as an unsigned big-endian integer.
/// Positions past the end of `bytes` read as zero; never fails.
pub fn decode_index(bytes: &[u8], offset: usize, width: usize) -> u64 {
    let mut index = 0u64;
    for i in 0..width {
        let b = offset
            .checked_add(i)
            .and_then(|pos| bytes.get(pos))
            .copied()
            .unwrap_or(0);
        index = (index << 8) | u64::from(b);
    }
    index
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("{total_chunks} chunks cannot be indexed with at most 512 bytes")]
    CapacityExceeded { total_chunks: u64 },
}
