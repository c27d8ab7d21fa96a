//! Sender chunker: size chunks to fit one QR code, split a file into frames, select frames to resend.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::index::IndexError;
use crate::integrity::{self, DIGEST_LEN};
use crate::protocol::{FileDescriptor, FileInfo, Message};
use crate::wire;

/// Default chunk size in bytes, before clamping to the QR capacity.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Index bytes reserved when sizing chunks; 3 bytes cover ~16M chunks.
pub const RESERVED_INDEX_BYTES: usize = 3;

/// Largest chunk count whose index fits the reserved bytes.
pub const MAX_TOTAL_CHUNKS: u64 = 1 << (8 * RESERVED_INDEX_BYTES);

/// QR error-correction level. Higher levels survive more damage and carry fewer bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcLevel {
    /// ~7% recovery.
    L,
    /// ~15% recovery.
    #[default]
    M,
    /// ~25% recovery.
    Q,
    /// ~30% recovery.
    H,
}

impl EcLevel {
    pub const ALL: [EcLevel; 4] = [EcLevel::L, EcLevel::M, EcLevel::Q, EcLevel::H];

    /// Byte-mode capacity of a version 40 symbol.
    pub fn capacity(self) -> usize {
        match self {
            EcLevel::L => 2953,
            EcLevel::M => 2331,
            EcLevel::Q => 1663,
            EcLevel::H => 1273,
        }
    }

    /// Largest payload that fits one frame at this level.
    pub fn max_payload(self) -> usize {
        self.capacity() - DIGEST_LEN - RESERVED_INDEX_BYTES
    }
}

impl fmt::Display for EcLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EcLevel::L => "L",
            EcLevel::M => "M",
            EcLevel::Q => "Q",
            EcLevel::H => "H",
        };
        f.write_str(s)
    }
}

impl FromStr for EcLevel {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L" => Ok(EcLevel::L),
            "M" => Ok(EcLevel::M),
            "Q" => Ok(EcLevel::Q),
            "H" => Ok(EcLevel::H),
            _ => Err(ChunkError::UnknownLevel(s.to_string())),
        }
    }
}

/// Chunk size after validation against a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize {
    pub size: usize,
    /// True when the requested size was changed.
    pub adjusted: bool,
}

/// Clamp `requested` to what fits one QR code at `level`. Zero falls back to [`DEFAULT_CHUNK_SIZE`].
pub fn validate_chunk_size(requested: usize, level: EcLevel) -> ChunkSize {
    let max = level.max_payload();
    let wanted = if requested == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        requested
    };
    let size = wanted.min(max);
    ChunkSize {
        size,
        adjusted: size != requested,
    }
}

/// Sender-side transfer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub error_correction: EcLevel,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            error_correction: EcLevel::default(),
        }
    }
}

impl TransferConfig {
    pub fn validated(&self) -> ChunkSize {
        validate_chunk_size(self.chunk_size, self.error_correction)
    }
}

/// One encoded frame ready for QR rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub index: u64,
    /// Full wire bytes, header included.
    pub bytes: Vec<u8>,
}

/// Everything the sender needs for one file.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    pub descriptor: FileDescriptor,
    pub chunk_size: usize,
    /// True when the configured chunk size was clamped.
    pub adjusted: bool,
    /// Indexed by chunk index.
    pub frames: Vec<OutboundFrame>,
}

impl ChunkSet {
    pub fn file_info(&self) -> FileInfo {
        FileInfo::for_descriptor(&self.descriptor, self.chunk_size as u64)
    }

    pub fn announcement(&self) -> Message {
        Message::FileInfo(self.file_info())
    }
}

/// Split `data` into frames of exactly `chunk_size` bytes (last one shorter). No clamping, but the
/// chunk size and count must stay within what a receiver accepts.
pub fn split_with_size(
    name: impl Into<String>,
    data: &[u8],
    chunk_size: usize,
) -> Result<ChunkSet, ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }
    if chunk_size > EcLevel::L.max_payload() {
        return Err(ChunkError::ChunkTooLarge(chunk_size));
    }
    let total_chunks = data.len().div_ceil(chunk_size) as u64;
    if total_chunks > MAX_TOTAL_CHUNKS {
        return Err(ChunkError::TooManyChunks { total_chunks });
    }
    let hash = integrity::hash_bytes(data);
    let descriptor = FileDescriptor::new(hash, name, data.len() as u64, total_chunks)?;
    let frames = data
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, payload)| OutboundFrame {
            index: i as u64,
            bytes: wire::encode_frame(&hash, i as u64, descriptor.index_bytes, payload),
        })
        .collect::<Vec<_>>();
    debug!(
        file = %descriptor.name,
        hash = %hash,
        total_chunks,
        chunk_size,
        "split file into frames"
    );
    Ok(ChunkSet {
        descriptor,
        chunk_size,
        adjusted: false,
        frames,
    })
}

/// Split `data` with the chunk size from `config`, clamped to the QR capacity of its level.
pub fn split_bytes(
    name: impl Into<String>,
    data: &[u8],
    config: &TransferConfig,
) -> Result<ChunkSet, ChunkError> {
    let size = config.validated();
    if size.adjusted {
        warn!(
            requested = config.chunk_size,
            adjusted = size.size,
            level = %config.error_correction,
            "chunk size adjusted to fit QR capacity"
        );
    }
    let mut set = split_with_size(name, data, size.size)?;
    set.adjusted = size.adjusted;
    Ok(set)
}

/// Read the whole file and split it. The file name is the last path component.
pub async fn split_file(
    path: impl AsRef<Path>,
    config: &TransferConfig,
) -> Result<ChunkSet, ChunkError> {
    let path = path.as_ref();
    let data = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    split_bytes(name, &data, config)
}

/// Which frames to (re)display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmissionMode {
    #[default]
    All,
    Recovery,
}

/// In recovery mode with a non-empty list, return the listed frames (out-of-range indices skipped);
/// otherwise return every frame.
pub fn select_frames_to_resend<'a>(
    all: &'a [OutboundFrame],
    missing: &[u64],
    mode: TransmissionMode,
) -> Vec<&'a OutboundFrame> {
    if mode == TransmissionMode::Recovery && !missing.is_empty() {
        return missing
            .iter()
            .filter_map(|&i| usize::try_from(i).ok().and_then(|i| all.get(i)))
            .collect();
    }
    all.iter().collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("failed to read source file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Capacity(#[from] IndexError),
    #[error("chunk size must be at least 1 byte")]
    ZeroChunkSize,
    #[error("chunk size {0} does not fit any QR frame (max 2930)")]
    ChunkTooLarge(usize),
    #[error("file needs {total_chunks} chunks; at most 16777216 fit the 3-byte index")]
    TooManyChunks { total_chunks: u64 },
    #[error("unknown error-correction level {0:?} (expected L, M, Q or H)")]
    UnknownLevel(String),
}
