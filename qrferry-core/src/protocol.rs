//! Out-of-band JSON messages (file-info announcement, recovery request) and the transfer descriptor.

use serde::{Deserialize, Serialize};

use crate::chunk::{EcLevel, MAX_TOTAL_CHUNKS};
use crate::index::{self, IndexError};
use crate::integrity::{DigestParseError, FileDigest};

/// First byte of every JSON message; binary frames are routed elsewhere.
pub const JSON_START: u8 = b'{';

/// All JSON message types, discriminated by the `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Sent once before any frame so the receiver can size its slots.
    #[serde(rename = "fileInfo")]
    FileInfo(FileInfo),
    /// Receiver -> sender: indices still missing.
    #[serde(rename = "recovery")]
    Recovery(RecoveryRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_hash: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u64,
    pub chunk_size: u64,
}

impl FileInfo {
    pub fn for_descriptor(descriptor: &FileDescriptor, chunk_size: u64) -> Self {
        Self {
            file_hash: descriptor.hash.to_hex(),
            file_name: descriptor.name.clone(),
            file_size: descriptor.size,
            total_chunks: descriptor.total_chunks,
            chunk_size,
        }
    }
}

/// Missing indices for one transfer, ascending and distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    pub file_hash: String,
    pub missing_chunks: Vec<u64>,
}

impl RecoveryRequest {
    pub fn new(hash: &FileDigest, mut missing_chunks: Vec<u64>) -> Self {
        missing_chunks.sort_unstable();
        missing_chunks.dedup();
        Self {
            file_hash: hash.to_hex(),
            missing_chunks,
        }
    }

    /// Parsed file hash. The wire only guarantees a string.
    pub fn digest(&self) -> Result<FileDigest, DigestParseError> {
        self.file_hash.parse()
    }

    /// Empty request: "resend nothing".
    pub fn is_empty(&self) -> bool {
        self.missing_chunks.is_empty()
    }
}

/// Identity of one transfer. Equal descriptors mean the same transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub hash: FileDigest,
    pub name: String,
    pub size: u64,
    pub total_chunks: u64,
    /// Width of the frame index field, derived from `total_chunks`.
    pub index_bytes: usize,
}

impl FileDescriptor {
    pub fn new(
        hash: FileDigest,
        name: impl Into<String>,
        size: u64,
        total_chunks: u64,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            hash,
            name: name.into(),
            size,
            total_chunks,
            index_bytes: index::width_for(total_chunks)?,
        })
    }

    /// Build the receiver-side descriptor from an announcement.
    /// Rejects announcements whose chunk count disagrees with size and chunk size, and those no
    /// QR frame sequence could carry.
    pub fn from_file_info(info: &FileInfo) -> Result<Self, MessageError> {
        let hash: FileDigest = info.file_hash.parse()?;
        if info.chunk_size > EcLevel::L.max_payload() as u64 || info.total_chunks > MAX_TOTAL_CHUNKS
        {
            return Err(MessageError::Oversized {
                chunk_size: info.chunk_size,
                total_chunks: info.total_chunks,
            });
        }
        let expected = if info.chunk_size == 0 {
            (info.file_size == 0).then_some(0)
        } else {
            Some(info.file_size.div_ceil(info.chunk_size))
        };
        if expected != Some(info.total_chunks) {
            return Err(MessageError::Inconsistent {
                file_size: info.file_size,
                chunk_size: info.chunk_size,
                total_chunks: info.total_chunks,
            });
        }
        Ok(Self::new(hash, info.file_name.clone(), info.file_size, info.total_chunks)?)
    }
}

/// Serialize a message as compact JSON (the QR text payload).
pub fn encode_message(msg: &Message) -> Result<String, MessageError> {
    serde_json::to_string(msg).map_err(MessageError::Json)
}

/// Parse a message from scanned bytes.
pub fn decode_message(bytes: &[u8]) -> Result<Message, MessageError> {
    if bytes.first() != Some(&JSON_START) {
        return Err(MessageError::NotJson);
    }
    serde_json::from_slice(bytes).map_err(MessageError::Json)
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("payload is not a JSON message")]
    NotJson,
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Digest(#[from] DigestParseError),
    #[error(transparent)]
    Capacity(#[from] IndexError),
    #[error("announced {total_chunks} chunks of {chunk_size} bytes exceed what QR frames can carry")]
    Oversized { chunk_size: u64, total_chunks: u64 },
    #[error("announcement of {file_size} bytes in {chunk_size}-byte chunks cannot have {total_chunks} chunks")]
    Inconsistent {
        file_size: u64,
        chunk_size: u64,
        total_chunks: u64,
    },
}
