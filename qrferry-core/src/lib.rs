//! qrferry: air-gapped file transfer over a sequence of QR codes.
//! Host-driven: no QR rendering or camera access; the host passes scanned payloads and displays frames.

pub mod assembly;
pub mod chunk;
pub mod core;
pub mod ffi;
pub mod index;
pub mod integrity;
pub mod protocol;
pub mod wire;

pub use assembly::{AddOutcome, Assembly, AssemblyError, AssemblyState, ScanStats};
pub use chunk::{
    select_frames_to_resend, split_bytes, split_file, split_with_size, validate_chunk_size,
    ChunkError, ChunkSet, ChunkSize, EcLevel, OutboundFrame, TransferConfig, TransmissionMode,
};
pub use crate::core::{
    CompletedFile, ReceiveError, ReceiverSession, ReceiverState, ScanEvent, SendError,
    SenderSession,
};
pub use index::IndexError;
pub use integrity::{hash_bytes, FileDigest, DIGEST_LEN};
pub use protocol::{
    decode_message, encode_message, FileDescriptor, FileInfo, Message, MessageError,
    RecoveryRequest,
};
pub use wire::{decode_frame, encode_frame, parse_frame, Frame, FrameError};
