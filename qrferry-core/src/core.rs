//! Host-driven sessions: the host passes scanned payloads in and gets events or frames back.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::assembly::{AddOutcome, Assembly, AssemblyError, AssemblyState, ScanStats};
use crate::chunk::{
    self, ChunkError, ChunkSet, OutboundFrame, TransferConfig, TransmissionMode,
};
use crate::protocol::{
    self, FileDescriptor, FileInfo, Message, MessageError, RecoveryRequest, JSON_START,
};
use crate::wire::FrameError;

/// Receiver lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No announcement yet; frames are rejected.
    Idle,
    /// Announcement parsed, no frame accepted yet.
    Announced,
    Collecting,
    /// All chunks received and verified.
    Complete,
    /// Digest check failed. Frames are rejected until a new announcement or `reset`.
    Failed,
}

/// A verified, reassembled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub descriptor: FileDescriptor,
    pub data: Vec<u8>,
}

/// What a scan did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// New transfer started (previous state, if any, discarded).
    Announced(FileDescriptor),
    /// Same announcement scanned again; state kept.
    Reannounced,
    Accepted { index: u64 },
    Duplicate { index: u64 },
    /// Last chunk arrived and the digest matched.
    Completed(CompletedFile),
    /// A message the receiver has no use for (e.g. a recovery request).
    Ignored,
}

/// Receiving side of one transfer at a time. Not meant for concurrent mutation; hosts scanning on
/// several threads must serialize calls.
pub struct ReceiverSession {
    state: ReceiverState,
    assembly: Option<AssemblyState>,
}

impl ReceiverSession {
    pub fn new() -> Self {
        Self {
            state: ReceiverState::Idle,
            assembly: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn descriptor(&self) -> Option<&FileDescriptor> {
        self.assembly.as_ref().map(AssemblyState::descriptor)
    }

    pub fn stats(&self) -> Option<ScanStats> {
        self.assembly.as_ref().map(AssemblyState::stats)
    }

    pub fn progress_percent(&self) -> f64 {
        self.assembly
            .as_ref()
            .map(AssemblyState::progress_percent)
            .unwrap_or(0.0)
    }

    /// Missing indices, ascending. `None` while idle.
    pub fn find_missing(&self) -> Option<Vec<u64>> {
        self.assembly.as_ref().map(AssemblyState::find_missing)
    }

    /// Recovery request for the active transfer. `None` while idle.
    pub fn recovery_request(&self) -> Option<RecoveryRequest> {
        self.assembly.as_ref().map(AssemblyState::recovery_request)
    }

    /// Drop the active transfer.
    pub fn reset(&mut self) {
        self.state = ReceiverState::Idle;
        self.assembly = None;
    }

    /// Route one scanned payload: JSON messages start with `{`; anything else (or JSON that does
    /// not parse once a transfer is active) is treated as a binary frame.
    pub fn on_scanned(&mut self, bytes: &[u8]) -> Result<ScanEvent, ReceiveError> {
        if bytes.first() == Some(&JSON_START) {
            match protocol::decode_message(bytes) {
                Ok(msg) => return self.on_message(msg),
                Err(e) if self.assembly.is_none() => return Err(e.into()),
                Err(_) => {}
            }
        }
        self.on_frame(bytes)
    }

    pub fn on_message(&mut self, msg: Message) -> Result<ScanEvent, ReceiveError> {
        match msg {
            Message::FileInfo(info) => self.on_announcement(&info),
            Message::Recovery(_) => Ok(ScanEvent::Ignored),
        }
    }

    /// Start a transfer from an announcement. An identical announcement keeps the current state
    /// unless the transfer failed; a different one discards it.
    pub fn on_announcement(&mut self, info: &FileInfo) -> Result<ScanEvent, ReceiveError> {
        let descriptor = FileDescriptor::from_file_info(info)?;
        if self.state != ReceiverState::Failed && self.descriptor() == Some(&descriptor) {
            return Ok(ScanEvent::Reannounced);
        }
        info!(
            file = %descriptor.name,
            hash = %descriptor.hash,
            size = descriptor.size,
            total_chunks = descriptor.total_chunks,
            "transfer announced"
        );
        self.assembly = Some(AssemblyState::new(descriptor.clone()));
        self.state = ReceiverState::Announced;
        if descriptor.total_chunks == 0 {
            return self.complete();
        }
        Ok(ScanEvent::Announced(descriptor))
    }

    /// Feed one binary frame. Per-frame rejections are returned as errors; the session continues.
    pub fn on_frame(&mut self, bytes: &[u8]) -> Result<ScanEvent, ReceiveError> {
        if self.state == ReceiverState::Failed {
            if let Some(assembly) = self.assembly.as_mut() {
                assembly.record_error();
            }
            return Err(ReceiveError::TransferFailed);
        }
        let assembly = self.assembly.as_mut().ok_or(ReceiveError::NotAnnounced)?;
        let (index, outcome) = assembly.ingest(bytes)?;
        match outcome {
            AddOutcome::Duplicate => Ok(ScanEvent::Duplicate { index }),
            AddOutcome::Accepted => {
                self.state = ReceiverState::Collecting;
                if assembly.is_complete() {
                    return self.complete();
                }
                Ok(ScanEvent::Accepted { index })
            }
        }
    }

    fn complete(&mut self) -> Result<ScanEvent, ReceiveError> {
        let assembly = self.assembly.as_ref().ok_or(ReceiveError::NotAnnounced)?;
        match assembly.assemble() {
            Ok(Assembly::Complete(data)) => {
                self.state = ReceiverState::Complete;
                info!(
                    file = %assembly.descriptor().name,
                    bytes = data.len(),
                    "transfer complete"
                );
                Ok(ScanEvent::Completed(CompletedFile {
                    descriptor: assembly.descriptor().clone(),
                    data,
                }))
            }
            Ok(Assembly::Missing(missing)) => Err(ReceiveError::Incomplete(missing)),
            Err(e) => {
                self.state = ReceiverState::Failed;
                Err(e.into())
            }
        }
    }
}

impl Default for ReceiverSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("frame scanned before any file announcement")]
    NotAnnounced,
    #[error("transfer failed its integrity check; rescan the announcement to restart")]
    TransferFailed,
    #[error("transfer still missing {} chunks", .0.len())]
    Incomplete(Vec<u64>),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Integrity(#[from] AssemblyError),
}

impl ReceiveError {
    /// True for errors that end the transfer; the others drop a single scan.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReceiveError::Integrity(_) | ReceiveError::TransferFailed)
    }
}

/// Sending side: owns the frames for one file and answers recovery requests.
pub struct SenderSession {
    chunks: ChunkSet,
}

impl SenderSession {
    pub fn new(chunks: ChunkSet) -> Self {
        Self { chunks }
    }

    /// Read and split a file.
    pub async fn open(path: impl AsRef<Path>, config: &TransferConfig) -> Result<Self, ChunkError> {
        Ok(Self::new(chunk::split_file(path, config).await?))
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.chunks.descriptor
    }

    pub fn chunks(&self) -> &ChunkSet {
        &self.chunks
    }

    pub fn announcement(&self) -> Message {
        self.chunks.announcement()
    }

    pub fn announcement_json(&self) -> Result<String, MessageError> {
        protocol::encode_message(&self.announcement())
    }

    pub fn frames(&self, missing: &[u64], mode: TransmissionMode) -> Vec<&OutboundFrame> {
        chunk::select_frames_to_resend(&self.chunks.frames, missing, mode)
    }

    /// Frames to re-display for a recovery request. An empty request yields every frame.
    pub fn on_recovery(&self, req: &RecoveryRequest) -> Result<Vec<&OutboundFrame>, SendError> {
        let hash = req.digest().map_err(MessageError::from)?;
        if hash != self.chunks.descriptor.hash {
            warn!(
                expected = %self.chunks.descriptor.hash,
                actual = %hash,
                "recovery request for another file"
            );
            return Err(SendError::ForeignRecovery(req.file_hash.clone()));
        }
        let frames = self.frames(&req.missing_chunks, TransmissionMode::Recovery);
        debug!(
            requested = req.missing_chunks.len(),
            resending = frames.len(),
            "recovery request"
        );
        Ok(frames)
    }

    /// Decode a scanned recovery QR and answer it.
    pub fn on_scanned(&self, bytes: &[u8]) -> Result<Vec<&OutboundFrame>, SendError> {
        match protocol::decode_message(bytes)? {
            Message::Recovery(req) => self.on_recovery(&req),
            Message::FileInfo(_) => Err(SendError::UnexpectedMessage),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("recovery request is for file {0}, not the one being sent")]
    ForeignRecovery(String),
    #[error("expected a recovery message")]
    UnexpectedMessage,
}
