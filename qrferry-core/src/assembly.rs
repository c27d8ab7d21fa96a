//! Receiver assembly: per-transfer slot arena, scan counters, missing-index scan, verified reassembly.

use tracing::{debug, error, trace, warn};

use crate::integrity::{self, FileDigest};
use crate::protocol::{FileDescriptor, RecoveryRequest};
use crate::wire::{self, Frame, FrameError};

/// Scan counters for one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Valid frames seen (accepted + duplicates).
    pub total: u64,
    /// Unique frames accepted.
    pub count: u64,
    pub duplicates: u64,
    /// Frames dropped for a foreign digest, a bad index or truncation, or scanned after the
    /// transfer failed its digest check.
    pub errors: u64,
}

/// Result of adding a frame that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted,
    /// Slot already filled; nothing changed except the duplicate counter.
    Duplicate,
}

/// Result of [`AssemblyState::assemble`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembly {
    /// All chunks present and the digest matches.
    Complete(Vec<u8>),
    /// Still waiting for these indices (ascending).
    Missing(Vec<u64>),
}

/// In-memory model of one transfer in progress. Slot `i` holds the payload of chunk `i` once
/// accepted and is never overwritten afterwards.
#[derive(Debug)]
pub struct AssemblyState {
    descriptor: FileDescriptor,
    slots: Vec<Option<Vec<u8>>>,
    stats: ScanStats,
}

impl AssemblyState {
    pub fn new(descriptor: FileDescriptor) -> Self {
        let slots = vec![None; descriptor.total_chunks as usize];
        Self {
            descriptor,
            slots,
            stats: ScanStats::default(),
        }
    }

    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    /// Parse scanned bytes against this transfer and add the frame. Rejections bump the error
    /// counter and leave everything else untouched.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<(u64, AddOutcome), FrameError> {
        match wire::parse_frame(bytes, &self.descriptor) {
            Ok(frame) => {
                let index = frame.index;
                self.add_chunk(frame).map(|outcome| (index, outcome))
            }
            Err(e) => {
                self.stats.errors += 1;
                warn!(error = %e, "frame dropped");
                Err(e)
            }
        }
    }

    /// Add an already-parsed frame.
    pub fn add_chunk(&mut self, frame: Frame) -> Result<AddOutcome, FrameError> {
        let total_chunks = self.descriptor.total_chunks;
        let slot = match usize::try_from(frame.index)
            .ok()
            .and_then(|i| self.slots.get_mut(i))
        {
            Some(slot) => slot,
            None => {
                self.stats.errors += 1;
                return Err(FrameError::InvalidIndex {
                    index: frame.index,
                    total_chunks,
                });
            }
        };
        self.stats.total += 1;
        if slot.is_some() {
            self.stats.duplicates += 1;
            trace!(index = frame.index, "duplicate frame");
            return Ok(AddOutcome::Duplicate);
        }
        debug!(
            index = frame.index,
            len = frame.payload.len(),
            "chunk {}/{} accepted",
            frame.index + 1,
            total_chunks
        );
        *slot = Some(frame.payload);
        self.stats.count += 1;
        Ok(AddOutcome::Accepted)
    }

    /// Count a frame the session refused before parsing it.
    pub(crate) fn record_error(&mut self) {
        self.stats.errors += 1;
    }

    pub fn has_chunk(&self, index: u64) -> bool {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get(i))
            .is_some_and(Option::is_some)
    }

    /// Indices whose slot is still empty, ascending.
    pub fn find_missing(&self) -> Vec<u64> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i as u64)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.stats.count == self.descriptor.total_chunks
    }

    /// Percentage of unique chunks received; an empty transfer is 100%.
    pub fn progress_percent(&self) -> f64 {
        if self.descriptor.total_chunks == 0 {
            return 100.0;
        }
        self.stats.count as f64 * 100.0 / self.descriptor.total_chunks as f64
    }

    /// Recovery request for the chunks still missing.
    pub fn recovery_request(&self) -> RecoveryRequest {
        RecoveryRequest::new(&self.descriptor.hash, self.find_missing())
    }

    /// Concatenate slots in index order and check the digest. Missing chunks are reported as a
    /// value; a digest mismatch is an error and the bytes are dropped.
    pub fn assemble(&self) -> Result<Assembly, AssemblyError> {
        let missing = self.find_missing();
        if !missing.is_empty() {
            return Ok(Assembly::Missing(missing));
        }
        let len: usize = self.slots.iter().flatten().map(Vec::len).sum();
        let mut data = Vec::with_capacity(len);
        for payload in self.slots.iter().flatten() {
            data.extend_from_slice(payload);
        }
        let actual = integrity::hash_bytes(&data);
        if actual != self.descriptor.hash {
            error!(
                expected = %self.descriptor.hash,
                actual = %actual,
                "reassembled file failed digest check"
            );
            return Err(AssemblyError::Integrity {
                expected: self.descriptor.hash,
                actual,
            });
        }
        Ok(Assembly::Complete(data))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    #[error("reassembled file digest {actual} does not match announced {expected}")]
    Integrity {
        expected: FileDigest,
        actual: FileDigest,
    },
}
