//! Capture-side frame assembly
//!
//! Audio devices hand over PCM in whatever chunk size they like. The
//! [`FrameBuffer`] regroups that stream into exact [`FRAME_BYTES`] blocks and
//! keeps the incomplete tail for the next call.
//!
//! Byte accounting holds at every point: the bytes of every block yielded so
//! far plus the bytes still pending equal the bytes ever appended (less
//! anything explicitly discarded or flushed by [`FrameBuffer::reset`]).

use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, MutexGuard};
use rvoice_codec_core::FRAME_BYTES;

/// What to do with an incomplete frame when capture stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidueMode {
    /// Drop the partial frame
    #[default]
    Discard,
    /// Hand the partial frame back so it can be padded and sent
    Flush,
}

impl std::str::FromStr for ResidueMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "flush" => Ok(Self::Flush),
            other => Err(format!("unknown residue mode '{}'", other)),
        }
    }
}

/// Counters kept by a [`FrameBuffer`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameBufferStats {
    /// Bytes ever appended
    pub bytes_appended: u64,
    /// Complete frames yielded
    pub frames_emitted: u64,
    /// Residue bytes dropped by [`ResidueMode::Discard`]
    pub bytes_discarded: u64,
    /// Residue bytes handed back by [`ResidueMode::Flush`]
    pub bytes_flushed: u64,
}

#[derive(Debug, Default)]
struct Inner {
    pending: BytesMut,
    stats: FrameBufferStats,
}

/// Regroups arbitrary PCM chunks into whole frames
#[derive(Debug, Default)]
pub struct FrameBuffer {
    inner: Mutex<Inner>,
}

impl FrameBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: BytesMut::with_capacity(FRAME_BYTES * 2),
                stats: FrameBufferStats::default(),
            }),
        }
    }

    /// Append captured bytes and return the complete frames now available.
    ///
    /// The returned iterator holds the buffer lock until it is dropped, so a
    /// concurrent `append` waits instead of interleaving. Frames the caller
    /// does not pull stay buffered and come out of the next `append`.
    pub fn append(&self, bytes: &[u8]) -> FrameDrain<'_> {
        let mut guard = self.inner.lock();
        guard.pending.extend_from_slice(bytes);
        guard.stats.bytes_appended += bytes.len() as u64;
        FrameDrain { guard }
    }

    /// Bytes waiting for a full frame (or undrained frames)
    pub fn residue_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> FrameBufferStats {
        self.inner.lock().stats
    }

    /// Clear pending bytes.
    ///
    /// With [`ResidueMode::Flush`] the pending bytes are returned (if any);
    /// with [`ResidueMode::Discard`] they are dropped and counted.
    pub fn reset(&self, mode: ResidueMode) -> Option<Bytes> {
        let mut guard = self.inner.lock();
        if guard.pending.is_empty() {
            return None;
        }
        let residue = guard.pending.split().freeze();
        match mode {
            ResidueMode::Discard => {
                guard.stats.bytes_discarded += residue.len() as u64;
                tracing::debug!("Discarded {} residue bytes", residue.len());
                None
            }
            ResidueMode::Flush => {
                guard.stats.bytes_flushed += residue.len() as u64;
                tracing::debug!("Flushing {} residue bytes", residue.len());
                Some(residue)
            }
        }
    }
}

/// Lazy iterator over complete frames; see [`FrameBuffer::append`]
pub struct FrameDrain<'a> {
    guard: MutexGuard<'a, Inner>,
}

impl Iterator for FrameDrain<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.guard.pending.len() < FRAME_BYTES {
            return None;
        }
        self.guard.stats.frames_emitted += 1;
        Some(self.guard.pending.split_to(FRAME_BYTES).freeze())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.guard.pending.len() / FRAME_BYTES;
        (n, Some(n))
    }
}

impl ExactSizeIterator for FrameDrain<'_> {}

impl std::iter::FusedIterator for FrameDrain<'_> {}
