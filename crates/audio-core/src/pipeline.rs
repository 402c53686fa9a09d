//! Capture and playback pipelines
//!
//! [`CapturePipeline`] turns raw device chunks into [`AudioFrame`]s and hands
//! each one to a consumer. [`PlaybackPipeline`] renders decoded frames on a
//! port. Neither ever returns an error into the device callback: failures are
//! logged and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rvoice_codec_core::{AudioFrame, FRAME_BYTES};

use crate::buffer::{FrameBuffer, FrameBufferStats, ResidueMode};
use crate::device::AudioIoPort;

/// Receives frames assembled by a [`CapturePipeline`]
pub trait FrameSink: Send + Sync {
    /// Called once per complete frame, on the capture thread
    fn on_frame(&self, frame: &AudioFrame);
}

impl<F> FrameSink for F
where
    F: Fn(&AudioFrame) + Send + Sync,
{
    fn on_frame(&self, frame: &AudioFrame) {
        self(frame)
    }
}

/// Device chunks in, frames out
pub struct CapturePipeline {
    buffer: FrameBuffer,
    sink: Arc<dyn FrameSink>,
    rejected: AtomicU64,
}

impl CapturePipeline {
    /// Create a pipeline delivering to `sink`
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            sink,
            rejected: AtomicU64::new(0),
        }
    }

    /// Feed one captured chunk; returns the number of frames delivered
    pub fn push(&self, pcm: &[u8]) -> usize {
        let mut delivered = 0;
        for block in self.buffer.append(pcm) {
            match AudioFrame::from_pcm_bytes(&block) {
                Ok(frame) => {
                    self.sink.on_frame(&frame);
                    delivered += 1;
                }
                Err(e) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Dropping captured block: {}", e);
                }
            }
        }
        delivered
    }

    /// Resolve the pending residue at end of capture.
    ///
    /// With [`ResidueMode::Flush`] every pending byte is delivered, the last
    /// frame zero-padded. Returns the number of frames delivered.
    pub fn finish(&self, mode: ResidueMode) -> usize {
        let Some(residue) = self.buffer.reset(mode) else {
            return 0;
        };
        let mut delivered = 0;
        for chunk in residue.chunks(FRAME_BYTES) {
            self.sink.on_frame(&AudioFrame::from_padded_pcm(chunk));
            delivered += 1;
        }
        delivered
    }

    /// Bytes waiting for a full frame
    pub fn residue_len(&self) -> usize {
        self.buffer.residue_len()
    }

    /// Framing counters
    pub fn buffer_stats(&self) -> FrameBufferStats {
        self.buffer.stats()
    }

    /// Blocks that could not be turned into a frame
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Counters kept by a [`PlaybackPipeline`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Frames written to the device
    pub frames_played: u64,
    /// Frames the device refused
    pub write_errors: u64,
}

/// Decoded frames in, device writes out
pub struct PlaybackPipeline {
    port: Arc<dyn AudioIoPort>,
    frames_played: AtomicU64,
    write_errors: AtomicU64,
}

impl PlaybackPipeline {
    /// Create a pipeline rendering on `port`
    pub fn new(port: Arc<dyn AudioIoPort>) -> Self {
        Self {
            port,
            frames_played: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
        }
    }

    /// Render one frame; device errors are logged and counted
    pub fn play(&self, frame: &AudioFrame) -> bool {
        match self.port.write(&frame.to_pcm_bytes()) {
            Ok(()) => {
                self.frames_played.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.write_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Playback write failed on {}: {}", self.port.name(), e);
                false
            }
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            frames_played: self.frames_played.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryAudioPort;
    use parking_lot::Mutex;

    fn collecting_sink() -> (Arc<Mutex<Vec<AudioFrame>>>, Arc<dyn FrameSink>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let frames_clone = frames.clone();
        let sink: Arc<dyn FrameSink> = Arc::new(move |frame: &AudioFrame| {
            frames_clone.lock().push(frame.clone());
        });
        (frames, sink)
    }

    #[test]
    fn test_capture_assembles_frames() {
        let (frames, sink) = collecting_sink();
        let pipeline = CapturePipeline::new(sink);

        assert_eq!(pipeline.push(&[0u8; 1000]), 0);
        assert_eq!(pipeline.push(&[0u8; 3000]), 2);
        assert_eq!(frames.lock().len(), 2);
        assert_eq!(pipeline.residue_len(), 80);
    }

    #[test]
    fn test_finish_discard_sends_nothing() {
        let (frames, sink) = collecting_sink();
        let pipeline = CapturePipeline::new(sink);
        pipeline.push(&[9u8; 500]);

        assert_eq!(pipeline.finish(ResidueMode::Discard), 0);
        assert!(frames.lock().is_empty());
        assert_eq!(pipeline.buffer_stats().bytes_discarded, 500);
    }

    #[test]
    fn test_finish_flush_pads_last_frame() {
        let (frames, sink) = collecting_sink();
        let pipeline = CapturePipeline::new(sink);
        pipeline.push(&[0x01u8; 500]);

        assert_eq!(pipeline.finish(ResidueMode::Flush), 1);
        let frames = frames.lock();
        assert_eq!(frames[0].sample_count(), 960);
        assert_eq!(frames[0].samples()[0], 0x0101);
        assert_eq!(frames[0].samples()[250], 0);
        assert_eq!(pipeline.residue_len(), 0);
    }

    #[test]
    fn test_playback_writes_pcm() {
        let port = Arc::new(MemoryAudioPort::new("speaker"));
        let pipeline = PlaybackPipeline::new(port.clone());

        assert!(pipeline.play(&AudioFrame::silence()));
        assert_eq!(port.output_len(), FRAME_BYTES);
        assert_eq!(pipeline.stats().frames_played, 1);
    }
}
