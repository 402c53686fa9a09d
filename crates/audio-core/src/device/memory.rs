//! Memory-backed audio device
//!
//! Lets applications and tests drive the voice pipeline without audio
//! hardware: captured audio is pushed in by the caller and rendered audio is
//! collected into a buffer that can be inspected.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::{AudioIoPort, CaptureSink};
use crate::error::{AudioError, AudioResult};
use crate::format::AudioFormat;

/// In-memory [`AudioIoPort`]
pub struct MemoryAudioPort {
    name: String,
    format: AudioFormat,
    sink: Mutex<Option<CaptureSink>>,
    capturing: AtomicBool,
    available: AtomicBool,
    output: Mutex<BytesMut>,
    output_notify: Notify,
    bytes_captured: AtomicU64,
    bytes_written: AtomicU64,
}

impl MemoryAudioPort {
    /// Create a port running the voice format
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format: AudioFormat::voice(),
            sink: Mutex::new(None),
            capturing: AtomicBool::new(false),
            available: AtomicBool::new(true),
            output: Mutex::new(BytesMut::new()),
            output_notify: Notify::new(),
            bytes_captured: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Create a port reporting a different format (to exercise format checks)
    pub fn with_format(name: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            format,
            ..Self::new(name)
        }
    }

    /// Make the next `start_capture` fail as if the device was unplugged
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Deliver captured PCM to the registered sink, as a device callback would
    pub fn feed(&self, pcm: &[u8]) -> AudioResult<()> {
        if !self.capturing.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceStopped {
                device: self.name.clone(),
            });
        }
        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            self.bytes_captured.fetch_add(pcm.len() as u64, Ordering::Relaxed);
            sink(pcm);
        }
        Ok(())
    }

    /// Feed a clip in `chunk_len` pieces, one piece per `period`.
    ///
    /// Stops early when capture stops.
    pub fn play_clip(
        self: &Arc<Self>,
        clip: Bytes,
        chunk_len: usize,
        period: Duration,
    ) -> JoinHandle<usize> {
        let port = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut fed = 0;
            for chunk in clip.chunks(chunk_len.max(1)) {
                ticker.tick().await;
                if port.feed(chunk).is_err() {
                    tracing::debug!("{}: capture stopped after {} bytes", port.name, fed);
                    break;
                }
                fed += chunk.len();
            }
            fed
        })
    }

    /// Rendered bytes so far, without consuming them
    pub fn output_len(&self) -> usize {
        self.output.lock().len()
    }

    /// Take everything rendered so far
    pub fn take_output(&self) -> Bytes {
        self.output.lock().split().freeze()
    }

    /// Wait until at least `min_bytes` have been rendered.
    ///
    /// Returns false on timeout.
    pub async fn wait_for_output(&self, min_bytes: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.output_notify.notified();
                if self.output_len() >= min_bytes {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Total bytes delivered to the capture sink
    pub fn bytes_captured(&self) -> u64 {
        self.bytes_captured.load(Ordering::Relaxed)
    }

    /// Total bytes written for playback
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

impl AudioIoPort for MemoryAudioPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start_capture(&self, sink: CaptureSink) -> AudioResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AudioError::unavailable(&self.name, "device not present"));
        }
        *self.sink.lock() = Some(sink);
        self.capturing.store(true, Ordering::SeqCst);
        tracing::debug!("{}: capture started", self.name);
        Ok(())
    }

    fn stop_capture(&self) -> AudioResult<()> {
        self.capturing.store(false, Ordering::SeqCst);
        self.sink.lock().take();
        tracing::debug!("{}: capture stopped", self.name);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn write(&self, pcm: &[u8]) -> AudioResult<()> {
        self.output.lock().extend_from_slice(pcm);
        self.bytes_written.fetch_add(pcm.len() as u64, Ordering::Relaxed);
        self.output_notify.notify_waiters();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryAudioPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAudioPort")
            .field("name", &self.name)
            .field("capturing", &self.is_capturing())
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_requires_running_capture() {
        let port = MemoryAudioPort::new("mic");
        assert!(matches!(port.feed(&[0u8; 4]), Err(AudioError::DeviceStopped { .. })));
    }

    #[test]
    fn test_capture_reaches_sink() {
        let port = MemoryAudioPort::new("mic");
        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        port.start_capture(Arc::new(move |pcm: &[u8]| {
            seen_clone.fetch_add(pcm.len() as u64, Ordering::SeqCst);
        }))
        .unwrap();

        port.feed(&[0u8; 100]).unwrap();
        port.feed(&[0u8; 28]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 128);

        port.stop_capture().unwrap();
        assert!(port.feed(&[0u8; 1]).is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 128);
    }

    #[test]
    fn test_unavailable_device() {
        let port = MemoryAudioPort::new("mic");
        port.set_available(false);
        let err = port.start_capture(Arc::new(|_: &[u8]| {})).unwrap_err();
        assert!(matches!(err, AudioError::DeviceUnavailable { .. }));
        assert!(!port.is_capturing());
    }

    #[tokio::test]
    async fn test_output_waiter() {
        let port = Arc::new(MemoryAudioPort::new("speaker"));
        let writer = port.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.write(&[1u8; 64]).unwrap();
        });

        assert!(port.wait_for_output(64, Duration::from_secs(2)).await);
        assert_eq!(port.take_output().len(), 64);
        assert_eq!(port.output_len(), 0);
    }

    #[tokio::test]
    async fn test_play_clip_paced() {
        let port = Arc::new(MemoryAudioPort::new("mic"));
        port.start_capture(Arc::new(|_: &[u8]| {})).unwrap();

        let fed = port
            .play_clip(Bytes::from(vec![0u8; 1000]), 300, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(fed, 1000);
        assert_eq!(port.bytes_captured(), 1000);
    }
}
