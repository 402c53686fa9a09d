//! Voice engine
//!
//! [`VoiceEngine`] is the application-facing object. It owns one audio port
//! and one [`SessionManager`]: captured PCM is framed and sent to every
//! connected peer, decoded peer audio is written back to the port, and peer
//! commands go straight to the manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use rvoice_audio_core::{
    AudioIoPort, CapturePipeline, FrameBufferStats, PlaybackPipeline, PlaybackStats, ResidueMode,
};
use rvoice_codec_core::AudioFrame;
use rvoice_session_core::{
    ConfigHandle, IceCandidate, ManagerConfig, MediaStats, PeerId, Role, SessionDescription,
    SessionEvent, SessionManager, SessionState, SignalEnvelope, SignalMessage, SignalingBridge,
    TransportFactory,
};

use crate::config::VoiceConfig;
use crate::error::{Result, VoiceError};

/// Engine-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Capture framing counters
    pub capture: FrameBufferStats,
    /// Playback counters
    pub playback: PlaybackStats,
    /// Inbound packets dropped on a full playback queue
    pub inbound_dropped: u64,
    /// Peers currently receiving audio
    pub connected_peers: usize,
}

/// Captures, encodes and exchanges voice with any number of peers
pub struct VoiceEngine {
    port: Arc<dyn AudioIoPort>,
    manager: SessionManager,
    capture: Arc<CapturePipeline>,
    playback: Arc<PlaybackPipeline>,
    residue: ResidueMode,
    capturing: AtomicBool,
}

impl VoiceEngine {
    /// Build an engine around `port`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: &VoiceConfig,
        port: Arc<dyn AudioIoPort>,
        factory: Arc<dyn TransportFactory>,
        signaling: Arc<dyn SignalingBridge>,
    ) -> Result<Self> {
        config.validate()?;
        if !port.format().is_voice() {
            return Err(rvoice_audio_core::AudioError::FormatUnsupported {
                format: port.format().description(),
            }
            .into());
        }

        let playback = Arc::new(PlaybackPipeline::new(port.clone()));
        let sink = playback.clone();
        let manager = SessionManager::new(
            ConfigHandle::new(config.session.clone())?,
            factory,
            signaling,
            Arc::new(move |frame: &AudioFrame| {
                sink.play(frame);
            }),
            ManagerConfig {
                inbound_queue_depth: config.inbound_queue_depth,
            },
        );

        let outbound = manager.clone();
        let capture = Arc::new(CapturePipeline::new(Arc::new(move |frame: &AudioFrame| {
            outbound.send_frame(frame);
        })));

        tracing::info!("Voice engine ready on {}", port.name());
        Ok(Self {
            port,
            manager,
            capture,
            playback,
            residue: config.residue.into(),
            capturing: AtomicBool::new(false),
        })
    }

    /// Start capturing; frames reach every connected peer
    pub fn start(&self) -> Result<()> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            return Err(VoiceError::AlreadyRunning);
        }
        let capture = self.capture.clone();
        let started = self.port.start_capture(Arc::new(move |pcm: &[u8]| {
            capture.push(pcm);
        }));
        if let Err(e) = started {
            self.capturing.store(false, Ordering::SeqCst);
            tracing::warn!("Capture on {} failed to start: {}", self.port.name(), e);
            return Err(e.into());
        }
        tracing::info!("Capture started on {}", self.port.name());
        Ok(())
    }

    /// Stop capturing with the configured residue handling
    pub fn stop(&self) -> Result<usize> {
        self.stop_with(self.residue)
    }

    /// Stop capturing; with [`ResidueMode::Flush`] the partial frame is
    /// zero-padded and sent. Returns the number of frames flushed.
    pub fn stop_with(&self, mode: ResidueMode) -> Result<usize> {
        if !self.is_running() {
            return Err(VoiceError::NotRunning);
        }
        // still running until the device confirms the stop
        self.port.stop_capture()?;
        if !self.capturing.swap(false, Ordering::SeqCst) {
            return Err(VoiceError::NotRunning);
        }
        let flushed = self.capture.finish(mode);
        tracing::info!(
            "Capture stopped on {} ({:?}, {} frame(s) flushed)",
            self.port.name(),
            mode,
            flushed
        );
        Ok(flushed)
    }

    /// Whether capture is running
    pub fn is_running(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Create a session for `peer` with the configured role
    pub async fn add_peer(&self, peer: impl Into<PeerId>) -> Result<()> {
        Ok(self.manager.add_peer(peer).await?)
    }

    /// Create a session for `peer` with an explicit role
    pub async fn add_peer_with_role(&self, peer: impl Into<PeerId>, role: Role) -> Result<()> {
        Ok(self.manager.add_peer_with_role(peer, role).await?)
    }

    /// Add `peer` as offerer and start the offer
    pub async fn call(&self, peer: impl Into<PeerId>) -> Result<()> {
        let peer = peer.into();
        self.manager.add_peer_with_role(peer.clone(), Role::Offerer).await?;
        Ok(self.manager.create_offer(&peer).await?)
    }

    /// Start an offer to an existing peer
    pub async fn create_offer(&self, peer: &PeerId) -> Result<()> {
        Ok(self.manager.create_offer(peer).await?)
    }

    /// Apply a remote description
    pub async fn set_remote_description(
        &self,
        peer: &PeerId,
        description: SessionDescription,
    ) -> Result<()> {
        Ok(self.manager.set_remote_description(peer, description).await?)
    }

    /// Apply a remote candidate
    pub async fn add_remote_candidate(&self, peer: &PeerId, candidate: IceCandidate) -> Result<()> {
        Ok(self.manager.add_remote_candidate(peer, candidate).await?)
    }

    /// Handle a signaling message from `peer`
    pub async fn handle_signal(&self, peer: &PeerId, message: SignalMessage) -> Result<()> {
        Ok(self.manager.handle_signal(peer, message).await?)
    }

    /// Consume envelopes from a signaling relay
    pub fn serve_signaling(&self, envelopes: mpsc::UnboundedReceiver<SignalEnvelope>) -> JoinHandle<()> {
        self.manager.serve_signaling(envelopes)
    }

    /// Hang up on `peer`
    pub async fn close_peer(&self, peer: &PeerId) -> Result<()> {
        Ok(self.manager.close_peer(peer).await?)
    }

    /// Session state for `peer`
    pub async fn peer_state(&self, peer: &PeerId) -> Option<SessionState> {
        self.manager.peer_state(peer).await
    }

    /// Media counters for `peer`
    pub fn media_stats(&self, peer: &PeerId) -> Option<MediaStats> {
        self.manager.media_stats(peer)
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.manager.subscribe()
    }

    /// Live configuration; bitrate, payload type and SSRC apply immediately
    pub fn config(&self) -> &ConfigHandle {
        self.manager.config()
    }

    /// The session manager
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Engine-wide counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            capture: self.capture.buffer_stats(),
            playback: self.playback.stats(),
            inbound_dropped: self.manager.inbound_dropped(),
            connected_peers: self.manager.connected_peers().len(),
        }
    }

    /// Stop capture (discarding the residue) and close every session
    pub async fn shutdown(&self) {
        if self.is_running() {
            if let Err(e) = self.stop_with(ResidueMode::Discard) {
                tracing::warn!("Capture did not stop cleanly: {}", e);
            }
        }
        self.manager.shutdown().await;
    }
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("port", &self.port.name())
            .field("capturing", &self.is_running())
            .field("manager", &self.manager)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rvoice_audio_core::{AudioError, AudioFormat, CaptureSink, MemoryAudioPort};
    use rvoice_session_core::{ChannelSignaling, LoopbackNetwork};

    fn engine(port: Arc<MemoryAudioPort>) -> Result<VoiceEngine> {
        let network = LoopbackNetwork::new();
        let (signaling, _rx) = ChannelSignaling::new("alice");
        VoiceEngine::new(
            &VoiceConfig::default(),
            port,
            network.factory("alice"),
            Arc::new(signaling),
        )
    }

    #[tokio::test]
    async fn test_start_stop_guards() {
        let port = Arc::new(MemoryAudioPort::new("mem"));
        let engine = engine(port.clone()).unwrap();

        assert!(matches!(engine.stop(), Err(VoiceError::NotRunning)));
        engine.start().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.start(), Err(VoiceError::AlreadyRunning)));

        port.feed(&vec![0u8; 1920 * 2 + 100]).unwrap();
        assert_eq!(engine.stats().capture.frames_emitted, 2);

        assert_eq!(engine.stop().unwrap(), 0);
        assert_eq!(engine.stats().capture.bytes_discarded, 100);
        assert!(port.feed(&[0u8; 4]).is_err());
    }

    /// Memory port whose stop can be made to fail
    struct StubbornPort {
        inner: MemoryAudioPort,
        refuse_stop: AtomicBool,
    }

    impl AudioIoPort for StubbornPort {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn format(&self) -> AudioFormat {
            self.inner.format()
        }

        fn start_capture(&self, sink: CaptureSink) -> rvoice_audio_core::AudioResult<()> {
            self.inner.start_capture(sink)
        }

        fn stop_capture(&self) -> rvoice_audio_core::AudioResult<()> {
            if self.refuse_stop.load(Ordering::SeqCst) {
                return Err(AudioError::unavailable(self.inner.name(), "stuck"));
            }
            self.inner.stop_capture()
        }

        fn is_capturing(&self) -> bool {
            self.inner.is_capturing()
        }

        fn write(&self, pcm: &[u8]) -> rvoice_audio_core::AudioResult<()> {
            self.inner.write(pcm)
        }
    }

    #[tokio::test]
    async fn test_failed_stop_keeps_running() {
        let port = Arc::new(StubbornPort {
            inner: MemoryAudioPort::new("stubborn"),
            refuse_stop: AtomicBool::new(true),
        });
        let network = LoopbackNetwork::new();
        let (signaling, _rx) = ChannelSignaling::new("alice");
        let engine = VoiceEngine::new(
            &VoiceConfig::default(),
            port.clone(),
            network.factory("alice"),
            Arc::new(signaling),
        )
        .unwrap();

        engine.start().unwrap();
        port.inner.feed(&[0u8; 100]).unwrap();
        assert!(matches!(engine.stop(), Err(VoiceError::Audio(_))));
        assert!(engine.is_running());
        assert!(port.is_capturing());

        port.refuse_stop.store(false, Ordering::SeqCst);
        assert_eq!(engine.stop().unwrap(), 0);
        assert!(!engine.is_running());
        assert_eq!(engine.stats().capture.bytes_discarded, 100);
    }

    #[tokio::test]
    async fn test_unavailable_device() {
        let port = Arc::new(MemoryAudioPort::new("mem"));
        port.set_available(false);
        let engine = engine(port).unwrap();
        assert!(matches!(engine.start(), Err(VoiceError::Audio(_))));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_wrong_format_rejected() {
        let port = Arc::new(MemoryAudioPort::with_format(
            "narrow",
            AudioFormat {
                sample_rate: 8000,
                ..AudioFormat::voice()
            },
        ));
        assert!(matches!(engine(port), Err(VoiceError::Audio(_))));
    }
}
