//! Per-session media channel
//!
//! Owns the outbound encoder and packetizer (one lock) and the inbound
//! decoder (another lock). The negotiation side only flips the send flag and
//! eventually calls [`MediaChannel::dispose`]; the audio side calls
//! [`MediaChannel::send_frame`] and [`MediaChannel::receive_packet`] and
//! never waits on negotiation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rvoice_codec_core::{AudioFrame, CodecConfig, Decoder, Encoder};
use rvoice_rtp_core::{PacketizerConfig, RtpPacketizer};

use crate::config::SessionConfig;
use crate::errors::Result;
use crate::transport::AudioTrack;
use crate::types::PeerId;

/// Counters kept by a [`MediaChannel`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaStats {
    /// Packets handed to the track
    pub frames_sent: u64,
    /// Outbound frames lost to encoder or packetizer errors
    pub encode_errors: u64,
    /// Outbound packets the track refused
    pub send_errors: u64,
    /// Packets received from the track
    pub packets_received: u64,
    /// Received packets that failed RTP validation
    pub malformed_packets: u64,
    /// Received packets that arrived before the session connected
    pub early_packets: u64,
    /// Received payloads the decoder rejected
    pub decode_errors: u64,
    /// Frames decoded for playback
    pub frames_decoded: u64,
}

#[derive(Default)]
struct Counters {
    frames_sent: AtomicU64,
    encode_errors: AtomicU64,
    send_errors: AtomicU64,
    packets_received: AtomicU64,
    malformed_packets: AtomicU64,
    early_packets: AtomicU64,
    decode_errors: AtomicU64,
    frames_decoded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Outbound {
    encoder: Encoder,
    packetizer: RtpPacketizer,
}

/// Result of feeding one received packet
#[derive(Debug)]
pub struct InboundFrame {
    /// The decoded frame
    pub frame: AudioFrame,
    /// True for the first frame this channel ever decoded
    pub first: bool,
}

/// Codec and packetization state of one peer session
pub struct MediaChannel {
    peer: PeerId,
    track: Arc<dyn AudioTrack>,
    send_enabled: AtomicBool,
    disposed: AtomicBool,
    audio_ready: AtomicBool,
    outbound: Mutex<Option<Outbound>>,
    inbound: Mutex<Option<Decoder>>,
    counters: Counters,
}

impl MediaChannel {
    /// Build the channel from the configuration snapshot.
    ///
    /// An encoder or decoder that fails to initialise does not prevent
    /// creation; every frame through it is then dropped and counted.
    pub fn new(peer: PeerId, config: &SessionConfig, track: Arc<dyn AudioTrack>) -> Result<Self> {
        let codec_config = CodecConfig::voice().with_bitrate(config.bitrate);
        let packetizer = RtpPacketizer::new(
            PacketizerConfig::default().with_stream(config.payload_type, config.ssrc),
        )?;
        Ok(Self {
            peer,
            track,
            send_enabled: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            audio_ready: AtomicBool::new(false),
            outbound: Mutex::new(Some(Outbound {
                encoder: Encoder::open(codec_config.clone()),
                packetizer,
            })),
            inbound: Mutex::new(Some(Decoder::open(codec_config))),
            counters: Counters::default(),
        })
    }

    /// Peer this channel belongs to
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Let outbound frames through
    pub fn enable_send(&self) {
        if !self.disposed.load(Ordering::SeqCst) {
            self.send_enabled.store(true, Ordering::SeqCst);
        }
    }

    /// Stop outbound frames
    pub fn disable_send(&self) {
        self.send_enabled.store(false, Ordering::SeqCst);
    }

    /// Whether outbound frames are let through
    pub fn is_send_enabled(&self) -> bool {
        self.send_enabled.load(Ordering::SeqCst)
    }

    /// Whether [`MediaChannel::dispose`] ran
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Encode, packetize and send one captured frame.
    ///
    /// Returns false when the frame was not sent: sending disabled, codec or
    /// packetizer failure, or the track refused it.
    pub fn send_frame(&self, frame: &AudioFrame) -> bool {
        if !self.is_send_enabled() {
            return false;
        }
        let mut outbound = self.outbound.lock();
        let Some(outbound) = outbound.as_mut() else {
            return false;
        };

        let encoded = match outbound.encoder.encode(frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                Counters::bump(&self.counters.encode_errors);
                tracing::warn!("{}: dropping frame, encode failed: {}", self.peer, e);
                return false;
            }
        };
        let packet = match outbound.packetizer.pack_to_bytes(&encoded) {
            Ok(packet) => packet,
            Err(e) => {
                Counters::bump(&self.counters.encode_errors);
                tracing::warn!("{}: dropping frame, packetize failed: {}", self.peer, e);
                return false;
            }
        };
        match self.track.send(packet) {
            Ok(()) => {
                Counters::bump(&self.counters.frames_sent);
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.send_errors);
                tracing::debug!("{}: track refused packet: {}", self.peer, e);
                false
            }
        }
    }

    /// Validate and decode one received packet.
    ///
    /// Decoding happens regardless of negotiation state; packets that arrive
    /// before the session is connected are counted as early.
    pub fn receive_packet(&self, data: &[u8]) -> Option<InboundFrame> {
        if self.is_disposed() {
            return None;
        }
        Counters::bump(&self.counters.packets_received);

        let (header, payload) = match RtpPacketizer::unpack(data) {
            Ok(parts) => parts,
            Err(e) => {
                Counters::bump(&self.counters.malformed_packets);
                tracing::warn!("{}: malformed packet ({} bytes): {}", self.peer, data.len(), e);
                return None;
            }
        };
        if !self.is_send_enabled() {
            Counters::bump(&self.counters.early_packets);
            tracing::debug!(
                "{}: packet seq={} arrived before the session connected",
                self.peer,
                header.sequence_number
            );
        }

        let mut inbound = self.inbound.lock();
        let decoder = inbound.as_mut()?;
        match decoder.decode(&payload) {
            Ok(frame) => {
                Counters::bump(&self.counters.frames_decoded);
                let first = !self.audio_ready.swap(true, Ordering::SeqCst);
                Some(InboundFrame { frame, first })
            }
            Err(e) => {
                Counters::bump(&self.counters.decode_errors);
                tracing::warn!("{}: dropping packet seq={}: {}", self.peer, header.sequence_number, e);
                None
            }
        }
    }

    /// Apply a new encoder bitrate
    pub fn set_bitrate(&self, bitrate: u32) -> Result<()> {
        if let Some(outbound) = self.outbound.lock().as_mut() {
            outbound.encoder.set_bitrate(bitrate)?;
        }
        Ok(())
    }

    /// Apply a new RTP payload type
    pub fn set_payload_type(&self, payload_type: u8) -> Result<()> {
        if let Some(outbound) = self.outbound.lock().as_ref() {
            outbound.packetizer.set_payload_type(payload_type)?;
        }
        Ok(())
    }

    /// Apply a new RTP SSRC
    pub fn set_ssrc(&self, ssrc: u32) {
        if let Some(outbound) = self.outbound.lock().as_ref() {
            outbound.packetizer.set_ssrc(ssrc);
        }
    }

    /// Current encoder bitrate, if the channel is alive
    pub fn bitrate(&self) -> Option<u32> {
        self.outbound.lock().as_ref().map(|o| o.encoder.bitrate())
    }

    /// Release codec and packetizer state.
    ///
    /// Waits for any in-flight encode or decode to finish. Idempotent.
    pub fn dispose(&self) {
        self.disable_send();
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut outbound) = self.outbound.lock().take() {
            outbound.packetizer.close();
            outbound.encoder.dispose();
        }
        if let Some(mut decoder) = self.inbound.lock().take() {
            decoder.dispose();
        }
        tracing::debug!("{}: media channel disposed", self.peer);
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> MediaStats {
        let c = &self.counters;
        MediaStats {
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
            encode_errors: c.encode_errors.load(Ordering::Relaxed),
            send_errors: c.send_errors.load(Ordering::Relaxed),
            packets_received: c.packets_received.load(Ordering::Relaxed),
            malformed_packets: c.malformed_packets.load(Ordering::Relaxed),
            early_packets: c.early_packets.load(Ordering::Relaxed),
            decode_errors: c.decode_errors.load(Ordering::Relaxed),
            frames_decoded: c.frames_decoded.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for MediaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaChannel")
            .field("peer", &self.peer)
            .field("send_enabled", &self.is_send_enabled())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TransportError;
    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingTrack {
        sent: Mutex<Vec<Bytes>>,
        closed: AtomicBool,
    }

    impl AudioTrack for RecordingTrack {
        fn send(&self, packet: Bytes) -> std::result::Result<(), TransportError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::NotConnected);
            }
            self.sent.lock().push(packet);
            Ok(())
        }

        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }
    }

    fn channel() -> (Arc<RecordingTrack>, MediaChannel) {
        let track = Arc::new(RecordingTrack::default());
        let channel =
            MediaChannel::new(PeerId::from("bob"), &SessionConfig::default(), track.clone()).unwrap();
        (track, channel)
    }

    #[test]
    fn test_send_gated_by_flag() {
        let (track, channel) = channel();
        assert!(!channel.send_frame(&AudioFrame::silence()));
        assert!(track.sent.lock().is_empty());

        channel.enable_send();
        assert!(channel.send_frame(&AudioFrame::silence()));
        assert!(channel.send_frame(&AudioFrame::silence()));
        assert_eq!(track.sent.lock().len(), 2);
        assert_eq!(channel.stats().frames_sent, 2);

        let sent = track.sent.lock();
        let (first, _) = RtpPacketizer::unpack(&sent[0]).unwrap();
        let (second, _) = RtpPacketizer::unpack(&sent[1]).unwrap();
        assert_eq!(first.payload_type, 111);
        assert_eq!(first.ssrc, 2);
        assert_eq!(second.sequence_number, first.sequence_number.wrapping_add(1));
        assert_eq!(second.timestamp, first.timestamp.wrapping_add(960));
    }

    #[test]
    fn test_receive_decodes_and_flags_first_frame() {
        let (track, sender) = channel();
        sender.enable_send();
        sender.send_frame(&AudioFrame::silence());
        sender.send_frame(&AudioFrame::silence());

        let (_, receiver) = channel();
        receiver.enable_send();
        let packets = track.sent.lock().clone();
        let first = receiver.receive_packet(&packets[0]).unwrap();
        let second = receiver.receive_packet(&packets[1]).unwrap();
        assert!(first.first);
        assert!(!second.first);
        assert_eq!(first.frame.sample_count(), 960);
        assert_eq!(receiver.stats().early_packets, 0);
    }

    #[test]
    fn test_early_and_malformed_packets_counted() {
        let (track, sender) = channel();
        sender.enable_send();
        sender.send_frame(&AudioFrame::silence());

        let (_, receiver) = channel();
        assert!(receiver.receive_packet(&[0x80, 0x6F, 0x00]).is_none());
        assert!(receiver.receive_packet(&track.sent.lock()[0]).is_some());

        let stats = receiver.stats();
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.malformed_packets, 1);
        assert_eq!(stats.early_packets, 1);
    }

    #[test]
    fn test_runtime_reconfiguration() {
        let (track, channel) = channel();
        channel.enable_send();
        channel.set_bitrate(24_000).unwrap();
        channel.set_payload_type(100).unwrap();
        channel.set_ssrc(9);
        assert!(channel.set_bitrate(1).is_err());
        assert_eq!(channel.bitrate(), Some(24_000));

        channel.send_frame(&AudioFrame::silence());
        let (header, _) = RtpPacketizer::unpack(&track.sent.lock()[0]).unwrap();
        assert_eq!(header.payload_type, 100);
        assert_eq!(header.ssrc, 9);
    }

    #[test]
    fn test_dispose_stops_both_directions() {
        let (track, channel) = channel();
        channel.enable_send();
        channel.send_frame(&AudioFrame::silence());
        let packet = track.sent.lock()[0].clone();

        channel.dispose();
        channel.dispose();
        channel.enable_send();
        assert!(!channel.is_send_enabled());
        assert!(!channel.send_frame(&AudioFrame::silence()));
        assert!(channel.receive_packet(&packet).is_none());
        assert_eq!(channel.bitrate(), None);
    }

    #[test]
    fn test_track_refusal_counted() {
        let (track, channel) = channel();
        channel.enable_send();
        track.closed.store(true, Ordering::SeqCst);
        assert!(!channel.send_frame(&AudioFrame::silence()));
        assert_eq!(channel.stats().send_errors, 1);
    }
}
