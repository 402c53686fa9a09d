//! Per-session RTP packetization
//!
//! One [`RtpPacketizer`] exists per negotiated session and owns the outgoing
//! sequence number and timestamp. Each packed frame advances the sequence by
//! one and the timestamp by one frame's worth of samples, both wrapping. The
//! first packet carries exactly the initial values.

use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use rvoice_codec_core::{EncodedFrame, MAX_ENCODED_FRAME_SIZE, SAMPLES_PER_FRAME};

use crate::error::Error;
use crate::packet::{RtpHeader, RtpPacket, RTP_MAX_PAYLOAD_TYPE, RTP_VERSION};
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// Dynamic payload type conventionally used for Opus
pub const DEFAULT_PAYLOAD_TYPE: u8 = 111;

/// Default synchronization source
pub const DEFAULT_SSRC: RtpSsrc = 2;

/// Packetizer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketizerConfig {
    /// Payload type written into every header
    pub payload_type: u8,
    /// SSRC written into every header
    pub ssrc: RtpSsrc,
    /// Sequence number of the first packet; random when `None`
    pub initial_sequence: Option<RtpSequenceNumber>,
    /// Timestamp of the first packet; random when `None`
    pub initial_timestamp: Option<RtpTimestamp>,
    /// Timestamp increment per packet
    pub samples_per_frame: u32,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            payload_type: DEFAULT_PAYLOAD_TYPE,
            ssrc: DEFAULT_SSRC,
            initial_sequence: None,
            initial_timestamp: None,
            samples_per_frame: SAMPLES_PER_FRAME as u32,
        }
    }
}

impl PacketizerConfig {
    /// Fix the first sequence number and timestamp
    pub fn with_initial(mut self, sequence: RtpSequenceNumber, timestamp: RtpTimestamp) -> Self {
        self.initial_sequence = Some(sequence);
        self.initial_timestamp = Some(timestamp);
        self
    }

    /// Set payload type and SSRC
    pub fn with_stream(mut self, payload_type: u8, ssrc: RtpSsrc) -> Self {
        self.payload_type = payload_type;
        self.ssrc = ssrc;
        self
    }
}

/// Packetizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketizerStats {
    /// Packets produced
    pub packets_sent: u64,
    /// Payload octets produced
    pub octets_sent: u64,
}

#[derive(Debug)]
struct State {
    payload_type: u8,
    ssrc: RtpSsrc,
    sequence: RtpSequenceNumber,
    timestamp: RtpTimestamp,
    increment: u32,
    stats: PacketizerStats,
    closed: bool,
}

/// Wraps encoded frames in RTP headers for one session
#[derive(Debug)]
pub struct RtpPacketizer {
    state: Mutex<State>,
}

impl RtpPacketizer {
    /// Create a packetizer; missing initial values are drawn at random
    pub fn new(config: PacketizerConfig) -> Result<Self> {
        if config.payload_type > RTP_MAX_PAYLOAD_TYPE {
            return Err(Error::InvalidParameter(format!(
                "payload type {} does not fit in 7 bits",
                config.payload_type
            )));
        }
        let mut rng = rand::thread_rng();
        let sequence = config.initial_sequence.unwrap_or_else(|| rng.gen());
        let timestamp = config.initial_timestamp.unwrap_or_else(|| rng.gen());

        tracing::debug!(
            "New packetizer: pt={} ssrc={} seq={} ts={}",
            config.payload_type,
            config.ssrc,
            sequence,
            timestamp
        );

        Ok(Self {
            state: Mutex::new(State {
                payload_type: config.payload_type,
                ssrc: config.ssrc,
                sequence,
                timestamp,
                increment: config.samples_per_frame,
                stats: PacketizerStats::default(),
                closed: false,
            }),
        })
    }

    /// Wrap one encoded frame, advancing sequence and timestamp
    pub fn pack(&self, frame: &EncodedFrame) -> Result<RtpPacket> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::Closed);
        }

        let header = RtpHeader::new(state.payload_type, state.sequence, state.timestamp, state.ssrc)
            .with_marker(true);

        state.sequence = state.sequence.wrapping_add(1);
        state.timestamp = state.timestamp.wrapping_add(state.increment);
        state.stats.packets_sent += 1;
        state.stats.octets_sent += frame.len() as u64;

        tracing::trace!(
            "Packed seq={} ts={} len={}",
            header.sequence_number,
            header.timestamp,
            frame.len()
        );

        Ok(RtpPacket::new(header, frame.data().clone()))
    }

    /// Wrap one encoded frame and serialize it for the wire
    pub fn pack_to_bytes(&self, frame: &EncodedFrame) -> Result<Bytes> {
        self.pack(frame)?.serialize()
    }

    /// Strip the RTP header from a received packet.
    ///
    /// Rejects packets shorter than the fixed header, versions other than 2,
    /// and payloads that are empty or larger than one encoded frame. Touches
    /// no packetizer state.
    pub fn unpack(data: &[u8]) -> Result<(RtpHeader, EncodedFrame)> {
        let packet = RtpPacket::parse(data)?;
        if packet.header.version != RTP_VERSION {
            return Err(Error::InvalidPacket(format!(
                "Invalid RTP version: {}",
                packet.header.version
            )));
        }
        if packet.payload.is_empty() {
            return Err(Error::InvalidPayload("empty payload".to_string()));
        }
        if packet.payload.len() > MAX_ENCODED_FRAME_SIZE {
            return Err(Error::InvalidPayload(format!(
                "{} byte payload exceeds the {} byte frame bound",
                packet.payload.len(),
                MAX_ENCODED_FRAME_SIZE
            )));
        }
        let frame = EncodedFrame::new(packet.payload)
            .map_err(|e| Error::InvalidPayload(e.to_string()))?;
        Ok((packet.header, frame))
    }

    /// Change the payload type of subsequent packets
    pub fn set_payload_type(&self, payload_type: u8) -> Result<()> {
        if payload_type > RTP_MAX_PAYLOAD_TYPE {
            return Err(Error::InvalidParameter(format!(
                "payload type {} does not fit in 7 bits",
                payload_type
            )));
        }
        self.state.lock().payload_type = payload_type;
        Ok(())
    }

    /// Change the SSRC of subsequent packets
    pub fn set_ssrc(&self, ssrc: RtpSsrc) {
        self.state.lock().ssrc = ssrc;
    }

    /// Payload type currently in use
    pub fn payload_type(&self) -> u8 {
        self.state.lock().payload_type
    }

    /// SSRC currently in use
    pub fn ssrc(&self) -> RtpSsrc {
        self.state.lock().ssrc
    }

    /// Sequence number the next packet will carry
    pub fn next_sequence(&self) -> RtpSequenceNumber {
        self.state.lock().sequence
    }

    /// Timestamp the next packet will carry
    pub fn next_timestamp(&self) -> RtpTimestamp {
        self.state.lock().timestamp
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PacketizerStats {
        self.state.lock().stats
    }

    /// Refuse further packing; idempotent
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Whether [`RtpPacketizer::close`] was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(len: usize) -> EncodedFrame {
        EncodedFrame::new(vec![0x5Au8; len]).unwrap()
    }

    fn fixed(seq: u16, ts: u32) -> RtpPacketizer {
        RtpPacketizer::new(PacketizerConfig::default().with_initial(seq, ts)).unwrap()
    }

    #[test]
    fn test_first_packet_carries_initial_values() {
        let packetizer = fixed(100, 5000);
        let packet = packetizer.pack(&frame(10)).unwrap();
        assert_eq!(packet.header.sequence_number, 100);
        assert_eq!(packet.header.timestamp, 5000);
        assert_eq!(packet.header.payload_type, DEFAULT_PAYLOAD_TYPE);
        assert_eq!(packet.header.ssrc, DEFAULT_SSRC);
        assert!(packet.header.marker);
    }

    #[test]
    fn test_sequence_and_timestamp_wrap() {
        let packetizer = fixed(u16::MAX - 1, u32::MAX - 959);
        let headers: Vec<RtpHeader> = (0..4)
            .map(|_| packetizer.pack(&frame(3)).unwrap().header)
            .collect();

        let seqs: Vec<u16> = headers.iter().map(|h| h.sequence_number).collect();
        let stamps: Vec<u32> = headers.iter().map(|h| h.timestamp).collect();
        assert_eq!(seqs, vec![u16::MAX - 1, u16::MAX, 0, 1]);
        assert_eq!(stamps, vec![u32::MAX - 959, 0, 960, 1920]);
    }

    #[test]
    fn test_unpack_recovers_pack() {
        let packetizer = fixed(42, 96_000);
        let wire = packetizer.pack_to_bytes(&frame(80)).unwrap();
        assert_eq!(wire[0], 0x80);
        assert_eq!(wire[1], 0x80 | DEFAULT_PAYLOAD_TYPE);

        let (header, payload) = RtpPacketizer::unpack(&wire).unwrap();
        assert_eq!(header.sequence_number, 42);
        assert_eq!(header.timestamp, 96_000);
        assert_eq!(header.ssrc, DEFAULT_SSRC);
        assert_eq!(payload, frame(80));
    }

    #[test]
    fn test_unpack_rejections() {
        assert!(matches!(
            RtpPacketizer::unpack(&[0x80; 11]),
            Err(Error::MalformedPacket { .. })
        ));
        // header only, no payload
        assert!(matches!(
            RtpPacketizer::unpack(&[0x80, 111, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2]),
            Err(Error::InvalidPayload(_))
        ));
        let mut oversized = vec![0u8; 12 + MAX_ENCODED_FRAME_SIZE + 1];
        oversized[0] = 0x80;
        assert!(matches!(
            RtpPacketizer::unpack(&oversized),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_unpack_does_not_touch_state() {
        let packetizer = fixed(7, 70);
        let _ = RtpPacketizer::unpack(&[1, 2, 3]);
        let _ = RtpPacketizer::unpack(&packetizer.pack_to_bytes(&frame(4)).unwrap());
        assert_eq!(packetizer.next_sequence(), 8);
        assert_eq!(packetizer.stats().packets_sent, 1);
    }

    #[test]
    fn test_runtime_stream_changes() {
        let packetizer = fixed(0, 0);
        packetizer.set_payload_type(96).unwrap();
        packetizer.set_ssrc(0xABCD);
        assert!(packetizer.set_payload_type(128).is_err());

        let packet = packetizer.pack(&frame(1)).unwrap();
        assert_eq!(packet.header.payload_type, 96);
        assert_eq!(packet.header.ssrc, 0xABCD);
    }

    #[test]
    fn test_closed_packetizer() {
        let packetizer = fixed(0, 0);
        packetizer.close();
        packetizer.close();
        assert_eq!(packetizer.pack(&frame(1)).unwrap_err(), Error::Closed);
        assert_eq!(packetizer.stats().packets_sent, 0);
    }

    #[test]
    fn test_random_initial_values_differ() {
        let a: Vec<u32> = (0..8)
            .map(|_| RtpPacketizer::new(PacketizerConfig::default()).unwrap().next_timestamp())
            .collect();
        assert!(a.windows(2).any(|w| w[0] != w[1]));
    }
}
