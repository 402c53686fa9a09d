//! Property checks for the packetizer over the public API

use proptest::prelude::*;
use rvoice_codec_core::{EncodedFrame, MAX_ENCODED_FRAME_SIZE};
use rvoice_rtp_core::{PacketizerConfig, RtpPacketizer, RTP_MIN_HEADER_SIZE};

fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=MAX_ENCODED_FRAME_SIZE)
}

proptest! {
    #[test]
    fn sequence_and_timestamp_progress(seq in any::<u16>(), ts in any::<u32>(), count in 1usize..50) {
        let packetizer = RtpPacketizer::new(PacketizerConfig::default().with_initial(seq, ts)).unwrap();
        let frame = EncodedFrame::new(vec![1u8; 20]).unwrap();

        for n in 0..count {
            let packet = packetizer.pack(&frame).unwrap();
            prop_assert_eq!(packet.header.sequence_number, seq.wrapping_add(n as u16));
            prop_assert_eq!(packet.header.timestamp, ts.wrapping_add(960u32.wrapping_mul(n as u32)));
        }
    }

    #[test]
    fn unpack_inverts_pack(
        pt in 0u8..=127,
        ssrc in any::<u32>(),
        seq in any::<u16>(),
        ts in any::<u32>(),
        data in payload(),
    ) {
        let config = PacketizerConfig::default().with_initial(seq, ts).with_stream(pt, ssrc);
        let packetizer = RtpPacketizer::new(config).unwrap();
        let frame = EncodedFrame::new(data).unwrap();

        let wire = packetizer.pack_to_bytes(&frame).unwrap();
        let (header, recovered) = RtpPacketizer::unpack(&wire).unwrap();

        prop_assert_eq!(header.payload_type, pt);
        prop_assert_eq!(header.ssrc, ssrc);
        prop_assert_eq!(header.sequence_number, seq);
        prop_assert_eq!(header.timestamp, ts);
        prop_assert_eq!(recovered, frame);
    }

    #[test]
    fn short_packets_are_rejected_without_side_effects(data in prop::collection::vec(any::<u8>(), 0..RTP_MIN_HEADER_SIZE)) {
        let packetizer = RtpPacketizer::new(PacketizerConfig::default().with_initial(10, 10)).unwrap();
        prop_assert!(RtpPacketizer::unpack(&data).is_err());
        prop_assert_eq!(packetizer.next_sequence(), 10);
        prop_assert_eq!(packetizer.next_timestamp(), 10);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = RtpPacketizer::unpack(&data);
    }
}
