//! RTP header and packet wire format (RFC 3550)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::error::Error;
use crate::{Result, RtpCsrc, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version (always 2 in practice)
pub const RTP_VERSION: u8 = 2;

/// Minimum header size (without CSRC or extensions)
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// Largest payload type that fits the 7-bit field
pub const RTP_MAX_PAYLOAD_TYPE: u8 = 0x7F;

/// RTP header according to RFC 3550
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (should be 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// Marker bit
    pub marker: bool,

    /// Payload type
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,

    /// Contributing source identifiers
    pub csrc: Vec<RtpCsrc>,

    /// Extension profile and data, when the extension flag is set
    pub extension_data: Option<(u16, Bytes)>,
}

impl RtpHeader {
    /// Create a plain header: no padding, extension or CSRCs
    pub fn new(
        payload_type: u8,
        sequence_number: RtpSequenceNumber,
        timestamp: RtpTimestamp,
        ssrc: RtpSsrc,
    ) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension_data: None,
        }
    }

    /// Set the marker bit
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Get the size of the header in bytes
    pub fn size(&self) -> usize {
        let mut size = RTP_MIN_HEADER_SIZE + self.csrc.len() * 4;
        if let Some((_, data)) = &self.extension_data {
            size += 4 + (data.len() + 3) / 4 * 4;
        }
        size
    }

    /// Parse an RTP header from bytes
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::MalformedPacket {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        // version (2 bits), padding, extension, CSRC count (4 bits)
        let first_byte = buf.get_u8();
        let version = first_byte >> 6;
        if version != RTP_VERSION {
            return Err(Error::InvalidPacket(format!("Invalid RTP version: {}", version)));
        }
        let padding = first_byte & 0x20 != 0;
        let extension = first_byte & 0x10 != 0;
        let cc = (first_byte & 0x0F) as usize;

        // marker (1 bit), payload type (7 bits)
        let second_byte = buf.get_u8();
        let marker = second_byte & 0x80 != 0;
        let payload_type = second_byte & RTP_MAX_PAYLOAD_TYPE;

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        if buf.remaining() < cc * 4 {
            return Err(Error::MalformedPacket {
                required: cc * 4,
                available: buf.remaining(),
            });
        }
        let csrc = (0..cc).map(|_| buf.get_u32()).collect();

        let extension_data = if extension {
            if buf.remaining() < 4 {
                return Err(Error::MalformedPacket {
                    required: 4,
                    available: buf.remaining(),
                });
            }
            let profile = buf.get_u16();
            let ext_length = buf.get_u16() as usize * 4;
            if buf.remaining() < ext_length {
                return Err(Error::MalformedPacket {
                    required: ext_length,
                    available: buf.remaining(),
                });
            }
            Some((profile, buf.copy_to_bytes(ext_length)))
        } else {
            None
        };

        Ok(Self {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            extension_data,
        })
    }

    /// Serialize the header to bytes
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        if self.payload_type > RTP_MAX_PAYLOAD_TYPE {
            return Err(Error::InvalidParameter(format!(
                "payload type {} does not fit in 7 bits",
                self.payload_type
            )));
        }
        if self.csrc.len() > 15 {
            return Err(Error::InvalidParameter(format!(
                "{} CSRCs exceed the limit of 15",
                self.csrc.len()
            )));
        }
        if self.extension != self.extension_data.is_some() {
            return Err(Error::InvalidParameter(
                "Extension flag does not match extension data".to_string(),
            ));
        }
        let extension_words = match &self.extension_data {
            Some((_, data)) => {
                let words = (data.len() + 3) / 4;
                // the length field counts 32-bit words in 16 bits
                u16::try_from(words).map_err(|_| {
                    Error::InvalidParameter(format!(
                        "{} byte header extension exceeds the 16-bit word count",
                        data.len()
                    ))
                })?
            }
            None => 0,
        };
        buf.reserve(self.size());

        let mut first_byte = (self.version & 0x03) << 6;
        if self.padding {
            first_byte |= 0x20;
        }
        if self.extension {
            first_byte |= 0x10;
        }
        first_byte |= self.csrc.len() as u8;
        buf.put_u8(first_byte);

        let mut second_byte = self.payload_type;
        if self.marker {
            second_byte |= 0x80;
        }
        buf.put_u8(second_byte);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if let Some((profile, data)) = &self.extension_data {
            buf.put_u16(*profile);
            buf.put_u16(extension_words);
            buf.put_slice(data);
            buf.put_bytes(0, usize::from(extension_words) * 4 - data.len());
        }

        Ok(())
    }
}

/// RTP packet: header plus payload
#[derive(Clone, PartialEq, Eq)]
pub struct RtpPacket {
    /// RTP header
    pub header: RtpHeader,

    /// Payload data
    pub payload: Bytes,
}

impl RtpPacket {
    /// Create a new RTP packet
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get the total size of the packet in bytes
    pub fn size(&self) -> usize {
        self.header.size() + self.payload.len()
    }

    /// Parse an RTP packet from bytes; trailing padding is stripped
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let header = RtpHeader::parse(&mut buf)?;

        let padding_bytes = if header.padding {
            let padding = buf.last().copied().unwrap_or(0) as usize;
            if padding == 0 || padding > buf.len() {
                return Err(Error::InvalidPacket(format!(
                    "Invalid padding value: {} with {} bytes remaining",
                    padding,
                    buf.len()
                )));
            }
            padding
        } else {
            0
        };

        let payload_len = buf.len() - padding_bytes;
        let payload = buf.slice(0..payload_len);

        Ok(Self { header, payload })
    }

    /// Serialize the packet to bytes.
    ///
    /// Padding is never generated; the flag must be clear.
    pub fn serialize(&self) -> Result<Bytes> {
        if self.header.padding {
            return Err(Error::InvalidParameter(
                "Padding generation is not supported".to_string(),
            ));
        }
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.serialize(&mut buf)?;
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }
}

impl fmt::Debug for RtpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtpPacket")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_wire_layout() {
        let header = RtpHeader::new(111, 0x1234, 0xDEADBEEF, 2).with_marker(true);
        let packet = RtpPacket::new(header, Bytes::from_static(&[0xAA, 0xBB]));
        let bytes = packet.serialize().unwrap();

        assert_eq!(
            &bytes[..],
            &[
                0x80, 0x80 | 111, 0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 2, 0xAA, 0xBB
            ]
        );
    }

    #[test]
    fn test_parse_rejects_short_buffer() {
        let err = RtpPacket::parse(&[0x80, 0x6F, 0, 1]).unwrap_err();
        assert_eq!(
            err,
            Error::MalformedPacket {
                required: 12,
                available: 4
            }
        );
    }

    #[test]
    fn test_parse_rejects_wrong_version() {
        let mut data = vec![0u8; 20];
        data[0] = 0x40;
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(Error::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_parse_csrc_extension_padding() {
        let mut header = RtpHeader::new(96, 7, 960, 0xCAFE);
        header.csrc = vec![1, 2];
        header.extension = true;
        header.extension_data = Some((0xBEDE, Bytes::from_static(&[1, 2, 3])));
        let packet = RtpPacket::new(header.clone(), Bytes::from_static(b"voice"));
        let mut wire = BytesMut::from(&packet.serialize().unwrap()[..]);

        // append two bytes of padding by hand
        wire[0] |= 0x20;
        wire.put_slice(&[0, 2]);

        let parsed = RtpPacket::parse(&wire).unwrap();
        assert_eq!(parsed.header.csrc, vec![1, 2]);
        assert_eq!(parsed.header.extension_data.unwrap().1.len(), 4);
        assert!(parsed.header.padding);
        assert_eq!(&parsed.payload[..], b"voice");
    }

    #[test]
    fn test_truncated_csrc_list() {
        let mut data = vec![0u8; 14];
        data[0] = 0x80 | 3;
        assert!(matches!(
            RtpPacket::parse(&data),
            Err(Error::MalformedPacket { required: 12, available: 2 })
        ));
    }

    #[test]
    fn test_serialize_rejects_oversized_extension() {
        let mut header = RtpHeader::new(111, 0, 0, 2);
        header.extension = true;
        header.extension_data = Some((0xBEDE, Bytes::from(vec![0u8; (u16::MAX as usize + 1) * 4])));
        let packet = RtpPacket::new(header.clone(), Bytes::from_static(b"x"));
        assert!(matches!(
            packet.serialize(),
            Err(Error::InvalidParameter(_))
        ));

        // the largest representable extension still fits
        header.extension_data = Some((0xBEDE, Bytes::from(vec![7u8; u16::MAX as usize * 4])));
        let wire = RtpPacket::new(header, Bytes::from_static(b"x")).serialize().unwrap();
        assert_eq!(u16::from_be_bytes([wire[14], wire[15]]), u16::MAX);
        assert_eq!(wire.len(), 12 + 4 + u16::MAX as usize * 4 + 1);
    }

    #[test]
    fn test_serialize_rejects_wide_payload_type() {
        let packet = RtpPacket::new(RtpHeader::new(200, 0, 0, 0), Bytes::new());
        assert!(matches!(
            packet.serialize(),
            Err(Error::InvalidParameter(_))
        ));
    }
}
