//! RTP packet encoding/decoding for rvoice
//!
//! [`packet`] is the RFC 3550 wire codec; [`packetizer`] adds the
//! per-session sequence/timestamp bookkeeping used on the send path and the
//! strict validation used on the receive path.

#![warn(missing_docs)]

pub mod error;
pub mod packet;
pub mod packetizer;

pub use error::Error;
pub use packet::{RtpHeader, RtpPacket, RTP_MIN_HEADER_SIZE, RTP_VERSION};
pub use packetizer::{
    PacketizerConfig, PacketizerStats, RtpPacketizer, DEFAULT_PAYLOAD_TYPE, DEFAULT_SSRC,
};

/// Result type for RTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// RTP sequence number
pub type RtpSequenceNumber = u16;

/// RTP timestamp
pub type RtpTimestamp = u32;

/// RTP synchronization source
pub type RtpSsrc = u32;

/// RTP contributing source
pub type RtpCsrc = u32;
