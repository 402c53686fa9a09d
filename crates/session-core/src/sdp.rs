//! Minimal SDP and candidate inspection
//!
//! Only what the session layer needs to sanity-check what it relays; the
//! transport does the real parsing.

use crate::types::IceCandidate;

/// `mid` of the first media section, if any
pub fn first_media_mid(sdp: &str) -> Option<&str> {
    let mut in_media = false;
    for line in sdp.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("m=") {
            in_media = true;
        } else if in_media {
            if let Some(mid) = line.strip_prefix("a=mid:") {
                return Some(mid.trim());
            }
        }
    }
    None
}

/// Whether the body looks like SDP at all
pub fn looks_like_sdp(sdp: &str) -> bool {
    sdp.trim_start().starts_with("v=0")
}

/// Parsed fields of a candidate attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateInfo {
    /// Foundation
    pub foundation: String,
    /// Component id (1 = RTP)
    pub component: u32,
    /// Transport protocol
    pub protocol: String,
    /// Priority
    pub priority: u32,
    /// Connection address
    pub address: String,
    /// Port
    pub port: u16,
    /// Candidate type (host, srflx, relay, prflx)
    pub kind: String,
}

/// Parse a candidate attribute (`candidate:…` or `a=candidate:…`).
///
/// Returns `None` for anything that is not a well-formed candidate line.
pub fn parse_candidate(candidate: &IceCandidate) -> Option<CandidateInfo> {
    let body = candidate.candidate.trim();
    let body = body.strip_prefix("a=").unwrap_or(body);
    let body = body.strip_prefix("candidate:")?;

    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() < 8 || fields[6] != "typ" {
        return None;
    }
    Some(CandidateInfo {
        foundation: fields[0].to_string(),
        component: fields[1].parse().ok()?,
        protocol: fields[2].to_ascii_lowercase(),
        priority: fields[3].parse().ok()?,
        address: fields[4].to_string(),
        port: fields[5].parse().ok()?,
        kind: fields[7].to_string(),
    })
}
