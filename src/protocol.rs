//! Discovery wire format
//!
//! Request: the bare ASCII token `OSD_DISCOVER`.
//! Reply: `OSD_ACK:<hostname>:<ip>`, fields separated by `:`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of a discovery request datagram
pub const DISCOVER_TOKEN: &str = "OSD_DISCOVER";

/// Leading tag of a discovery reply
pub const ACK_PREFIX: &str = "OSD_ACK";

/// Field separator in replies
pub const DELIMITER: char = ':';

/// A playback host found on the LAN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub hostname: String,
    pub ip: String,
}

impl PeerAddress {
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: ip.into(),
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hostname, self.ip)
    }
}

/// Check whether a raw datagram is a discovery request.
///
/// Anything that is not valid UTF-8 or not exactly the token is ignored.
pub fn is_discovery_request(payload: &[u8]) -> bool {
    matches!(std::str::from_utf8(payload), Ok(text) if text == DISCOVER_TOKEN)
}

/// Reply sent by a responder for each request it sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReply {
    pub peer: PeerAddress,
}

impl DiscoveryReply {
    pub fn new(peer: PeerAddress) -> Self {
        Self { peer }
    }

    /// Encode to the wire representation.
    ///
    /// Any `:` inside the hostname would shift the ip field, so it is replaced
    /// with `-` before sending.
    pub fn encode(&self) -> String {
        let hostname = self.peer.hostname.replace(DELIMITER, "-");
        format!("{ACK_PREFIX}{DELIMITER}{hostname}{DELIMITER}{}", self.peer.ip)
    }

    /// Parse a reply datagram. Returns `None` for anything malformed.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(payload).ok()?;
        let mut fields = text.split(DELIMITER);

        if fields.next()? != ACK_PREFIX {
            return None;
        }

        let hostname = fields.next()?;
        let ip = fields.next()?;
        if hostname.is_empty() || ip.is_empty() {
            return None;
        }

        Some(Self::new(PeerAddress::new(hostname, ip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_request_token() {
        assert!(is_discovery_request(b"OSD_DISCOVER"));
        assert!(!is_discovery_request(b"OSD_DISCOVER\n"));
        assert!(!is_discovery_request(b"osd_discover"));
        assert!(!is_discovery_request(b""));
        assert!(!is_discovery_request(&[0xff, 0xfe, 0x00]));
    }

    #[test]
    fn test_reply_encoding() {
        let reply = DiscoveryReply::new(PeerAddress::new("host-a", "10.0.0.5"));
        assert_eq!(reply.encode(), "OSD_ACK:host-a:10.0.0.5");
    }

    #[test]
    fn test_reply_parsing() {
        let reply = DiscoveryReply::parse(b"OSD_ACK:host-a:10.0.0.5").unwrap();
        assert_eq!(reply.peer, PeerAddress::new("host-a", "10.0.0.5"));

        // Extra fields are tolerated, only the first two count
        let reply = DiscoveryReply::parse(b"OSD_ACK:host-b:10.0.0.6:extra").unwrap();
        assert_eq!(reply.peer.ip, "10.0.0.6");
    }

    #[test]
    fn test_malformed_replies() {
        assert!(DiscoveryReply::parse(b"OSD_ACK:host-a").is_none());
        assert!(DiscoveryReply::parse(b"OSD_ACK::10.0.0.5").is_none());
        assert!(DiscoveryReply::parse(b"OSD_ACK:host-a:").is_none());
        assert!(DiscoveryReply::parse(b"NOPE:host-a:10.0.0.5").is_none());
        assert!(DiscoveryReply::parse(b"OSD_ACKX:host-a:10.0.0.5").is_none());
        assert!(DiscoveryReply::parse(&[0xc3, 0x28]).is_none());
    }

    #[test]
    fn test_hostname_with_delimiter_is_sanitized() {
        let reply = DiscoveryReply::new(PeerAddress::new("weird:host", "10.0.0.7"));
        let parsed = DiscoveryReply::parse(reply.encode().as_bytes()).unwrap();
        assert_eq!(parsed.peer, PeerAddress::new("weird-host", "10.0.0.7"));
    }

    proptest! {
        #[test]
        fn prop_reply_fields_survive_the_wire(
            hostname in "[A-Za-z0-9][A-Za-z0-9.-]{0,30}",
            a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255,
        ) {
            let ip = format!("{a}.{b}.{c}.{d}");
            let peer = PeerAddress::new(hostname.clone(), ip.clone());
            let encoded = DiscoveryReply::new(peer).encode();
            let parsed = DiscoveryReply::parse(encoded.as_bytes()).unwrap();
            prop_assert_eq!(parsed.peer.hostname, hostname);
            prop_assert_eq!(parsed.peer.ip, ip);
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let _ = DiscoveryReply::parse(&payload);
            let _ = is_discovery_request(&payload);
        }
    }
}
