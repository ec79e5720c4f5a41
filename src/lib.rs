//! # LAN Screen Mirror
//!
//! Low-latency screen mirroring between a capture host and a playback host on the
//! same LAN. The media work is done by external `ffmpeg`/`ffplay` processes; this
//! crate finds the peer and keeps those processes alive.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────┐            ┌──────────────────────────────────┐
//! │           CAPTURE HOST           │            │          PLAYBACK HOST           │
//! │                                  │            │                                  │
//! │  ┌────────────────────────────┐  │  UDP bcast │  ┌────────────────────────────┐  │
//! │  │ Discovery Client           │──┼────────────┼─▶│ Discovery Responder        │  │
//! │  │ (network::client)          │◀─┼────────────┼──│ (network::responder)       │  │
//! │  └─────────────┬──────────────┘  │  UDP ucast │  └────────────────────────────┘  │
//! │                │ PeerAddress     │  OSD_ACK   │                                  │
//! │                ▼                 │            │                                  │
//! │  ┌────────────────────────────┐  │            │  ┌────────────────────────────┐  │
//! │  │ Stream Supervisor          │  │            │  │ Stream Supervisor          │  │
//! │  │ (session::supervisor)      │  │            │  │ (session::supervisor)      │  │
//! │  │  CommandBuilder ─▶ ffmpeg  │──┼────────────┼─▶│  CommandBuilder ─▶ ffplay  │  │
//! │  └────────────────────────────┘  │ TCP mpegts │  └────────────────────────────┘  │
//! └──────────────────────────────────┘            └──────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default UDP port for discovery requests
    pub const DEFAULT_DISCOVERY_PORT: u16 = 5001;

    /// Default TCP port for the media stream
    pub const DEFAULT_STREAM_PORT: u16 = 12345;

    /// How long the discovery client waits for replies
    pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(1);

    /// Delay before a session is relaunched after it ends
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);

    /// Delay before relaunching after an internal supervisor error
    pub const DEFAULT_ERROR_COOLDOWN: Duration = Duration::from_secs(5);

    /// Time a media process gets to exit after a terminate request
    pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

    /// Characters of diagnostic output kept from a failed process
    pub const DIAGNOSTIC_TAIL_CHARS: usize = 500;

    /// Receive buffer for discovery datagrams
    pub const MAX_DATAGRAM_SIZE: usize = 1024;

    /// Address reported when the LAN address cannot be resolved
    pub const FALLBACK_IP: &str = "127.0.0.1";

    /// Remote endpoint used to pick the outbound interface (nothing is sent)
    pub const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";
}
