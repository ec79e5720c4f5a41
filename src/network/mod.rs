//! Network subsystem for LAN discovery

pub mod client;
pub mod responder;
pub mod udp;

pub use client::{discover, discover_to};
pub use responder::{DiscoveryResponder, Identity};
pub use udp::{create_socket, local_hostname, local_lan_ip, UdpSocket};
