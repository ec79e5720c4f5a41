//! Discovery responder
//!
//! Runs on the playback host. Answers every `OSD_DISCOVER` datagram with a single
//! unicast `OSD_ACK:<hostname>:<ip>` sent back to the requester. Anything else is
//! dropped without a reply.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;
use crate::network::udp::{create_socket, local_hostname, local_lan_ip, UdpSocket};
use crate::protocol::{is_discovery_request, DiscoveryReply, PeerAddress};

/// What the responder reports about itself
#[derive(Debug, Clone, Default)]
pub enum Identity {
    /// Look up hostname and LAN address for every request
    #[default]
    Local,
    /// Always report this address
    Fixed(PeerAddress),
}

impl Identity {
    fn resolve(&self) -> PeerAddress {
        match self {
            Identity::Local => PeerAddress::new(local_hostname(), local_lan_ip().to_string()),
            Identity::Fixed(peer) => peer.clone(),
        }
    }
}

/// Responder counters
#[derive(Debug, Default)]
pub struct ResponderStats {
    pub requests: AtomicU64,
    pub replies_sent: AtomicU64,
    pub ignored: AtomicU64,
}

/// Snapshot of [`ResponderStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponderStatsSnapshot {
    pub requests: u64,
    pub replies_sent: u64,
    pub ignored: u64,
}

impl ResponderStats {
    pub fn snapshot(&self) -> ResponderStatsSnapshot {
        ResponderStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

/// Background discovery responder
pub struct DiscoveryResponder {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    stats: Arc<ResponderStats>,
}

impl DiscoveryResponder {
    /// Listen on `port` on all interfaces.
    ///
    /// Fails immediately if the port cannot be bound; there is no retry.
    pub async fn start(port: u16) -> Result<Self, NetworkError> {
        Self::start_with((Ipv4Addr::UNSPECIFIED, port).into(), Identity::Local).await
    }

    /// Listen on an explicit address with an explicit identity
    pub async fn start_with(addr: SocketAddr, identity: Identity) -> Result<Self, NetworkError> {
        let socket = create_socket(addr, false)?;
        let local_addr = socket.local_addr().map_err(NetworkError::SocketOption)?;

        let cancel = CancellationToken::new();
        let stats = Arc::new(ResponderStats::default());

        let handle = tokio::spawn(respond_loop(
            socket,
            identity,
            cancel.clone(),
            stats.clone(),
        ));

        tracing::info!("Discovery responder listening on {}", local_addr);

        Ok(Self {
            local_addr,
            cancel,
            handle: Some(handle),
            stats,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> ResponderStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the receive loop to exit
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the receive loop to finish
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DiscoveryResponder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn respond_loop(
    socket: UdpSocket,
    identity: Identity,
    cancel: CancellationToken,
    stats: Arc<ResponderStats>,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, source) = tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    // Usually an ICMP error from an earlier reply; the socket is still fine
                    tracing::debug!("Discovery receive error: {}", e);
                    continue;
                }
            },
        };

        if !is_discovery_request(&buf[..len]) {
            stats.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Ignoring {} byte datagram from {}", len, source);
            continue;
        }

        stats.requests.fetch_add(1, Ordering::Relaxed);
        let reply = DiscoveryReply::new(identity.resolve()).encode();

        match socket.send_to(reply.as_bytes(), source).await {
            Ok(_) => {
                stats.replies_sent.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Answered discovery request from {}", source);
            }
            Err(e) => {
                tracing::warn!("Failed to reply to {}: {}", source, e);
            }
        }
    }

    tracing::info!("Discovery responder stopped");
}
