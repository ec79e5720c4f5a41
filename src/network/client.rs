//! Discovery client
//!
//! Broadcasts one request and gathers replies until the deadline. Replies are
//! returned in arrival order without deduplication; picking a peer is up to the
//! caller.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant;

use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::NetworkError;
use crate::network::udp::create_socket;
use crate::protocol::{DiscoveryReply, PeerAddress, DISCOVER_TOKEN};

/// Broadcast a discovery request on `port` and collect replies for `timeout`.
///
/// An empty list means nobody answered; that is not an error.
pub async fn discover(port: u16, timeout: Duration) -> Result<Vec<PeerAddress>, NetworkError> {
    discover_to((Ipv4Addr::BROADCAST, port).into(), timeout).await
}

/// Send a discovery request to an explicit address, e.g. a subnet broadcast
/// address or a known host.
pub async fn discover_to(
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<PeerAddress>, NetworkError> {
    let socket = create_socket((Ipv4Addr::UNSPECIFIED, 0).into(), true)?;

    socket
        .send_to(DISCOVER_TOKEN.as_bytes(), target)
        .await
        .map_err(NetworkError::SendFailed)?;
    let deadline = Instant::now() + timeout;

    tracing::debug!("Sent discovery request to {}", target);

    let mut peers = Vec::new();
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(received) => received,
            Err(_) => break,
        };

        match received {
            Ok((len, source)) => match DiscoveryReply::parse(&buf[..len]) {
                Some(reply) => {
                    tracing::debug!("Discovered {} via {}", reply.peer, source);
                    peers.push(reply.peer);
                }
                None => tracing::debug!("Ignoring malformed reply from {}", source),
            },
            Err(e) => tracing::debug!("Discovery receive error: {}", e),
        }
    }

    tracing::info!("Discovery finished with {} candidate(s)", peers.len());
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::responder::{DiscoveryResponder, Identity};
    use crate::network::udp::UdpSocket;
    use std::time::Duration;

    #[tokio::test]
    async fn test_no_responder_returns_empty_within_timeout() {
        // Nothing listens on this freshly released port
        let port = {
            let probe = create_socket((Ipv4Addr::LOCALHOST, 0).into(), false).unwrap();
            probe.local_addr().unwrap().port()
        };

        let started = std::time::Instant::now();
        let peers = discover_to((Ipv4Addr::LOCALHOST, port).into(), Duration::from_millis(200))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(peers.is_empty());
        assert!(elapsed >= Duration::from_millis(190));
        assert!(elapsed < Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_finds_responder() {
        let responder = DiscoveryResponder::start_with(
            (Ipv4Addr::LOCALHOST, 0).into(),
            Identity::Fixed(PeerAddress::new("host-a", "10.0.0.5")),
        )
        .await
        .unwrap();

        let peers = discover_to(responder.local_addr(), Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(peers, vec![PeerAddress::new("host-a", "10.0.0.5")]);
    }

    #[tokio::test]
    async fn test_keeps_duplicates_and_skips_malformed() {
        let fake = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let target = fake.local_addr().unwrap();

        let answer = tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            let (_, source) = fake.recv_from(&mut buf).await.unwrap();
            for payload in [
                &b"OSD_ACK:host-a:10.0.0.5"[..],
                b"OSD_ACK:broken",
                b"OSD_ACK:host-a:10.0.0.5",
                b"OSD_ACK:host-b:10.0.0.6",
            ] {
                fake.send_to(payload, source).await.unwrap();
            }
        });

        let peers = discover_to(target, Duration::from_millis(300)).await.unwrap();
        answer.await.unwrap();

        assert_eq!(
            peers,
            vec![
                PeerAddress::new("host-a", "10.0.0.5"),
                PeerAddress::new("host-a", "10.0.0.5"),
                PeerAddress::new("host-b", "10.0.0.6"),
            ]
        );
    }

    #[tokio::test]
    async fn test_deadline_is_not_reset_by_replies() {
        let fake = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let target = fake.local_addr().unwrap();

        // Keep replying every 50ms for well past the timeout
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            let (_, source) = fake.recv_from(&mut buf).await.unwrap();
            for _ in 0..40 {
                let _ = fake.send_to(b"OSD_ACK:host-a:10.0.0.5", source).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let started = std::time::Instant::now();
        let peers = discover_to(target, Duration::from_millis(300)).await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(800));
        assert!(!peers.is_empty());
    }
}
