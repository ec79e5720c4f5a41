//! Responder and client talking over loopback

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use lan_screen_mirror::network::{discover_to, DiscoveryResponder, Identity};
use lan_screen_mirror::protocol::PeerAddress;

#[tokio::test]
async fn client_finds_single_responder() {
    let responder = DiscoveryResponder::start_with(
        (Ipv4Addr::LOCALHOST, 0).into(),
        Identity::Fixed(PeerAddress::new("host-a", "10.0.0.5")),
    )
    .await
    .unwrap();

    let started = Instant::now();
    let peers = discover_to(responder.local_addr(), Duration::from_secs(1))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(peers, vec![PeerAddress::new("host-a", "10.0.0.5")]);
    // Collection runs for the whole window, but not much longer
    assert!(elapsed >= Duration::from_millis(950));
    assert!(elapsed < Duration::from_millis(1500));

    assert_eq!(responder.stats().replies_sent, 1);
    responder.shutdown().await;
}

#[tokio::test]
async fn responder_serves_repeated_scans() {
    let responder = DiscoveryResponder::start_with(
        (Ipv4Addr::LOCALHOST, 0).into(),
        Identity::Fixed(PeerAddress::new("host-a", "10.0.0.5")),
    )
    .await
    .unwrap();

    for _ in 0..3 {
        let peers = discover_to(responder.local_addr(), Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(peers.len(), 1);
    }

    assert_eq!(responder.stats().requests, 3);
}

#[tokio::test]
async fn stopped_responder_yields_empty_scan() {
    let responder = DiscoveryResponder::start_with(
        (Ipv4Addr::LOCALHOST, 0).into(),
        Identity::Fixed(PeerAddress::new("host-a", "10.0.0.5")),
    )
    .await
    .unwrap();
    let addr = responder.local_addr();
    responder.shutdown().await;

    let peers = discover_to(addr, Duration::from_millis(200)).await.unwrap();
    assert!(peers.is_empty());
}
