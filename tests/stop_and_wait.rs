//! Integration tests for the stop-and-wait engine.
//!
//! End-to-end tests spin up two in-process endpoints talking over loopback
//! as separate tokio tasks.  Deterministic fault scenarios use a scripted
//! raw `UdpSocket` peer instead of probability draws, so every duplicate or
//! corruption is forced rather than sampled.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use rdt_over_udp::connection::{ConnError, StopWaitConnection};
use rdt_over_udp::packet::{self, kind, Packet, PAYLOAD_MAX};
use rdt_over_udp::simulator::ChannelConfig;
use rdt_over_udp::teardown::TWAIT;

/// Generous upper bound for any single scripted-peer wait.
const WAIT: Duration = Duration::from_secs(2);

async fn connection(config: ChannelConfig) -> StopWaitConnection {
    StopWaitConnection::bind("127.0.0.1:0".parse().unwrap(), config)
        .await
        .expect("bind failed")
}

/// Two connected endpoints with the same channel fault model.
async fn pair(config: ChannelConfig) -> (StopWaitConnection, StopWaitConnection) {
    let mut a = connection(config.clone()).await;
    let mut b = connection(config).await;
    let (addr_a, addr_b) = (a.local_addr(), b.local_addr());
    a.set_peer(addr_b);
    b.set_peer(addr_a);
    (a, b)
}

async fn raw_peer() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind failed")
}

/// Receive one packet at the scripted peer, checking validity.
async fn recv_packet(sock: &UdpSocket) -> Packet {
    let mut buf = [0u8; 1100];
    let (n, _) = timeout(WAIT, sock.recv_from(&mut buf))
        .await
        .expect("scripted peer timed out")
        .expect("recv failed");
    let raw = &buf[..n];
    assert!(packet::is_valid(raw), "scripted peer received invalid bytes");
    Packet::decode(raw).unwrap()
}

async fn send_raw(sock: &UdpSocket, dest: SocketAddr, wire: &[u8]) {
    sock.send_to(wire, dest).await.expect("raw send failed");
}

// ---------------------------------------------------------------------------
// Test 1: ping-pong over a clean channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_ping_pong_no_faults() {
    let (mut a, mut b) = pair(ChannelConfig::default()).await;

    let side_b = tokio::spawn(async move {
        let msg = b.recv(PAYLOAD_MAX).await.expect("recv");
        assert_eq!(msg, b"Ping!");
        b.send(b"Pong!").await.expect("send");
    });

    let side_a = tokio::spawn(async move {
        let sent = a.send(b"Ping!").await.expect("send");
        assert_eq!(sent, 5);
        let reply = a.recv(PAYLOAD_MAX).await.expect("recv");
        assert_eq!(reply, b"Pong!");
    });

    let (rb, ra) = tokio::join!(side_b, side_a);
    rb.unwrap();
    ra.unwrap();
}

// ---------------------------------------------------------------------------
// Test 2: in-order exactly-once delivery through a lossy channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_lossy_channel_delivers_in_order() {
    const MSG_COUNT: usize = 10;
    let (mut a, mut b) = pair(ChannelConfig::new(0.2, 0.1)).await;

    let side_b = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..MSG_COUNT {
            received.push(b.recv(PAYLOAD_MAX).await.expect("recv"));
        }
        received
    });

    let side_a = tokio::spawn(async move {
        for i in 0..MSG_COUNT {
            let msg = format!("msg-{i:02}");
            a.send(msg.as_bytes()).await.expect("send");
        }
    });

    let (rb, ra) = tokio::join!(side_b, side_a);
    ra.unwrap();
    let received = rb.unwrap();

    assert_eq!(received.len(), MSG_COUNT);
    for (i, msg) in received.iter().enumerate() {
        let expected = format!("msg-{i:02}");
        assert_eq!(msg, expected.as_bytes(), "message {i} out of order");
    }
}

// ---------------------------------------------------------------------------
// Test 3: oversized messages are truncated to one payload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_long_message_truncated_to_payload_max() {
    let (mut a, mut b) = pair(ChannelConfig::default()).await;

    let side_b = tokio::spawn(async move { b.recv(2 * PAYLOAD_MAX).await.expect("recv") });

    let sent = a.send(&[0xAB; 1500]).await.expect("send");
    assert_eq!(sent, PAYLOAD_MAX);

    let received = side_b.await.unwrap();
    assert_eq!(received.len(), PAYLOAD_MAX);
    assert!(received.iter().all(|&b| b == 0xAB));
}

// ---------------------------------------------------------------------------
// Test 4: usage error — peer address never set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_send_without_peer_fails_immediately() {
    let mut conn = connection(ChannelConfig::default()).await;
    assert!(matches!(conn.send(b"nope").await, Err(ConnError::PeerUnset)));
}

// ---------------------------------------------------------------------------
// Test 5: duplicate DATA is re-ACKed, never delivered twice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_data_reacked_not_redelivered() {
    let mut conn = connection(ChannelConfig::default()).await;
    let raw = raw_peer().await;
    conn.set_peer(raw.local_addr().unwrap());
    let conn_addr = conn.local_addr();

    let receiver = tokio::spawn(async move {
        let first = conn.recv(PAYLOAD_MAX).await.expect("recv");
        let second = conn.recv(PAYLOAD_MAX).await.expect("recv");
        (first, second)
    });

    let data0 = Packet::data(0, b"alpha".to_vec()).encode();
    send_raw(&raw, conn_addr, &data0).await;
    let ack = recv_packet(&raw).await;
    assert_eq!(ack.header.kind, kind::ACK);
    assert_eq!(ack.header.seq, 0);

    // Pretend the ACK was lost: retransmit the same packet.  The receiver
    // must re-ACK seq 0 without delivering the payload again.
    send_raw(&raw, conn_addr, &data0).await;
    let dup_ack = recv_packet(&raw).await;
    assert_eq!(dup_ack.header.kind, kind::ACK);
    assert_eq!(dup_ack.header.seq, 0);

    let data1 = Packet::data(1, b"beta".to_vec()).encode();
    send_raw(&raw, conn_addr, &data1).await;
    let ack1 = recv_packet(&raw).await;
    assert_eq!(ack1.header.seq, 1);

    let (first, second) = receiver.await.unwrap();
    assert_eq!(first, b"alpha");
    assert_eq!(second, b"beta", "duplicate must not surface as a delivery");
}

// ---------------------------------------------------------------------------
// Test 6: corruption triggers a re-ACK of the previous sequence number
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_corruption_triggers_previous_ack() {
    let mut conn = connection(ChannelConfig::default()).await;
    let raw = raw_peer().await;
    conn.set_peer(raw.local_addr().unwrap());
    let conn_addr = conn.local_addr();

    let receiver = tokio::spawn(async move { conn.recv(PAYLOAD_MAX).await.expect("recv") });

    // Corrupt one payload byte the way the channel would.
    let mut mangled = Packet::data(0, b"damaged in transit".to_vec()).encode();
    mangled[8] = mangled[8].wrapping_sub(2);
    send_raw(&raw, conn_addr, &mangled).await;

    // recv_num is still 0, so the receiver re-acks the previous bit: 1.
    let prev_ack = recv_packet(&raw).await;
    assert_eq!(prev_ack.header.kind, kind::ACK);
    assert_eq!(prev_ack.header.seq, 1);

    // The intact retransmission goes through normally.
    send_raw(&raw, conn_addr, &Packet::data(0, b"damaged in transit".to_vec()).encode()).await;
    let ack = recv_packet(&raw).await;
    assert_eq!(ack.header.seq, 0);
    assert_eq!(receiver.await.unwrap(), b"damaged in transit");
}

// ---------------------------------------------------------------------------
// Test 7: full-duplex collision — both sides send first, then receive
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_duplex_cross_traffic() {
    let (mut a, mut b) = pair(ChannelConfig::default()).await;

    let side_a = tokio::spawn(async move {
        a.send(b"from a").await.expect("send");
        a.recv(PAYLOAD_MAX).await.expect("recv")
    });
    let side_b = tokio::spawn(async move {
        b.send(b"from b").await.expect("send");
        b.recv(PAYLOAD_MAX).await.expect("recv")
    });

    let (ra, rb) = tokio::join!(side_a, side_b);
    assert_eq!(ra.unwrap(), b"from b");
    assert_eq!(rb.unwrap(), b"from a");
}

// ---------------------------------------------------------------------------
// Test 8: teardown re-ACKs stragglers, then releases after one quiet period
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_close_acks_straggler_then_releases() {
    let mut conn = connection(ChannelConfig::default()).await;
    let raw = raw_peer().await;
    conn.set_peer(raw.local_addr().unwrap());
    let conn_addr = conn.local_addr();

    let started = tokio::time::Instant::now();
    let closer = tokio::spawn(async move { conn.close().await });

    // A peer whose final ACK was lost retransmits its last packet during
    // the quiet period; teardown must absorb and re-ACK it.
    send_raw(&raw, conn_addr, &Packet::data(7, b"straggler".to_vec()).encode()).await;
    let ack = recv_packet(&raw).await;
    assert_eq!(ack.header.kind, kind::ACK);
    assert_eq!(ack.header.seq, 7);

    closer.await.unwrap().expect("close");
    // The straggler restarted the quiet interval at least once.
    assert!(started.elapsed() >= TWAIT);
}
