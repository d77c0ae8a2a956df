//! Quiet-period connection teardown.
//!
//! The last ACK of a conversation enjoys no acknowledgment of its own: the
//! peer that sent it cannot know it arrived.  Before releasing the socket,
//! each side therefore lingers for [`TWAIT`] and keeps re-acknowledging any
//! DATA packet a still-retransmitting peer pushes at it.  Nothing received
//! during this window is ever delivered to the application.  The socket is
//! released only after one full quiet interval with no channel activity.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use crate::packet::{self, kind, Packet, HEADER_LEN, PAYLOAD_MAX};
use crate::simulator::UnreliableChannel;

/// Quiet interval: an order of magnitude larger than the retransmission
/// timeout, so a peer gets several timeout cycles to land its stragglers.
pub const TWAIT: Duration = Duration::from_millis(500);

/// Absorb straggler retransmissions until the channel stays quiet for one
/// full [`TWAIT`] interval.
///
/// Valid DATA packets are re-acknowledged with their own sequence number
/// (when a peer address is known); everything else — corrupted input, stray
/// ACKs, datagrams from third parties — is ignored.  Any activity restarts
/// the quiet interval.
pub(crate) async fn drain(
    channel: &UnreliableChannel,
    peer: Option<SocketAddr>,
) -> io::Result<()> {
    let mut buf = vec![0u8; HEADER_LEN + PAYLOAD_MAX];
    loop {
        let (n, addr) = match timeout(TWAIT, channel.recv_from(&mut buf)).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                log::debug!("[close] channel quiet for {TWAIT:?} — releasing socket");
                return Ok(());
            }
        };

        let raw = &buf[..n];
        match Packet::decode(raw) {
            Ok(pkt) if packet::is_valid(raw) && pkt.header.kind == kind::DATA => {
                match peer {
                    Some(peer_addr) if addr == peer_addr => {
                        log::debug!("[close] straggler DATA seq={} — re-ACK", pkt.header.seq);
                        let ack = Packet::ack(pkt.header.seq).encode();
                        channel.transmit(&ack, peer_addr).await?;
                    }
                    _ => log::debug!("[close] DATA from unknown peer {addr} — ignored"),
                }
            }
            _ => log::debug!("[close] ignoring {n} stray byte(s)"),
        }
    }
}
