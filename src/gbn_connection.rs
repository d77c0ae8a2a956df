//! Go-Back-N sliding-window ARQ connection.
//!
//! [`GbnConnection`] generalises the stop-and-wait engine in
//! [`crate::connection`]: instead of one packet in flight, up to `W` packets
//! are pipelined per burst, acknowledged cumulatively, and retransmitted
//! from the oldest unacknowledged one on timeout.  A window of 1 reduces to
//! stop-and-wait behaviour.
//!
//! # Protocol contract
//!
//! - Sequence numbers are `u8` and wrap modulo 256; every comparison is a
//!   modular-distance computation, never plain `<`/`>`.
//! - ACKs are **cumulative**: ACK(S) confirms every packet of the current
//!   burst up to and including S.
//! - On timeout the sender retransmits the unacknowledged **suffix** of the
//!   current burst (go back N), not the whole burst.
//! - The receiver accepts only the exact expected sequence number; anything
//!   else is re-ACKed as `expect_num - 1` and discarded.
//!
//! # Sequence-number layout (one burst of N ≤ W packets)
//!
//! ```text
//!  base_num                 next_num
//!      │                        │
//!  ────┼────────────────────────┼──────▶ seq space (mod 256)
//!      │ <─── this burst ─────▶ │
//!      │ <─ covered ─▶ <─ unacked suffix ─▶
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use crate::connection::{ConnError, EARLY_ARRIVALS_MAX};
use crate::packet::{self, kind, Packet, HEADER_LEN, PAYLOAD_MAX};
use crate::simulator::{ChannelConfig, UnreliableChannel};
use crate::teardown;

// ---------------------------------------------------------------------------
// Constants (mirror connection.rs)
// ---------------------------------------------------------------------------

/// Retransmission timeout per wait cycle.
const TIMEOUT: Duration = Duration::from_millis(50);

/// Largest usable window: the 8-bit sequence space holds at most 255
/// in-flight packets before new and retransmitted packets become
/// indistinguishable.
pub const MAX_WINDOW: usize = 255;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Returns `true` when `seq` falls within the modular interval that starts
/// at `base` and spans `count` consecutive sequence numbers.
///
/// A single distance computation covers both the wrapping and non-wrapping
/// cases: the interval `[250, 3]` (count 10) contains 255 and 2 but not 4.
#[inline]
fn in_window(base: u8, count: usize, seq: u8) -> bool {
    usize::from(seq.wrapping_sub(base)) < count
}

// ---------------------------------------------------------------------------
// GbnConnection
// ---------------------------------------------------------------------------

/// A reliable Go-Back-N connection over the unreliable channel.
#[derive(Debug)]
pub struct GbnConnection {
    /// Fault-injecting UDP channel; sole transport for DATA and ACKs alike.
    channel: UnreliableChannel,
    /// Remote peer; must be set before the first `send`/`recv`.
    peer: Option<SocketAddr>,
    /// Window size W: max packets in flight per burst.
    window: usize,
    /// Sequence number of the oldest packet of the burst in progress.
    base_num: u8,
    /// Sequence number to assign to the next new DATA packet.
    next_num: u8,
    /// Sequence number the receive side expects to deliver next.
    expect_num: u8,
    /// DATA packets that arrived while `send` was waiting for ACKs.
    early_arrivals: VecDeque<Packet>,
    /// Timeout-triggered retransmission bursts so far (observability).
    retransmits: u64,
}

impl GbnConnection {
    /// Bind a new connection to `local_addr` with the given channel faults
    /// and window size.
    ///
    /// # Panics
    ///
    /// Panics if `window` is outside `1..=`[`MAX_WINDOW`].
    pub async fn bind(
        local_addr: SocketAddr,
        config: ChannelConfig,
        window: usize,
    ) -> Result<Self, ConnError> {
        assert!(
            (1..=MAX_WINDOW).contains(&window),
            "window must be in 1..={MAX_WINDOW}"
        );
        let channel = UnreliableChannel::bind(local_addr, config).await?;
        Ok(Self {
            channel,
            peer: None,
            window,
            base_num: 0,
            next_num: 0,
            expect_num: 0,
            early_arrivals: VecDeque::new(),
            retransmits: 0,
        })
    }

    /// Address this connection's socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    /// Set the remote peer address.  Pure local state, no network activity.
    pub fn set_peer(&mut self, addr: SocketAddr) {
        self.peer = Some(addr);
    }

    /// Number of timeout-triggered retransmission rounds performed so far.
    pub fn retransmits(&self) -> u64 {
        self.retransmits
    }

    /// Transmit one message reliably to the peer.
    ///
    /// The message is fragmented into packets of at most [`PAYLOAD_MAX`]
    /// bytes and pipelined in bursts of at most `W` packets; each burst must
    /// be cumulatively acknowledged before the next begins, which keeps the
    /// in-flight count bounded by the window.  Blocks until the whole
    /// message is acknowledged and returns its total length — there is no
    /// partial success.
    pub async fn send(&mut self, message: &[u8]) -> Result<usize, ConnError> {
        let peer = self.peer.ok_or(ConnError::PeerUnset)?;
        if message.is_empty() {
            return Ok(0);
        }

        let frames: Vec<&[u8]> = message.chunks(PAYLOAD_MAX).collect();
        let bursts = frames.chunks(self.window).count();
        for burst in frames.chunks(self.window) {
            self.send_burst(burst, peer).await?;
        }
        log::debug!(
            "[gbn] sent {} byte(s) as {} packet(s) in {} burst(s)",
            message.len(),
            frames.len(),
            bursts
        );
        Ok(message.len())
    }

    /// Transmit one burst of up to `W` packets and loop until its last
    /// packet is cumulatively acknowledged.
    async fn send_burst(&mut self, burst: &[&[u8]], peer: SocketAddr) -> Result<(), ConnError> {
        let n = burst.len();
        self.base_num = self.next_num;

        let mut packets = Vec::with_capacity(n);
        for payload in burst {
            let wire = Packet::data(self.next_num, payload.to_vec()).encode();
            self.channel.transmit(&wire, peer).await?;
            log::debug!("[gbn] → DATA seq={} len={}", self.next_num, payload.len());
            packets.push(wire);
            self.next_num = self.next_num.wrapping_add(1);
        }

        // Count of leading burst packets confirmed by cumulative ACKs.
        let mut covered = 0usize;

        let mut buf = vec![0u8; HEADER_LEN + PAYLOAD_MAX];
        loop {
            let (len, addr) = match timeout(TIMEOUT, self.channel.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_elapsed) => {
                    // Go back N: resend the unacknowledged suffix only.
                    self.retransmits += 1;
                    log::debug!(
                        "[gbn] timeout — retransmitting {} packet(s) from seq={}",
                        n - covered,
                        self.base_num.wrapping_add(covered as u8)
                    );
                    for wire in &packets[covered..] {
                        self.channel.transmit(wire, peer).await?;
                    }
                    continue;
                }
            };
            if addr != peer {
                continue;
            }

            let raw = &buf[..len];
            let pkt = match Packet::decode(raw) {
                Ok(p) if packet::is_valid(raw) => p,
                _ => {
                    log::debug!("[gbn] corrupted packet dropped ({len} bytes)");
                    continue;
                }
            };

            match pkt.header.kind {
                kind::ACK => {
                    let seq = pkt.header.seq;
                    if !in_window(self.base_num, n, seq) {
                        // Stale or future ack from a different burst.
                        log::debug!("[gbn] ← out-of-range ACK seq={seq} — ignored");
                        continue;
                    }
                    let acked = usize::from(seq.wrapping_sub(self.base_num)) + 1;
                    log::debug!("[gbn] ← ACK seq={seq} — covers {acked}/{n} packet(s)");
                    if acked == n {
                        return Ok(());
                    }
                    covered = covered.max(acked);
                }
                kind::DATA => {
                    // Full-duplex collision: the peer is sending while we
                    // wait.  Expected packets are parked for the next recv;
                    // anything else gets a duplicate ack.
                    if pkt.header.seq == self.expect_num {
                        let seq = pkt.header.seq;
                        if self.buffer_early_arrival(pkt) {
                            self.send_ack(seq, peer).await?;
                        }
                    } else {
                        let prev = self.expect_num.wrapping_sub(1);
                        log::debug!(
                            "[gbn] ← unexpected DATA seq={} mid-send — re-ACK seq={prev}",
                            pkt.header.seq
                        );
                        self.send_ack(prev, peer).await?;
                    }
                }
                other => {
                    log::debug!("[gbn] unknown kind tag {other} — ignored");
                }
            }
        }
    }

    /// Wait for the next in-order message unit (one packet payload) from
    /// the peer.
    ///
    /// Checks the early-arrival queue before blocking on the channel.
    /// `max_len` bounds the payload this call is prepared to accept.
    pub async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, ConnError> {
        let peer = self.peer.ok_or(ConnError::PeerUnset)?;

        // Entries that do not match expect_num are stale duplicates of
        // already-delivered packets; discard them.
        while let Some(pkt) = self.early_arrivals.pop_front() {
            if pkt.header.seq == self.expect_num {
                log::debug!("[gbn] delivering buffered DATA seq={}", pkt.header.seq);
                self.expect_num = self.expect_num.wrapping_add(1);
                return Ok(pkt.payload);
            }
        }

        let mut buf = vec![0u8; HEADER_LEN + max_len];
        loop {
            let (n, addr) = self.channel.recv_from(&mut buf).await?;
            if addr != peer {
                continue;
            }

            let raw = &buf[..n];
            match Packet::decode(raw) {
                Ok(pkt) if packet::is_valid(raw) && pkt.header.kind == kind::DATA => {
                    if pkt.header.seq == self.expect_num {
                        log::debug!("[gbn] ← DATA seq={} len={}", pkt.header.seq, pkt.payload.len());
                        self.send_ack(pkt.header.seq, peer).await?;
                        self.expect_num = self.expect_num.wrapping_add(1);
                        return Ok(pkt.payload);
                    }
                    // Duplicate after a lost ack: re-ack the last in-order
                    // sequence number so the sender's window can advance.
                    let prev = self.expect_num.wrapping_sub(1);
                    log::debug!(
                        "[gbn] ← duplicate DATA seq={} (expected {}) — re-ACK seq={prev}",
                        pkt.header.seq,
                        self.expect_num
                    );
                    self.send_ack(prev, peer).await?;
                }
                _ => {
                    // Corrupted input is dropped without an ack — unlike the
                    // stop-and-wait engine, recovery here is driven entirely
                    // by the sender's timeout.
                    log::debug!("[gbn] corrupted packet dropped ({n} bytes)");
                }
            }
        }
    }

    /// Tear down the connection: absorb straggler retransmissions for a
    /// quiet period (see [`crate::teardown`]), then release the socket.
    pub async fn close(self) -> Result<(), ConnError> {
        teardown::drain(&self.channel, self.peer).await?;
        Ok(())
    }

    /// Park a DATA packet received mid-`send` for the next `recv` call.
    ///
    /// Returns `true` when the packet should be acknowledged: it was queued
    /// now, or an identical copy already is.  Returns `false` when the queue
    /// is full — the packet is treated as never received.
    fn buffer_early_arrival(&mut self, pkt: Packet) -> bool {
        if self.early_arrivals.contains(&pkt) {
            return true;
        }
        if self.early_arrivals.len() >= EARLY_ARRIVALS_MAX {
            log::warn!(
                "[gbn] early-arrival queue full — dropping DATA seq={}",
                pkt.header.seq
            );
            return false;
        }
        log::debug!("[gbn] buffering early DATA seq={}", pkt.header.seq);
        self.early_arrivals.push_back(pkt);
        true
    }

    async fn send_ack(&self, seq: u8, peer: SocketAddr) -> Result<(), ConnError> {
        let wire = Packet::ack(seq).encode();
        self.channel.transmit(&wire, peer).await?;
        log::debug!("[gbn] → ACK seq={seq}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_window_plain_interval() {
        for seq in 0..5u8 {
            assert!(in_window(0, 5, seq));
        }
        assert!(!in_window(0, 5, 5));
        assert!(!in_window(0, 5, 128));
        assert!(!in_window(0, 5, 255));
    }

    #[test]
    fn in_window_wraps_through_zero() {
        // Interval of 10 starting at 250 covers 250..=255 and 0..=3.
        for seq in 250..=255u8 {
            assert!(in_window(250, 10, seq));
        }
        for seq in 0..=3u8 {
            assert!(in_window(250, 10, seq));
        }
        assert!(!in_window(250, 10, 4));
        assert!(!in_window(250, 10, 249));
    }

    #[test]
    fn in_window_single_slot() {
        assert!(in_window(7, 1, 7));
        assert!(!in_window(7, 1, 8));
        assert!(!in_window(7, 1, 6));
    }

    #[test]
    fn cumulative_cover_count_across_wrap() {
        // ACK(1) for a burst based at 254 covers 254, 255, 0, 1.
        let base = 254u8;
        let acked = usize::from(1u8.wrapping_sub(base)) + 1;
        assert_eq!(acked, 4);
    }

    #[tokio::test]
    async fn send_before_peer_is_a_usage_error() {
        let mut conn = GbnConnection::bind(
            "127.0.0.1:0".parse().unwrap(),
            ChannelConfig::default(),
            4,
        )
        .await
        .unwrap();
        assert!(matches!(conn.send(b"too early").await, Err(ConnError::PeerUnset)));
        assert!(matches!(conn.recv(PAYLOAD_MAX).await, Err(ConnError::PeerUnset)));
    }

    #[tokio::test]
    async fn empty_message_sends_nothing() {
        let mut conn = GbnConnection::bind(
            "127.0.0.1:0".parse().unwrap(),
            ChannelConfig::default(),
            4,
        )
        .await
        .unwrap();
        conn.set_peer("127.0.0.1:9".parse().unwrap());
        assert_eq!(conn.send(b"").await.unwrap(), 0);
        assert_eq!(conn.retransmits(), 0);
    }
}
