//! Stop-and-wait ARQ connection.
//!
//! [`StopWaitConnection`] owns the complete state for one logical
//! peer-to-peer session and layers alternating-bit reliability on top of the
//! unreliable channel:
//!
//! - At most **one** DATA packet is in flight at any moment.
//! - The 1-bit sequence number flips on every successful exchange.
//! - A timeout with no channel activity retransmits the in-flight packet;
//!   the engine never gives up on loss, only on a hard transport error.
//!
//! Both peers may act as sender and receiver concurrently (full duplex).  A
//! DATA packet that arrives while [`send`] is blocked waiting for its ACK is
//! acknowledged on the spot and parked in the early-arrival queue; the next
//! [`recv`] call delivers it without touching the network.
//!
//! [`send`]: StopWaitConnection::send
//! [`recv`]: StopWaitConnection::recv

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use crate::packet::{self, kind, Packet, HEADER_LEN, PAYLOAD_MAX};
use crate::simulator::{ChannelConfig, UnreliableChannel};
use crate::teardown;

/// Retransmission timeout: how long to wait for channel activity before
/// resending the in-flight packet.
pub const TIMEOUT: Duration = Duration::from_millis(50);

/// Upper bound on DATA packets parked while a `send` is in progress.  A
/// packet refused here is simply not acknowledged, so the peer retransmits
/// it later.
pub(crate) const EARLY_ARRIVALS_MAX: usize = 32;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced to the application by the ARQ engines.
///
/// Packet loss, corruption, and stale duplicates are *not* errors — the
/// protocol recovers from those internally and the caller never sees them.
#[derive(Debug)]
pub enum ConnError {
    /// `send`/`recv` called before the peer address was set.
    PeerUnset,
    /// Hard transport fault from the underlying socket; never retried.
    Io(std::io::Error),
}

impl std::fmt::Display for ConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PeerUnset => write!(f, "peer address not set yet"),
            Self::Io(e) => write!(f, "socket I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConnError {}

impl From<std::io::Error> for ConnError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// StopWaitConnection
// ---------------------------------------------------------------------------

/// A reliable stop-and-wait connection over the unreliable channel.
#[derive(Debug)]
pub struct StopWaitConnection {
    /// Fault-injecting UDP channel; sole transport for DATA and ACKs alike.
    channel: UnreliableChannel,
    /// Remote peer; must be set before the first `send`/`recv`.
    peer: Option<SocketAddr>,
    /// Sequence bit for the next outbound DATA packet.
    send_num: u8,
    /// Sequence bit the receive side expects next.
    recv_num: u8,
    /// DATA packets that arrived while `send` was waiting for an ACK.
    early_arrivals: VecDeque<Packet>,
}

impl StopWaitConnection {
    /// Bind a new connection to `local_addr` with the given channel faults.
    pub async fn bind(local_addr: SocketAddr, config: ChannelConfig) -> Result<Self, ConnError> {
        let channel = UnreliableChannel::bind(local_addr, config).await?;
        Ok(Self {
            channel,
            peer: None,
            send_num: 0,
            recv_num: 0,
            early_arrivals: VecDeque::new(),
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

    /// Transmit one message reliably to the peer.
    ///
    /// A message longer than [`PAYLOAD_MAX`] is truncated to its first
    /// [`PAYLOAD_MAX`] bytes — stop-and-wait frames a single packet only.
    /// Blocks until the peer acknowledges the packet; returns the number of
    /// bytes actually sent.
    pub async fn send(&mut self, message: &[u8]) -> Result<usize, ConnError> {
        let peer = self.peer.ok_or(ConnError::PeerUnset)?;

        let len = message.len().min(PAYLOAD_MAX);
        let wire = Packet::data(self.send_num, message[..len].to_vec()).encode();
        self.channel.transmit(&wire, peer).await?;
        log::debug!("[snw] → DATA seq={} len={}", self.send_num, len);

        let mut buf = vec![0u8; HEADER_LEN + PAYLOAD_MAX];
        loop {
            let (n, addr) = match timeout(TIMEOUT, self.channel.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_elapsed) => {
                    log::debug!("[snw] timeout — retransmitting DATA seq={}", self.send_num);
                    self.channel.transmit(&wire, peer).await?;
                    continue;
                }
            };
            if addr != peer {
                continue;
            }

            let raw = &buf[..n];
            let pkt = match Packet::decode(raw) {
                Ok(p) if packet::is_valid(raw) => p,
                _ => {
                    log::debug!("[snw] corrupted packet dropped ({n} bytes)");
                    continue;
                }
            };

            match pkt.header.kind {
                kind::ACK if pkt.header.seq == self.send_num => {
                    log::debug!("[snw] ← ACK seq={}", pkt.header.seq);
                    self.send_num ^= 1;
                    return Ok(len);
                }
                kind::ACK => {
                    log::debug!("[snw] ← unexpected ACK seq={} — ignored", pkt.header.seq);
                }
                kind::DATA => {
                    // The peer is sending its own data while we wait.
                    let seq = pkt.header.seq;
                    if self.buffer_early_arrival(pkt) {
                        self.send_ack(seq, peer).await?;
                    }
                }
                other => {
                    log::debug!("[snw] unknown kind tag {other} — ignored");
                }
            }
        }
    }

    /// Wait for the next in-order message from the peer.
    ///
    /// Checks the early-arrival queue before blocking on the channel.
    /// `max_len` bounds the payload this call is prepared to accept.
    pub async fn recv(&mut self, max_len: usize) -> Result<Vec<u8>, ConnError> {
        let peer = self.peer.ok_or(ConnError::PeerUnset)?;

        // Entries that do not match recv_num are stale duplicates of
        // already-delivered packets; discard them.
        while let Some(pkt) = self.early_arrivals.pop_front() {
            if pkt.header.seq == self.recv_num {
                log::debug!("[snw] delivering buffered DATA seq={}", pkt.header.seq);
                self.recv_num ^= 1;
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
                    if pkt.header.seq == self.recv_num {
                        log::debug!("[snw] ← DATA seq={} len={}", pkt.header.seq, pkt.payload.len());
                        self.send_ack(pkt.header.seq, peer).await?;
                        self.recv_num ^= 1;
                        return Ok(pkt.payload);
                    }
                    // Duplicate of a delivered packet; its ACK was lost.
                    // Re-ack the duplicate's own sequence number.
                    log::debug!("[snw] ← duplicate DATA seq={} — re-ACK", pkt.header.seq);
                    self.send_ack(pkt.header.seq, peer).await?;
                }
                _ => {
                    // Corrupted (or otherwise untrustworthy) input: re-ack
                    // the last accepted packet to prompt a fast
                    // retransmission instead of waiting out the peer's timer.
                    let prev = self.recv_num ^ 1;
                    log::debug!("[snw] corrupted packet ({n} bytes) — re-ACK seq={prev}");
                    self.send_ack(prev, peer).await?;
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
                "[snw] early-arrival queue full — dropping DATA seq={}",
                pkt.header.seq
            );
            return false;
        }
        log::debug!("[snw] buffering early DATA seq={}", pkt.header.seq);
        self.early_arrivals.push_back(pkt);
        true
    }

    async fn send_ack(&self, seq: u8, peer: SocketAddr) -> Result<(), ConnError> {
        let wire = Packet::ack(seq).encode();
        self.channel.transmit(&wire, peer).await?;
        log::debug!("[snw] → ACK seq={seq}");
        Ok(())
    }
}
