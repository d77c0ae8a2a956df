//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket`.  It speaks
//! raw byte buffers, not [`crate::packet::Packet`]s: corruption is injected
//! into and detected on the encoded bytes, so framing and checksum
//! validation belong to the protocol layer, never here.  This module owns
//! only byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `buf` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest).await
    }

    /// Receive the next datagram into `buf`.
    ///
    /// Returns `(byte_count, sender_address)`.  A datagram longer than `buf`
    /// is truncated by the OS; the truncated bytes then fail checksum
    /// validation upstream and are handled like any other corruption.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}
