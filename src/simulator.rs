//! Unreliable-channel simulation.
//!
//! Real networks drop and corrupt packets.  To exercise the reliability
//! mechanisms without depending on actual network conditions,
//! [`UnreliableChannel`] wraps a [`crate::socket::Socket`] and applies a
//! configurable fault model on the **send** path:
//!
//! | Fault       | Description                                             |
//! |-------------|---------------------------------------------------------|
//! | Packet loss | Drop with probability `loss_rate`, but report the full  |
//! |             | length as sent — a drop is invisible to the sender.     |
//! | Corruption  | With probability `corrupt_rate`, mutate one random byte |
//! |             | before transmitting.                                    |
//!
//! The two faults are mutually exclusive per packet: the corruption draw
//! only happens when the loss draw did not fire.  The receive path is a
//! transparent pass-through, and so is the whole channel when both rates
//! are 0.0 (the production configuration).
//!
//! The ARQ engines treat every [`UnreliableChannel::transmit`] call as
//! unconditionally successful; faults surface only later as missing or
//! checksum-failing packets.

use std::io;
use std::net::SocketAddr;

use rand::Rng;

use crate::socket::Socket;

/// Configuration for the fault-injection model.
///
/// Both probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that a surviving packet has one byte mutated.
    pub corrupt_rate: f64,
}

impl ChannelConfig {
    /// Create a config, checking that both probabilities are in `[0, 1]`.
    pub fn new(loss_rate: f64, corrupt_rate: f64) -> Self {
        assert!((0.0..=1.0).contains(&loss_rate), "loss_rate out of [0, 1]");
        assert!(
            (0.0..=1.0).contains(&corrupt_rate),
            "corrupt_rate out of [0, 1]"
        );
        Self {
            loss_rate,
            corrupt_rate,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        // No faults by default — the channel is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
        }
    }
}

/// A fault-injecting wrapper around the socket layer.
#[derive(Debug)]
pub struct UnreliableChannel {
    socket: Socket,
    config: ChannelConfig,
}

impl UnreliableChannel {
    /// Bind a new channel to `local_addr` with the given fault model.
    pub async fn bind(local_addr: SocketAddr, config: ChannelConfig) -> io::Result<Self> {
        let socket = Socket::bind(local_addr).await?;
        Ok(Self { socket, config })
    }

    /// Address this channel's socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    /// Send `buf` to `dest` through the simulated network.
    ///
    /// A lost packet is *not* an error: the call reports the full length as
    /// sent, exactly as a real network drop would look to the sender.  Only
    /// transport-level I/O failures surface as `Err`.
    pub async fn transmit(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        // Draw the fault decisions up front; ThreadRng must not be held
        // across an await point.
        let (lost, corrupt_at) = {
            let mut rng = rand::thread_rng();
            let lost = rng.gen::<f64>() < self.config.loss_rate;
            let corrupt_at = if !lost && rng.gen::<f64>() < self.config.corrupt_rate {
                Some(rng.gen_range(0..buf.len()))
            } else {
                None
            };
            (lost, corrupt_at)
        };

        if lost {
            log::warn!("[udt] packet lost in unreliable layer ({} bytes)", buf.len());
            return Ok(buf.len());
        }

        if let Some(pos) = corrupt_at {
            let mut mutated = buf.to_vec();
            // Guaranteed byte-level change: decrement by 2, or wrap to 254.
            mutated[pos] = if mutated[pos] > 1 {
                mutated[pos] - 2
            } else {
                254
            };
            log::warn!("[udt] packet corrupted in unreliable layer (byte {pos})");
            return self.socket.send_to(&mutated, dest).await;
        }

        self.socket.send_to(buf, dest).await
    }

    /// Receive the next datagram into `buf` — transparent pass-through.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
