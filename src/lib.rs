//! `rdt-over-udp` — reliable, in-order, exactly-once message delivery over
//! an unreliable UDP channel.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send(message) / recv(max_len) / close()
//!      │
//!  ┌───▼───────────────────────────────────────────┐
//!  │ StopWaitConnection        GbnConnection       │
//!  │ (alternating bit,         (sliding window,    │
//!  │  one packet in flight)     go-back-N, mod-256)│
//!  └───┬───────────────────────────────────────────┘
//!      │ encoded packets (checksummed)
//!  ┌───▼───────────────┐
//!  │ UnreliableChannel │  (configurable loss / corruption injection)
//!  └───┬───────────────┘
//!      │ raw UDP datagrams
//!  ┌───▼───────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]         — wire format, Internet checksum (serialise / parse)
//! - [`connection`]     — stop-and-wait ARQ engine
//! - [`gbn_connection`] — Go-Back-N sliding-window ARQ engine
//! - [`teardown`]       — quiet-period drain before releasing the socket
//! - [`simulator`]      — lossy/corrupting channel wrapper
//! - [`socket`]         — async UDP socket abstraction
//!
//! # Reliability model
//!
//! The channel below the engines drops and corrupts datagrams but never
//! reorders or duplicates them on its own; every observed duplicate is a
//! retransmission artifact.  The engines recover from loss by timeout-driven
//! retransmission and from corruption by checksum-based dropping; both are
//! invisible to the caller.  Only hard transport faults and usage errors
//! (peer address unset) surface as [`connection::ConnError`].
//!
//! Every operation takes the connection by `&mut self`, so all protocol
//! state is serialised per connection without locks.  Sequence counters
//! advance only after the network action they describe, which keeps state
//! consistent if a future is dropped at its single suspension point (the
//! timed wait for channel activity).

pub mod connection;
pub mod gbn_connection;
pub mod packet;
pub mod simulator;
pub mod socket;
pub mod teardown;
