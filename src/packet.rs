//! Wire-format definitions for protocol packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission,
//!   including the Internet checksum.
//! - Deserialising a raw byte slice back into a [`Packet`].
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **little-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Kind Tag    |  Sequence No. |            Checksum           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Payload Length        |          Payload ...          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 6 bytes.
//! kind(1) + seq(1) + checksum(2) + length(2)
//!
//! # Validity
//!
//! A received byte sequence is valid iff the Internet checksum over the
//! **full** bytes, including the transmitted checksum field, folds to zero —
//! see [`is_valid`].  [`Packet::decode`] deliberately does *not* perform that
//! check: a corrupted header cannot be trusted to self-report its own
//! corruption, so callers validate the raw bytes first and only then trust
//! the decoded fields.

/// Kind-tag constants for the `kind` header field.
pub mod kind {
    /// Packet carries application payload.
    pub const DATA: u8 = 12;
    /// Packet acknowledges a received DATA packet; never carries payload.
    pub const ACK: u8 = 11;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 6;

/// Maximum payload bytes a single packet may carry.
pub const PAYLOAD_MAX: usize = 1000;

// Byte offsets of each field within the serialised header.
const OFF_KIND: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_CHECKSUM: usize = 2;
const OFF_LEN: usize = 4;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to
/// little-endian on the wire and [`Packet::decode`] converts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// One of the [`kind`] constants (any other value means corruption).
    pub kind: u8,
    /// Sequence number, wrapping modulo 256 (modulo 2 for stop-and-wait).
    pub seq: u8,
    /// Internet checksum over header (checksum field zeroed) + payload.
    ///
    /// On encode this is computed and written last.
    /// On decode this is the value as received, unverified.
    pub checksum: u16,
    /// Declared payload length in bytes; always 0 for ACK packets.
    pub length: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a DATA packet carrying `payload`.
    ///
    /// `payload` must not exceed [`PAYLOAD_MAX`]; the engines partition or
    /// truncate application messages before framing.
    pub fn data(seq: u8, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= PAYLOAD_MAX, "payload exceeds PAYLOAD_MAX");
        Self {
            header: Header {
                kind: kind::DATA,
                seq,
                checksum: 0, // filled in by encode
                length: payload.len() as u16,
            },
            payload,
        }
    }

    /// Build an ACK packet for sequence number `seq` (empty payload).
    pub fn ack(seq: u8) -> Self {
        Self {
            header: Header {
                kind: kind::ACK,
                seq,
                checksum: 0, // filled in by encode
                length: 0,
            },
            payload: Vec::new(),
        }
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// `header.length` and `header.checksum` are computed from the actual
    /// payload; any values already stored in those fields are ignored.
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + payload_len];

        buf[OFF_KIND] = self.header.kind;
        buf[OFF_SEQ] = self.header.seq;
        // Checksum field is zero while computing the checksum.
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&0u16.to_le_bytes());
        buf[OFF_LEN..OFF_LEN + 2].copy_from_slice(&(payload_len as u16).to_le_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_le_bytes());

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Pure parse: the checksum is *not* verified and the declared length is
    /// *not* reconciled with the actual payload — run [`is_valid`] on the raw
    /// bytes before trusting any decoded field.  The payload is whatever
    /// follows the header on the wire.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Truncated);
        }

        Ok(Packet {
            header: Header {
                kind: buf[OFF_KIND],
                seq: buf[OFF_SEQ],
                checksum: u16::from_le_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]),
                length: u16::from_le_bytes([buf[OFF_LEN], buf[OFF_LEN + 1]]),
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    Truncated,
}

impl std::fmt::Display for PacketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketError::Truncated => write!(f, "buffer too short to contain a header"),
        }
    }
}

impl std::error::Error for PacketError {}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit little-endian words, fold the end-around carry,
/// return the one's-complement.  An odd trailing byte is padded with zero
/// (added as the low byte of a final word).  The caller must zero any
/// checksum field within `data` before computing a checksum to transmit.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i + 1 < data.len() {
        sum += u32::from(u16::from_le_bytes([data[i], data[i + 1]]));
        i += 2;
    }
    if i < data.len() {
        sum += u32::from(data[i]);
    }

    // Fold 32-bit sum into 16 bits.
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

/// `true` iff `raw` passes checksum verification.
///
/// The sum over the full received bytes — transmitted checksum included —
/// folds to zero for an uncorrupted packet.
pub fn is_valid(raw: &[u8]) -> bool {
    internet_checksum(raw) == 0
}
