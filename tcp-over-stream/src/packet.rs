//! Wire-format definitions for protocol segments.
//!
//! Every frame exchanged between peers carries one [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for framing.
//! - Deserialising a raw byte slice back into a [`Packet`], returning errors
//!   for truncated or inconsistent input.
//!
//! No I/O happens here; this is pure data transformation.  Length-prefix
//! framing lives in [`crate::socket`].
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Source Port          |       Destination Port        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  HLen |       |U|A|P|R|S|F|            Window Size            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Checksum            |        Urgent Pointer         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 20 bytes.  The checksum is carried but
//! never computed or verified; the underlying stream is already reliable.

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Urgent pointer field is significant.
    pub const URG: u8 = 0b0010_0000;
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0b0001_0000;
    /// Push buffered data to the application.
    pub const PSH: u8 = 0b0000_1000;
    /// Reset the connection.
    pub const RST: u8 = 0b0000_0100;
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u8 = 0b0000_0010;
    /// Finish: the sender has no more data to send.
    pub const FIN: u8 = 0b0000_0001;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 20;

/// Header length in 32-bit words written on encode.
const HEADER_WORDS: u8 = (HEADER_LEN / 4) as u8;

// Byte offsets of each field within the serialised header.
const OFF_SRC_PORT: usize = 0;
const OFF_DST_PORT: usize = 2;
const OFF_SEQ: usize = 4;
const OFF_ACK: usize = 8;
const OFF_HLEN: usize = 12;
const OFF_FLAGS: usize = 13;
const OFF_WINDOW: usize = 14;
const OFF_CHECKSUM: usize = 16;
const OFF_URGENT: usize = 18;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to big-endian
/// on the wire and [`Packet::decode`] converts back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Port identifier of the sending endpoint.
    pub src_port: u16,
    /// Port identifier of the receiving endpoint.
    pub dst_port: u16,
    /// Sequence number of the first payload byte in this segment.
    pub seq: u32,
    /// Acknowledgement number (next expected sequence number from the peer).
    pub ack: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Advertised receive-window size in bytes.
    pub window: u16,
    /// Placeholder; always zero in practice.
    pub checksum: u16,
    pub urgent: u16,
}

impl Header {
    /// `true` when every bit of `flag` is set.
    #[inline]
    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }
}

/// A complete protocol segment: header + payload bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a payload-less control segment.
    pub fn control(header: Header) -> Self {
        Self {
            header,
            payload: Vec::new(),
        }
    }

    /// First sequence number *after* this segment's payload.
    pub fn end_seq(&self) -> u32 {
        self.header.seq.wrapping_add(self.payload.len() as u32)
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];
        let h = &self.header;

        buf[OFF_SRC_PORT..OFF_SRC_PORT + 2].copy_from_slice(&h.src_port.to_be_bytes());
        buf[OFF_DST_PORT..OFF_DST_PORT + 2].copy_from_slice(&h.dst_port.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&h.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&h.ack.to_be_bytes());
        buf[OFF_HLEN] = HEADER_WORDS << 4;
        buf[OFF_FLAGS] = h.flags & 0x3f;
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&h.window.to_be_bytes());
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&h.checksum.to_be_bytes());
        buf[OFF_URGENT..OFF_URGENT + 2].copy_from_slice(&h.urgent.to_be_bytes());

        buf[HEADER_LEN..].copy_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the header-length nibble is below 5 words or points past the end of
    ///   `buf`.
    ///
    /// Header words beyond the fixed 20 bytes (options) are skipped.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort(buf.len()));
        }

        let words = buf[OFF_HLEN] >> 4;
        let header_bytes = usize::from(words) * 4;
        if words < HEADER_WORDS || header_bytes > buf.len() {
            return Err(PacketError::BadHeaderLength(words));
        }

        let header = Header {
            src_port: be_u16(buf, OFF_SRC_PORT),
            dst_port: be_u16(buf, OFF_DST_PORT),
            seq: be_u32(buf, OFF_SEQ),
            ack: be_u32(buf, OFF_ACK),
            flags: buf[OFF_FLAGS] & 0x3f,
            window: be_u16(buf, OFF_WINDOW),
            checksum: be_u16(buf, OFF_CHECKSUM),
            urgent: be_u16(buf, OFF_URGENT),
        };

        Ok(Packet {
            header,
            payload: buf[header_bytes..].to_vec(),
        })
    }
}

#[inline]
fn be_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn be_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Errors that can arise when parsing a raw segment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Buffer shorter than the fixed header size.
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    /// Header-length field is below the minimum or exceeds the buffer.
    #[error("invalid header length of {0} words")]
    BadHeaderLength(u8),
}

// ---------------------------------------------------------------------------
// Sequence-space helpers
// ---------------------------------------------------------------------------

/// Returns `true` when sequence number `a` is strictly before `b` in
/// wrap-around space.
///
/// Valid as long as the two values are less than `u32::MAX / 2` apart.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) <= (u32::MAX / 2)
}

/// Returns `true` when sequence number `a` is ≤ `b` in wrap-around space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= (u32::MAX / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet(seq: u32, ack: u32, flags: u8, window: u16, payload: &[u8]) -> Packet {
        Packet {
            header: Header {
                src_port: 12345,
                dst_port: 8080,
                seq,
                ack,
                flags,
                window,
                ..Header::default()
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn encode_decode_preserves_fields() {
        let pkt = make_packet(42, 7, flags::ACK | flags::PSH, 4096, b"hello");
        let decoded = Packet::decode(&pkt.encode()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn header_len_constant_is_correct() {
        // ports(4) + seq(4) + ack(4) + hlen/flags/window(4) + checksum(2) + urgent(2)
        assert_eq!(HEADER_LEN, 20);
        let bytes = make_packet(0, 0, 0, 0, b"").encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(bytes[OFF_HLEN] >> 4, 5);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort(0)));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort(HEADER_LEN - 1))
        );
    }

    #[test]
    fn decode_rejects_header_length_below_minimum() {
        let mut bytes = make_packet(1, 2, flags::ACK, 10, b"").encode();
        bytes[OFF_HLEN] = 4 << 4;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::BadHeaderLength(4)));
    }

    #[test]
    fn decode_rejects_header_length_past_buffer() {
        let mut bytes = make_packet(1, 2, flags::ACK, 10, b"ab").encode();
        bytes[OFF_HLEN] = 6 << 4; // claims 24 header bytes, buffer holds 22
        assert_eq!(Packet::decode(&bytes), Err(PacketError::BadHeaderLength(6)));
    }

    #[test]
    fn decode_skips_option_words() {
        let mut bytes = make_packet(9, 0, flags::SYN, 100, b"").encode();
        bytes[OFF_HLEN] = 6 << 4;
        bytes.extend_from_slice(&[1, 1, 1, 1]); // one word of options
        bytes.extend_from_slice(b"xy");
        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.payload, b"xy");
        assert_eq!(decoded.header.seq, 9);
    }

    #[test]
    fn flag_bits_match_tcp_layout() {
        let bytes = make_packet(0, 0, flags::SYN | flags::ACK, 0, b"").encode();
        assert_eq!(bytes[OFF_FLAGS], 0x12);
        let bytes = make_packet(0, 0, flags::FIN | flags::ACK, 0, b"").encode();
        assert_eq!(bytes[OFF_FLAGS], 0x11);
    }

    #[test]
    fn checksum_field_is_zero_by_default() {
        let bytes = make_packet(5, 6, flags::ACK, 1, b"data").encode();
        assert_eq!(&bytes[OFF_CHECKSUM..OFF_CHECKSUM + 2], &[0, 0]);
    }

    #[test]
    fn fields_are_big_endian_on_wire() {
        let bytes = make_packet(0x0102_0304, 0x0506_0708, 0, 0x0a0b, b"").encode();
        assert_eq!(&bytes[OFF_SRC_PORT..OFF_SRC_PORT + 2], &12345u16.to_be_bytes());
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[OFF_WINDOW..OFF_WINDOW + 2], &[0x0a, 0x0b]);
    }

    #[test]
    fn has_requires_every_bit() {
        let h = Header {
            flags: flags::SYN,
            ..Header::default()
        };
        assert!(h.has(flags::SYN));
        assert!(!h.has(flags::SYN | flags::ACK));
    }

    #[test]
    fn end_seq_wraps() {
        let pkt = make_packet(u32::MAX - 1, 0, 0, 0, b"abcd");
        assert_eq!(pkt.end_seq(), 2);
    }

    #[test]
    fn seq_comparisons_handle_wrap() {
        assert!(seq_lt(1, 2));
        assert!(!seq_lt(2, 2));
        assert!(seq_le(2, 2));
        assert!(seq_lt(u32::MAX - 3, 4));
        assert!(!seq_le(4, u32::MAX - 3));
    }
}
