//! Length-prefixed segment framing over a reliable byte stream.
//!
//! The underlying transport already delivers bytes in order, so framing only
//! has to mark segment boundaries: each segment is written as a 4-byte
//! big-endian length followed by the encoded [`Packet`].
//!
//! The stream is split into a [`SegmentReader`] (owned by the inbound flow)
//! and a [`SegmentWriter`] (shared by the sender, timer and inbound flows).
//! All protocol logic lives elsewhere; this module owns only byte I/O.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::packet::{Packet, PacketError, HEADER_LEN};

/// Largest frame accepted from the peer: a full header plus a `u16` payload.
pub const MAX_FRAME: usize = HEADER_LEN + u16::MAX as usize;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from framed stream operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Underlying I/O error from the stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The received frame could not be decoded as a valid segment.
    #[error("segment decode error: {0}")]
    Packet(#[from] PacketError),
    /// The length prefix announced a frame larger than [`MAX_FRAME`].
    #[error("frame of {0} bytes exceeds the {}-byte limit", MAX_FRAME)]
    FrameTooLarge(usize),
}

impl SocketError {
    /// `true` when the peer closed its end of the stream.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

// ---------------------------------------------------------------------------
// Reader / writer halves
// ---------------------------------------------------------------------------

/// Read half: decodes one [`Packet`] per frame.
#[derive(Debug)]
pub struct SegmentReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> SegmentReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Receive the next frame and decode it into a [`Packet`].
    ///
    /// A clean end of stream surfaces as an I/O error of kind
    /// `UnexpectedEof`; see [`SocketError::is_eof`].
    pub async fn read_segment(&mut self) -> Result<Packet, SocketError> {
        let len = self.inner.read_u32().await? as usize;
        if len > MAX_FRAME {
            return Err(SocketError::FrameTooLarge(len));
        }
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        Ok(Packet::decode(&buf)?)
    }
}

/// Write half: encodes and frames one [`Packet`] per call.
#[derive(Debug)]
pub struct SegmentWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> SegmentWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encode `packet`, write it as a single frame and flush.
    pub async fn write_segment(&mut self, packet: &Packet) -> Result<(), SocketError> {
        let bytes = packet.encode();
        self.inner.write_u32(bytes.len() as u32).await?;
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<(), SocketError> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{flags, Header};

    fn data_packet(seq: u32, payload: &[u8]) -> Packet {
        Packet {
            header: Header {
                seq,
                flags: flags::ACK | flags::PSH,
                window: 4096,
                ..Header::default()
            },
            payload: payload.to_vec(),
        }
    }

    #[tokio::test]
    async fn frames_survive_the_stream_in_order() {
        let (a, b) = tokio::io::duplex(1024);
        let mut writer = SegmentWriter::new(a);
        let mut reader = SegmentReader::new(b);

        let first = data_packet(1, b"first");
        let second = data_packet(6, b"second");
        writer.write_segment(&first).await.unwrap();
        writer.write_segment(&second).await.unwrap();

        assert_eq!(reader.read_segment().await.unwrap(), first);
        assert_eq!(reader.read_segment().await.unwrap(), second);
    }

    #[tokio::test]
    async fn closed_stream_reports_eof() {
        let (a, b) = tokio::io::duplex(64);
        drop(a);
        let mut reader = SegmentReader::new(b);
        let err = reader.read_segment().await.unwrap_err();
        assert!(err.is_eof(), "expected EOF, got {err:?}");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, b) = tokio::io::duplex(64);
        a.write_u32((MAX_FRAME + 1) as u32).await.unwrap();
        let mut reader = SegmentReader::new(b);
        assert!(matches!(
            reader.read_segment().await,
            Err(SocketError::FrameTooLarge(n)) if n == MAX_FRAME + 1
        ));
    }

    #[tokio::test]
    async fn undersized_frame_is_a_decode_error() {
        let (mut a, b) = tokio::io::duplex(64);
        a.write_u32(3).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        let mut reader = SegmentReader::new(b);
        assert!(matches!(
            reader.read_segment().await,
            Err(SocketError::Packet(PacketError::BufferTooShort(3)))
        ));
    }
}
