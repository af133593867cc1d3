//! What goes over a pipe.
//!
//! A connection opens with an 8 byte handshake from each side:
//!
//! ```text
//! 0x00 'S' 'P' 0x00 | protocol (u16, big endian) | 0x00 0x00
//! ```
//!
//! After that every message is one frame:
//!
//! ```text
//! header_len (u32) | body_len (u32) | header | body
//! ```
//!
//! All integers are big endian.

use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::{
    error::{Error, Result},
    msg::Msg,
    socket::Protocol,
};

pub const HANDSHAKE_LEN: usize = 8;
const FRAME_PREFIX_LEN: usize = 8;
const MAGIC: [u8; 4] = [0x00, b'S', b'P', 0x00];

pub fn encode_handshake(protocol: Protocol) -> [u8; HANDSHAKE_LEN] {
    let mut buf = [0u8; HANDSHAKE_LEN];
    buf[..4].copy_from_slice(&MAGIC);
    BigEndian::write_u16(&mut buf[4..6], protocol.id());
    buf
}

pub fn decode_handshake(buf: &[u8; HANDSHAKE_LEN]) -> Result<Protocol> {
    if buf[..4] != MAGIC || buf[6..] != [0, 0] {
        return Err(Error::ProtocolViolation("malformed handshake".into()));
    }
    let id = BigEndian::read_u16(&buf[4..6]);
    Protocol::from_id(id)
        .ok_or_else(|| Error::ProtocolViolation(format!("unknown protocol 0x{:04x}", id)))
}

/// Exchanges handshakes and checks that the peer speaks the matching
/// protocol. Returns the peer's protocol.
pub async fn handshake<S>(stream: &mut S, ours: Protocol) -> Result<Protocol>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&encode_handshake(ours)).await?;
    let mut buf = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut buf).await?;
    let theirs = decode_handshake(&buf)?;
    if theirs != ours.peer() {
        debug!(ours = ours.name(), theirs = theirs.name(), "peer protocol mismatch");
        return Err(Error::ProtocolViolation(format!(
            "{} cannot talk to {}",
            ours.name(),
            theirs.name()
        )));
    }
    trace!(peer = theirs.name(), "handshake complete");
    Ok(theirs)
}

/// Writes messages as frames.
pub struct FrameWriter<W>(W);

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> Self {
        Self(stream)
    }

    pub async fn send(&mut self, msg: Msg) -> Result<()> {
        let (header, body) = msg.into_parts();
        let mut buf = Vec::with_capacity(FRAME_PREFIX_LEN + header.len() + body.len());
        buf.extend_from_slice(&[0u8; FRAME_PREFIX_LEN]);
        BigEndian::write_u32(&mut buf[..4], frame_len(header.len())?);
        BigEndian::write_u32(&mut buf[4..8], frame_len(body.len())?);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&body);
        self.0.write_all(&buf).await?;
        self.0.flush().await?;
        Ok(())
    }

    /// Signals end of stream to the peer.
    pub async fn shutdown(&mut self) {
        let _ = self.0.shutdown().await;
    }
}

fn frame_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::MessageTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Reads frames back into messages, refusing any larger than `max_size`.
pub struct FrameReader<R> {
    stream: R,
    max_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R, max_size: usize) -> Self {
        Self { stream, max_size }
    }

    pub async fn recv(&mut self) -> Result<Msg> {
        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        self.stream.read_exact(&mut prefix).await?;
        let header_len = BigEndian::read_u32(&prefix[..4]) as usize;
        let body_len = BigEndian::read_u32(&prefix[4..]) as usize;
        let size = header_len.saturating_add(body_len);
        if size > self.max_size {
            return Err(Error::MessageTooLarge {
                size,
                max: self.max_size,
            });
        }
        let mut header = vec![0u8; header_len];
        self.stream.read_exact(&mut header).await?;
        let mut body = vec![0u8; body_len];
        self.stream.read_exact(&mut body).await?;
        Ok(Msg::from_parts(header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime;

    #[test]
    fn handshake_layout() {
        let buf = encode_handshake(Protocol::Bus);
        assert_eq!(buf, [0x00, b'S', b'P', 0x00, 0x00, 0x70, 0x00, 0x00]);
        assert_eq!(decode_handshake(&buf), Ok(Protocol::Bus));
    }

    #[test]
    fn garbage_handshake_is_a_violation() {
        let buf = *b"GET / HT";
        assert!(matches!(
            decode_handshake(&buf),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn mismatched_protocols_are_refused() {
        runtime::block_on(async {
            let (mut a, mut b) = tokio::io::duplex(64);
            let (ours, theirs) = tokio::join!(
                handshake(&mut a, Protocol::Req),
                handshake(&mut b, Protocol::Bus)
            );
            assert!(matches!(ours, Err(Error::ProtocolViolation(_))));
            assert!(matches!(theirs, Err(Error::ProtocolViolation(_))));
        });
    }

    #[test]
    fn frames_keep_header_and_body_apart() {
        runtime::block_on(async {
            let (a, b) = tokio::io::duplex(1024);
            let mut writer = FrameWriter::new(a);
            let mut reader = FrameReader::new(b, 1024);

            let mut msg = Msg::from(&b"body"[..]);
            msg.header_append_u32(0x8000_0001);
            writer.send(msg).await.unwrap();

            let received = reader.recv().await.unwrap();
            assert_eq!(received.header(), &[0x80, 0, 0, 1]);
            assert_eq!(received.body(), b"body");
        });
    }

    #[test]
    fn oversized_frames_are_rejected() {
        runtime::block_on(async {
            let (a, b) = tokio::io::duplex(1024);
            let mut writer = FrameWriter::new(a);
            let mut reader = FrameReader::new(b, 8);
            writer.send(Msg::from(vec![0u8; 16])).await.unwrap();
            assert_eq!(
                reader.recv().await.err(),
                Some(Error::MessageTooLarge { size: 16, max: 8 })
            );
        });
    }
}
