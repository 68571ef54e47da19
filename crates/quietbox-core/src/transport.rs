//! Request/response byte channel to the mailbox server.
//!
//! The core hands complete encoded messages to a [`Transport`] and gets
//! complete encoded replies back. Framing and channel security belong to the
//! transport.

use std::{
    io::{self, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use quietbox_proto::MAX_MESSAGE_SIZE;

/// Blocking request/response channel.
pub trait Transport {
    /// Send one message and wait for its reply.
    fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
        (**self).transceive(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
        (**self).transceive(request)
    }
}

/// TCP transport with a u32 big-endian length prefix per message.
///
/// Carries no transport security of its own; deploy it behind an
/// authenticated tunnel.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    max_message_size: usize,
}

impl TcpTransport {
    /// Connect to a mailbox server.
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, max_message_size: MAX_MESSAGE_SIZE })
    }

    /// Apply a read/write timeout to every exchange.
    pub fn with_timeout(self, timeout: Duration) -> io::Result<Self> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(self)
    }
}

impl Transport for TcpTransport {
    fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
        write_frame(&mut self.stream, request, self.max_message_size)?;
        read_frame(&mut self.stream, self.max_message_size)
    }
}

/// Write one length-prefixed frame.
pub fn write_frame(writer: &mut impl Write, body: &[u8], max: usize) -> io::Result<()> {
    if body.len() > max {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame exceeds maximum size"));
    }

    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame length exceeds u32"))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(body)?;
    writer.flush()
}

/// Read one length-prefixed frame, refusing bodies larger than `max`.
pub fn read_frame(reader: &mut impl Read, max: usize) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame exceeds maximum size"));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn frame_layout_is_length_prefixed() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"abc", 16).unwrap();
        assert_eq!(buf, [0, 0, 0, 3, b'a', b'b', b'c']);

        let body = read_frame(&mut Cursor::new(buf), 16).unwrap();
        assert_eq!(body, b"abc");
    }

    #[test]
    fn oversized_frame_refused_before_allocation() {
        let mut cursor = Cursor::new(u32::MAX.to_be_bytes().to_vec());
        let err = read_frame(&mut cursor, 1024).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 8, 1, 2]);
        assert_eq!(read_frame(&mut cursor, 64).unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }
}
