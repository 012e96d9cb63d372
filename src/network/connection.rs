// src/network/connection.rs
//
// One bidirectional framed channel to a neighbor. Frames are a 4-byte big-endian
// length followed by the JSON encoded packet, so message content may contain any byte.

use crate::error::{LinkError, PacketError};
use crate::network::packet::Packet;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

const LEN_PREFIX: usize = 4;

/// Result of one receive attempt.
#[derive(Debug)]
pub enum Inbound {
    Packet(Packet),
    /// Frame arrived intact but did not decode; the connection stays usable.
    Malformed(PacketError),
    /// Orderly end of stream.
    Closed,
}

pub struct FrameReader<R> {
    inner: R,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame: usize) -> Self {
        Self { inner, max_frame }
    }

    /// Read one raw frame body. `Ok(None)` on end of stream at a frame boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        let mut len_buf = [0u8; LEN_PREFIX];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame {
            return Err(LinkError::FrameTooLarge(len, self.max_frame));
        }
        let mut body = vec![0u8; len];
        self.inner.read_exact(&mut body).await?;
        Ok(Some(body))
    }

    pub async fn receive(&mut self) -> Result<Inbound, LinkError> {
        match self.read_frame().await? {
            None => Ok(Inbound::Closed),
            Some(body) => match Packet::decode(&body) {
                Ok(packet) => Ok(Inbound::Packet(packet)),
                Err(e) => Ok(Inbound::Malformed(e)),
            },
        }
    }
}

pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), LinkError> {
        let body = packet.encode()?;
        self.send_raw(&body).await
    }

    /// Write one frame around an already encoded body.
    pub async fn send_raw(&mut self, body: &[u8]) -> Result<(), LinkError> {
        let len = u32::try_from(body.len())
            .map_err(|_| LinkError::FrameTooLarge(body.len(), u32::MAX as usize))?;
        let mut frame = Vec::with_capacity(LEN_PREFIX + body.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(body);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}

/// A TCP stream to one neighbor with framing on both directions.
pub struct Connection {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl Connection {
    pub fn from_stream(stream: TcpStream, max_frame: usize) -> Result<Self, LinkError> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let _ = stream.set_nodelay(true);
        let (r, w) = stream.into_split();
        Ok(Self {
            peer_addr,
            local_addr,
            reader: FrameReader::new(r, max_frame),
            writer: FrameWriter::new(w),
        })
    }

    /// Dial `address` (`host:port`), giving up after `timeout`.
    pub async fn connect(
        address: &str,
        timeout: Duration,
        max_frame: usize,
    ) -> Result<Self, LinkError> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(LinkError::ConnectTimeout(address.to_string())),
        };
        Self::from_stream(stream, max_frame)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send one packet. The write side is shut down if the write fails.
    pub async fn send(&mut self, packet: &Packet) -> Result<(), LinkError> {
        let result = self.writer.send(packet).await;
        if matches!(result, Err(LinkError::Io(_))) {
            self.writer.shutdown().await;
        }
        result
    }

    /// Receive one packet (or a malformed-frame notice, or end of stream).
    pub async fn receive(&mut self) -> Result<Inbound, LinkError> {
        let result = self.reader.receive().await;
        if result.is_err() {
            self.writer.shutdown().await;
        }
        result
    }

    pub fn into_split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }

    pub async fn close(mut self) {
        self.writer.shutdown().await;
    }

    /// Half-close, then drain until the peer closes as well or `linger` runs out.
    /// Leaves nothing unread behind, so the peer sees an orderly close instead of a reset.
    pub async fn finish(mut self, linger: Duration) {
        self.writer.shutdown().await;
        let reader = &mut self.reader;
        let _ = tokio::time::timeout(linger, async move {
            while let Ok(Some(_)) = reader.read_frame().await {}
        })
        .await;
    }
}
